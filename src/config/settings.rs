//! Application settings and port configurations

use crate::core::bus::PortConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings error types
#[derive(Error, Debug)]
pub enum SettingsError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed
    #[error("Could not parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// Settings could not be serialized
    #[error("Could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result of a port upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortAction {
    /// A new port was inserted
    Added,
    /// An existing port was replaced
    Updated,
}

/// Application-level settings section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Directory for cycle logs and the session tracker file
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_app_name() -> String {
    "fieldlog".to_string()
}

fn default_log_dir() -> PathBuf {
    super::log_dir().unwrap_or_else(|| PathBuf::from("data/logs"))
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Application section
    #[serde(default)]
    pub app: AppSection,
    /// Configured ports, keyed by unique id
    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

impl Settings {
    /// Load settings from a TOML file, defaults if the file is absent
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to a TOML file, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory for cycle logs and the session tracker file
    pub fn log_dir(&self) -> &Path {
        &self.app.log_dir
    }

    /// Look up a port by id
    pub fn port(&self, id: &str) -> Option<&PortConfig> {
        self.ports.iter().find(|p| p.id == id)
    }

    /// Insert a port, replacing any existing one with the same id
    pub fn add_or_update_port(&mut self, port: PortConfig) -> PortAction {
        if let Some(existing) = self.ports.iter_mut().find(|p| p.id == port.id) {
            *existing = port;
            PortAction::Updated
        } else {
            self.ports.push(port);
            PortAction::Added
        }
    }

    /// Remove a port by id; returns whether one was removed
    pub fn remove_port(&mut self, id: &str) -> bool {
        let before = self.ports.len();
        self.ports.retain(|p| p.id != id);
        self.ports.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.toml")).unwrap();
        assert!(settings.ports.is_empty());
        assert_eq!(settings.app.name, "fieldlog");
    }

    #[test]
    fn test_add_update_remove_port_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut settings = Settings::default();
        let action = settings.add_or_update_port(PortConfig::new("p1", "COM1", 9600, 1));
        assert_eq!(action, PortAction::Added);
        settings.save(&path).unwrap();

        let mut loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.ports.len(), 1);
        assert_eq!(loaded.port("p1").map(|p| p.baud_rate), Some(9600));

        let mut updated = loaded.port("p1").cloned().unwrap();
        updated.baud_rate = 19200;
        updated.connect_retries = 5;
        let action = loaded.add_or_update_port(updated);
        assert_eq!(action, PortAction::Updated);
        assert_eq!(loaded.port("p1").map(|p| p.baud_rate), Some(19200));
        assert_eq!(loaded.port("p1").map(|p| p.connect_retries), Some(5));

        assert!(loaded.remove_port("p1"));
        assert!(!loaded.remove_port("p1"));
        loaded.save(&path).unwrap();

        let reloaded = Settings::load(&path).unwrap();
        assert!(reloaded.ports.is_empty());
    }

    #[test]
    fn test_port_extra_params_survive_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut settings = Settings::default();
        let mut port = PortConfig::new("p1", "COM1", 9600, 1);
        port.extra_params.insert(
            "flow_control".to_string(),
            toml::Value::String("hardware".to_string()),
        );
        settings.add_or_update_port(port);
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        let port = loaded.port("p1").unwrap();
        assert_eq!(
            port.extra_params.get("flow_control").and_then(|v| v.as_str()),
            Some("hardware")
        );
    }
}
