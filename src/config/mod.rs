//! Configuration module
//!
//! Handles application settings and port configurations

mod settings;

pub use settings::{AppSection, PortAction, Settings, SettingsError};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "fieldlog", "Fieldlog").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the application data directory
pub fn data_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "fieldlog", "Fieldlog").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the default log directory
pub fn log_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("logs"))
}

/// Get the default settings file path
pub fn default_settings_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("settings.toml"))
}
