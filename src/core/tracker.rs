//! File-based session tracker
//!
//! Persists a small descriptor of the currently-running session so separate
//! processes can report or clear it. The file's presence is the sole,
//! advisory signal that a session is active; this is a single-instance
//! convenience per log directory, not a cross-process lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the tracker file inside the log directory
pub const STATE_FILE_NAME: &str = ".session.json";

/// Tracker error types
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Tracker file exists but cannot be parsed
    ///
    /// Callers should treat this as "no reliable active session" rather
    /// than fatal.
    #[error("Corrupt session state: {0}")]
    CorruptState(#[source] serde_json::Error),

    /// Session state could not be serialized
    #[error("Could not encode session state: {0}")]
    Encode(#[source] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable descriptor of a running session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Cycle name
    pub cycle_name: String,
    /// Port identifier
    pub port_id: String,
    /// ISO-8601 start timestamp
    pub started_at: String,
    /// Absolute path of the active log file
    pub log_file: String,
}

impl SessionState {
    /// Build a descriptor for a session started at the given time
    pub fn new(
        cycle_name: &str,
        port_id: &str,
        started_at: DateTime<Utc>,
        log_file: &Path,
    ) -> Self {
        Self {
            cycle_name: cycle_name.to_string(),
            port_id: port_id.to_string(),
            started_at: started_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            log_file: log_file.display().to_string(),
        }
    }
}

/// Single-file store for the active session descriptor
pub struct SessionTracker {
    state_file: PathBuf,
}

impl SessionTracker {
    /// Create a tracker over the given state file
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
        }
    }

    /// Tracker at the fixed path under a log directory
    pub fn for_log_dir(log_dir: &Path) -> Self {
        Self::new(log_dir.join(STATE_FILE_NAME))
    }

    /// Path of the state file
    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Overwrite the tracker file with the full serialized state
    pub fn save(&self, state: &SessionState) -> Result<(), TrackerError> {
        if let Some(parent) = self.state_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state).map_err(TrackerError::Encode)?;
        std::fs::write(&self.state_file, json)?;
        Ok(())
    }

    /// Load the active session descriptor, if any
    pub fn load(&self) -> Result<Option<SessionState>, TrackerError> {
        if !self.state_file.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.state_file)?;
        let state = serde_json::from_str(&text).map_err(TrackerError::CorruptState)?;
        Ok(Some(state))
    }

    /// Delete the tracker file if present; a no-op otherwise
    pub fn clear(&self) -> Result<(), TrackerError> {
        match std::fs::remove_file(&self.state_file) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_state() -> SessionState {
        SessionState::new(
            "cycle1",
            "p1",
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            Path::new("/tmp/logs/cycle1_20240101T120000.log"),
        )
    }

    #[test]
    fn test_load_without_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = SessionTracker::for_log_dir(dir.path());
        assert!(tracker.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = SessionTracker::for_log_dir(dir.path());

        let state = sample_state();
        tracker.save(&state).unwrap();
        assert_eq!(tracker.load().unwrap(), Some(state));
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = SessionTracker::for_log_dir(dir.path());

        tracker.save(&sample_state()).unwrap();
        let mut replacement = sample_state();
        replacement.cycle_name = "cycle2".to_string();
        tracker.save(&replacement).unwrap();

        assert_eq!(tracker.load().unwrap(), Some(replacement));
    }

    #[test]
    fn test_corrupt_state_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = SessionTracker::for_log_dir(dir.path());
        std::fs::write(tracker.state_file(), "{not json").unwrap();

        assert!(matches!(tracker.load(), Err(TrackerError::CorruptState(_))));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = SessionTracker::for_log_dir(dir.path());

        tracker.save(&sample_state()).unwrap();
        tracker.clear().unwrap();
        assert!(tracker.load().unwrap().is_none());
        tracker.clear().unwrap();
    }
}
