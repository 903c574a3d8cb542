//! Acquisition session lifecycle
//!
//! A session owns exactly one cycle log writer for its lifetime: `start()`
//! opens it, `log()` forwards records, `stop()` closes it.

use crate::core::logger::{CycleLogWriter, LogRecord, WriterError};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    /// `start()` called twice on the same instance
    #[error("Session already started")]
    AlreadyStarted,

    /// `log()` called before `start()`
    #[error("Session not started")]
    NotStarted,

    /// Underlying writer failure
    #[error(transparent)]
    Writer(#[from] WriterError),
}

/// One named acquisition cycle
pub struct AcquisitionSession {
    cycle_name: String,
    log_dir: PathBuf,
    started_at: Option<DateTime<Utc>>,
    writer: Option<CycleLogWriter>,
}

impl AcquisitionSession {
    /// Create a session for a cycle logging into `log_dir`
    pub fn new(cycle_name: &str, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            cycle_name: cycle_name.to_string(),
            log_dir: log_dir.into(),
            started_at: None,
            writer: None,
        }
    }

    /// Record the start timestamp and open the cycle log
    ///
    /// Returns the resolved log path. Creates the log directory if absent.
    pub fn start(&mut self) -> Result<PathBuf, SessionError> {
        if self.started_at.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        let started_at = Utc::now();
        self.started_at = Some(started_at);

        let mut writer = CycleLogWriter::new(self.log_dir.clone(), &self.cycle_name, started_at);
        let path = writer.open()?;
        self.writer = Some(writer);

        tracing::info!(
            "Session '{}' started, logging to '{}'",
            self.cycle_name,
            path.display()
        );
        Ok(path)
    }

    /// Forward one record for durable append
    pub fn log(&mut self, record: &LogRecord) -> Result<(), SessionError> {
        let writer = self.writer.as_mut().ok_or(SessionError::NotStarted)?;
        writer.write(record)?;
        Ok(())
    }

    /// Close the writer if open; safe to call repeatedly and after a
    /// failed start
    pub fn stop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            writer.close();
            tracing::info!("Session '{}' stopped", self.cycle_name);
        }
    }

    /// Cycle name of this session
    pub fn cycle_name(&self) -> &str {
        &self.cycle_name
    }

    /// Start timestamp, once started
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Whether the writer is currently open
    pub fn is_logging(&self) -> bool {
        self.writer.is_some()
    }
}
