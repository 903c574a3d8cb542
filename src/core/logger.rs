//! Cycle logging functionality
//!
//! One JSON object per poll, one line per object, flushed after every
//! write so a crash loses at most the record currently being written.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Timestamp format inside log lines (second precision)
pub const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Timestamp format embedded in log file names
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Log writer error types
#[derive(Error, Debug)]
pub enum WriterError {
    /// Write attempted before `open()`
    #[error("Writer not opened")]
    NotOpen,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One record per poll
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Wall-clock timestamp of the poll
    pub timestamp: DateTime<Utc>,
    /// Source port identifier
    pub port_id: String,
    /// Protocol response data
    pub payload: Value,
    /// Open metadata map (e.g. iteration index)
    pub meta: Value,
}

impl LogRecord {
    /// Create a record stamped with the current time
    pub fn new(port_id: &str, payload: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            port_id: port_id.to_string(),
            payload,
            meta: Value::Object(serde_json::Map::new()),
        }
    }

    /// Attach metadata
    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    /// Serialize as the one-line JSON object written to the cycle log
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Line<'a> {
            ts: String,
            port_id: &'a str,
            data: &'a Value,
            meta: &'a Value,
        }

        serde_json::to_string(&Line {
            ts: self.timestamp.format(RECORD_TIMESTAMP_FORMAT).to_string(),
            port_id: &self.port_id,
            data: &self.payload,
            meta: &self.meta,
        })
    }
}

/// Append-only line writer for one cycle
pub struct CycleLogWriter {
    base_dir: PathBuf,
    cycle_name: String,
    started_at: DateTime<Utc>,
    path: Option<PathBuf>,
    file: Option<BufWriter<File>>,
}

impl CycleLogWriter {
    /// Create a writer for a cycle starting at the given time
    pub fn new(base_dir: impl Into<PathBuf>, cycle_name: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cycle_name: cycle_name.to_string(),
            started_at,
            path: None,
            file: None,
        }
    }

    /// File name for this cycle, unique per start second
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.log",
            self.cycle_name,
            self.started_at.format(FILE_TIMESTAMP_FORMAT)
        )
    }

    /// Create the log directory as needed and open the file in append mode
    pub fn open(&mut self) -> Result<PathBuf, WriterError> {
        std::fs::create_dir_all(&self.base_dir)?;
        let path = self.base_dir.join(self.file_name());
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.file = Some(BufWriter::new(file));
        self.path = Some(path.clone());
        Ok(path)
    }

    /// Append one record and flush it to disk
    pub fn write(&mut self, record: &LogRecord) -> Result<(), WriterError> {
        let file = self.file.as_mut().ok_or(WriterError::NotOpen)?;
        let line = record.to_json_line()?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    /// Release the file handle; safe to call repeatedly
    pub fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
    }

    /// Whether the writer is open
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Resolved log path, once opened
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

impl Drop for CycleLogWriter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_file_name_embeds_cycle_and_start() {
        let writer = CycleLogWriter::new("logs", "cycle1", fixed_start());
        assert_eq!(writer.file_name(), "cycle1_20240101T120000.log");
    }

    #[test]
    fn test_write_before_open_fails() {
        let mut writer = CycleLogWriter::new("logs", "cycle1", fixed_start());
        let record = LogRecord::new("p1", json!({"val": 1}));
        assert!(matches!(writer.write(&record), Err(WriterError::NotOpen)));
    }

    #[test]
    fn test_record_line_round_trip() {
        let record = LogRecord {
            timestamp: fixed_start(),
            port_id: "p1".to_string(),
            payload: json!({"val": 123}),
            meta: json!({"m": 1}),
        };

        let line = record.to_json_line().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["ts"], "2024-01-01T12:00:00");
        assert_eq!(parsed["port_id"], "p1");
        assert_eq!(parsed["data"]["val"], 123);
        assert_eq!(parsed["meta"]["m"], 1);
    }

    #[test]
    fn test_writer_appends_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CycleLogWriter::new(dir.path(), "cycle1", fixed_start());
        let path = writer.open().unwrap();

        let record = LogRecord {
            timestamp: fixed_start(),
            port_id: "p1".to_string(),
            payload: json!({"val": 123}),
            meta: json!({"m": 1}),
        };
        writer.write(&record).unwrap();
        writer.write(&record).unwrap();
        writer.close();
        writer.close();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
