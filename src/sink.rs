/// Event sinks: append-only destinations for event records.
use crate::event::EventRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Append-only destination for event records.
///
/// A failed append is reported to the caller, which decides whether to drop
/// the record. Implementations must not block indefinitely.
pub trait EventSink {
    fn append(&mut self, record: EventRecord) -> Result<(), SinkError>;
}

/// In-memory capture.
impl EventSink for Vec<EventRecord> {
    fn append(&mut self, record: EventRecord) -> Result<(), SinkError> {
        self.push(record);
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn append(&mut self, record: EventRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }
}

/// Accepts and discards every record. Used when the log cannot be opened.
pub struct NullSink;

impl EventSink for NullSink {
    fn append(&mut self, _record: EventRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Errors that can occur while persisting event records.
#[derive(Debug)]
pub enum SinkError {
    /// Failed to open the log file.
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to encode a record.
    Serialize { source: serde_json::Error },
    /// Failed to write a record.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Open { path, source } => {
                write!(f, "failed to open event log {}: {}", path.display(), source)
            }
            SinkError::Serialize { source } => {
                write!(f, "failed to serialize event: {}", source)
            }
            SinkError::Write { path, source } => {
                write!(f, "failed to write event log {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Open { source, .. } => Some(source),
            SinkError::Serialize { source } => Some(source),
            SinkError::Write { source, .. } => Some(source),
        }
    }
}

/// JSON-lines event log, one record per line, opened in append mode.
pub struct JsonlSink {
    path: PathBuf,
    file: File,
}

impl JsonlSink {
    /// Open (or create) the log file for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::Open {
                path: path.clone(),
                source: e,
            })?;
        Ok(Self { path, file })
    }
}

impl EventSink for JsonlSink {
    fn append(&mut self, record: EventRecord) -> Result<(), SinkError> {
        let mut line =
            serde_json::to_vec(&record).map_err(|e| SinkError::Serialize { source: e })?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|_| self.file.flush())
            .map_err(|e| SinkError::Write {
                path: self.path.clone(),
                source: e,
            })
    }
}
