/// Audit sinks
///
/// A sink appends one JSON line per [`AuditRecord`]. Records are never
/// rewritten or removed; duplicates from redelivery are written as they come.

use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tasktrail_shared::cdc::AuditRecord;

use crate::config::SinkTarget;

/// Sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Record could not be serialized
    #[error("Failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Output could not be written
    #[error("Failed to write audit record: {0}")]
    Io(#[from] io::Error),

    /// A previous writer panicked while holding the output
    #[error("Audit sink is poisoned")]
    Poisoned,
}

/// Append-only destination for audit records
pub trait AuditSink: Send + Sync {
    /// Appends one record
    fn append(&self, record: &AuditRecord) -> Result<(), SinkError>;
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn append(&self, record: &AuditRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }
}

impl<T: AuditSink + ?Sized> AuditSink for Box<T> {
    fn append(&self, record: &AuditRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }
}

/// Writes JSON lines to any writer, flushing after each record
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wraps a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl JsonLinesSink<File> {
    /// Opens (creating if needed) a file in append mode
    pub fn file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl JsonLinesSink<Stdout> {
    /// Standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> AuditSink for JsonLinesSink<W> {
    fn append(&self, record: &AuditRecord) -> Result<(), SinkError> {
        let mut line = record.to_json_line()?;
        line.push('\n');

        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// Emits each record as an `info` event on the `audit` target
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn append(&self, record: &AuditRecord) -> Result<(), SinkError> {
        let line = record.to_json_line()?;
        tracing::info!(
            target: "audit",
            table = %record.table,
            operation = record.operation.as_str(),
            offset = %record.kafka_offset,
            "{}",
            line
        );
        Ok(())
    }
}

/// Builds the sink selected by configuration
pub fn open_sink(target: &SinkTarget) -> io::Result<Arc<dyn AuditSink>> {
    Ok(match target {
        SinkTarget::Stdout => Arc::new(JsonLinesSink::stdout()),
        SinkTarget::Log => Arc::new(TracingSink),
        SinkTarget::File(path) => Arc::new(JsonLinesSink::file(path)?),
    })
}
