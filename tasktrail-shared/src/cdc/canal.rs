/// Canal-JSON change event format
///
/// Each broker message carries one change event:
///
/// ```json
/// {
///   "id": 42,
///   "database": "taskmanager",
///   "table": "tasks",
///   "pkNames": ["id"],
///   "isDdl": false,
///   "type": "UPDATE",
///   "es": 1730000000000,
///   "ts": 1730000000123,
///   "data": [{"id": "...", "title": "Buy milk", "status": "completed"}],
///   "old":  [{"id": "...", "title": "Buy milk", "status": "pending"}]
/// }
/// ```
///
/// `data` holds one entry per changed row; DDL events carry no rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

use super::audit::{AuditRecord, Delivery};
use super::CdcError;
use crate::models::change_feed::ChangeRow;

/// Row-level operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Row inserted
    Insert,

    /// Row updated
    Update,

    /// Row deleted
    Delete,
}

impl Operation {
    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = CdcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            _ => Err(CdcError::UnsupportedOperation(s.to_string())),
        }
    }
}

/// One change event as carried on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Source sequence number
    #[serde(default)]
    pub id: i64,

    /// Source database; consumers substitute a default when absent
    #[serde(default)]
    pub database: Option<String>,

    /// Source table
    #[serde(default)]
    pub table: Option<String>,

    /// Primary key column names
    #[serde(default)]
    pub pk_names: Option<Vec<String>>,

    /// Whether this is a schema change
    #[serde(default)]
    pub is_ddl: bool,

    /// Operation name (`INSERT`, `UPDATE`, `DELETE`, or a DDL verb)
    #[serde(rename = "type")]
    pub kind: String,

    /// Commit time at the source (Unix millis)
    #[serde(default)]
    pub es: i64,

    /// Time the event was emitted (Unix millis)
    #[serde(default)]
    pub ts: i64,

    /// Row images after the change
    #[serde(default)]
    pub data: Option<Vec<JsonValue>>,

    /// Row images before an update
    #[serde(default)]
    pub old: Option<Vec<JsonValue>>,
}

impl ChangeEvent {
    /// Parses a message payload
    pub fn parse(payload: &str) -> Result<Self, CdcError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Serializes to a message payload
    pub fn to_payload(&self) -> Result<String, CdcError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Builds the event for one captured outbox row
    pub fn from_change_row(row: &ChangeRow, emitted_at: DateTime<Utc>) -> Self {
        Self {
            id: row.id,
            database: Some(row.database_name.clone()),
            table: Some(row.table_name.clone()),
            pk_names: Some(vec!["id".to_string()]),
            is_ddl: false,
            kind: row.operation.clone(),
            es: row.committed_at.timestamp_millis(),
            ts: emitted_at.timestamp_millis(),
            data: Some(vec![row.row_data.clone()]),
            old: row.old_data.clone().map(|old| vec![old]),
        }
    }

    /// Row images carried by the event (empty for DDL)
    pub fn rows(&self) -> &[JsonValue] {
        if self.is_ddl {
            return &[];
        }
        self.data.as_deref().unwrap_or(&[])
    }

    /// Builds one audit record per changed row
    ///
    /// DDL events and events without rows yield no records.
    ///
    /// # Errors
    ///
    /// - `CdcError::UnsupportedOperation` for a row event whose type is not
    ///   INSERT, UPDATE or DELETE
    /// - `CdcError::MissingField` if a row event names no table
    pub fn audit_records(
        &self,
        delivery: &Delivery,
        default_database: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, CdcError> {
        let rows = self.rows();
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let operation: Operation = self.kind.parse()?;
        let table = self
            .table
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(CdcError::MissingField("table"))?;
        let database = self
            .database
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(default_database);

        Ok(rows
            .iter()
            .map(|row| AuditRecord {
                timestamp: processed_at,
                source: AuditRecord::SOURCE.to_string(),
                database: database.to_string(),
                table: table.to_string(),
                operation,
                data: row.clone(),
                kafka_topic: delivery.topic.clone(),
                kafka_partition: delivery.partition,
                kafka_offset: delivery.offset.clone(),
            })
            .collect())
    }
}
