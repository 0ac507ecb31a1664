/// Audit records
///
/// One record is produced per changed row in a delivered change event and
/// appended, write-once, to the audit sink as a single JSON line:
///
/// ```json
/// {"timestamp":"2025-01-01T12:00:00.123Z","source":"CDC","database":"taskmanager",
///  "table":"tasks","operation":"INSERT","data":{...},
///  "kafka_topic":"tidb-cdc","kafka_partition":0,"kafka_offset":"1735732800123-0"}
/// ```
///
/// `timestamp` is when the consumer processed the row, not when the change
/// was committed; a redelivered message yields records that differ only in
/// this field.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

use super::canal::Operation;

/// Where a message was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Topic name
    pub topic: String,

    /// Partition index within the topic
    pub partition: u32,

    /// Position of the message within the partition
    pub offset: String,
}

/// One audit log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Processing time
    #[serde(serialize_with = "iso_millis")]
    pub timestamp: DateTime<Utc>,

    /// Always `CDC`
    pub source: String,

    /// Source database
    pub database: String,

    /// Source table
    pub table: String,

    /// Row operation
    pub operation: Operation,

    /// Row image
    pub data: JsonValue,

    /// Topic the message came from
    pub kafka_topic: String,

    /// Partition the message came from
    pub kafka_partition: u32,

    /// Offset of the message
    pub kafka_offset: String,
}

impl AuditRecord {
    /// Value of the `source` field
    pub const SOURCE: &'static str = "CDC";

    /// Serializes the record as one JSON line (no trailing newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Whether two records describe the same delivery of the same row
    pub fn same_content(&self, other: &AuditRecord) -> bool {
        AuditRecord {
            timestamp: other.timestamp,
            ..self.clone()
        } == *other
    }
}

fn iso_millis<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record() -> AuditRecord {
        AuditRecord {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
            source: AuditRecord::SOURCE.to_string(),
            database: "taskmanager".to_string(),
            table: "tasks".to_string(),
            operation: Operation::Insert,
            data: json!({"id": "t1"}),
            kafka_topic: "tidb-cdc".to_string(),
            kafka_partition: 0,
            kafka_offset: "5-0".to_string(),
        }
    }

    #[test]
    fn test_json_line_shape() {
        let line = record().to_json_line().unwrap();
        assert!(!line.contains('\n'));

        let value: JsonValue = serde_json::from_str(&line).unwrap();
        assert_eq!(value["timestamp"], "2025-01-01T12:00:00.000Z");
        assert_eq!(value["source"], "CDC");
        assert_eq!(value["operation"], "INSERT");
        assert_eq!(value["kafka_topic"], "tidb-cdc");
        assert_eq!(value["kafka_partition"], 0);
        assert_eq!(value["kafka_offset"], "5-0");
        assert_eq!(value["data"]["id"], "t1");
    }

    #[test]
    fn test_json_line_roundtrip() {
        let original = record();
        let parsed: AuditRecord = serde_json::from_str(&original.to_json_line().unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_same_content_ignores_timestamp() {
        let first = record();
        let second = AuditRecord {
            timestamp: Utc::now(),
            ..record()
        };
        assert!(first.same_content(&second));

        let different = AuditRecord {
            kafka_offset: "6-0".to_string(),
            ..record()
        };
        assert!(!first.same_content(&different));
    }
}
