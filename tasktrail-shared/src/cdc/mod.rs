/// Change data capture: wire format, partitioning and audit records
///
/// Committed row changes travel as canal-JSON messages on a topic split into
/// partitions. Each partition is one Redis stream named `{topic}:{partition}`;
/// a row always maps to the same partition, so changes to one row are
/// observed in commit order.
///
/// # Example
///
/// ```
/// use tasktrail_shared::cdc::{partition_for, partition_stream_key, parse_stream_partition};
///
/// let partition = partition_for("tasks", "6f1c...", 4);
/// let stream = partition_stream_key("tidb-cdc", partition);
/// assert_eq!(parse_stream_partition("tidb-cdc", &stream), Some(partition));
/// ```

pub mod audit;
pub mod canal;

pub use audit::{AuditRecord, Delivery};
pub use canal::{ChangeEvent, Operation};

use sha2::{Digest, Sha256};

/// CDC errors
#[derive(Debug, thiserror::Error)]
pub enum CdcError {
    /// Payload is not a valid change event
    #[error("Invalid change event JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Row event whose type is not INSERT, UPDATE or DELETE
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A required field is absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

/// Stream key of a topic partition
pub fn partition_stream_key(topic: &str, partition: u32) -> String {
    format!("{}:{}", topic, partition)
}

/// Stream keys of every partition of a topic
pub fn topic_stream_keys(topic: &str, partitions: u32) -> Vec<String> {
    (0..partitions.max(1))
        .map(|partition| partition_stream_key(topic, partition))
        .collect()
}

/// Extracts the partition index from a stream key of `topic`
pub fn parse_stream_partition(topic: &str, stream_key: &str) -> Option<u32> {
    stream_key
        .strip_prefix(topic)?
        .strip_prefix(':')?
        .parse()
        .ok()
}

/// Stable partition for a row
///
/// Hashes `table:row_key` with SHA-256 and reduces the first eight bytes
/// modulo the partition count. Stable across processes and releases.
pub fn partition_for(table: &str, row_key: &str, partitions: u32) -> u32 {
    let partitions = partitions.max(1);

    let mut hasher = Sha256::new();
    hasher.update(table.as_bytes());
    hasher.update(b":");
    hasher.update(row_key.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);

    (u64::from_be_bytes(prefix) % u64::from(partitions)) as u32
}
