/// Redis Streams operations used by the change feed
///
/// ```text
/// relay ──XADD──> {topic}:{partition} ──XREADGROUP──> audit consumer
///                                      <──XACK──────
/// ```
///
/// A consumer group tracks, per stream, the last delivered entry and the
/// entries delivered but not yet acknowledged (the pending list). Reading
/// with ID `0` returns this consumer's pending entries; reading with `>`
/// returns entries never delivered to the group. Acknowledging an entry is
/// the offset commit.
///
/// # Example
///
/// ```no_run
/// use tasktrail_shared::redis::client::{RedisClient, RedisConfig};
/// use tasktrail_shared::redis::streams::{ReadPosition, StreamClient};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = RedisClient::new(RedisConfig::from_env()?).await?;
/// let streams = StreamClient::new(client);
///
/// streams.ensure_group("tidb-cdc:0", "cdc-group", "0").await?;
/// let id = streams.append("tidb-cdc:0", &[("value", "{}")]).await?;
///
/// let entries = streams
///     .read_group("cdc-group", "cdc-consumer", &["tidb-cdc:0".to_string()], ReadPosition::New, 10, 1000)
///     .await?;
/// for entry in entries {
///     streams.ack(&entry.stream, "cdc-group", &entry.id).await?;
/// }
/// # Ok(())
/// # }
/// ```

use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisError};
use std::collections::HashMap;
use std::time::Duration;

use super::client::RedisClient;

/// One entry read from a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Stream key the entry was read from
    pub stream: String,

    /// Entry ID (`<ms>-<seq>`)
    pub id: String,

    /// String-valued fields; non-string values are dropped
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    /// Gets a field by name
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Where a group read starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPosition {
    /// Entries delivered to this consumer but not yet acknowledged (`0`)
    Pending,

    /// Entries never delivered to the group (`>`)
    New,
}

impl ReadPosition {
    /// ID argument for XREADGROUP
    pub fn as_id(&self) -> &'static str {
        match self {
            ReadPosition::Pending => "0",
            ReadPosition::New => ">",
        }
    }
}

/// Stream operations over a shared [`RedisClient`]
#[derive(Clone)]
pub struct StreamClient {
    client: RedisClient,
}

impl StreamClient {
    /// Wraps a connected client
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    /// Underlying client
    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    /// Creates a consumer group, creating the stream if needed
    ///
    /// `start_id` only applies when the group is new; an existing group keeps
    /// its position.
    ///
    /// # Returns
    ///
    /// `true` if the group was created, `false` if it already existed
    pub async fn ensure_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
    ) -> Result<bool, RedisError> {
        let mut conn = self.client.get_connection();

        let result: Result<(), RedisError> = conn.xgroup_create_mkstream(stream, group, start_id).await;

        match result {
            Ok(()) => {
                tracing::info!(stream = %stream, group = %group, start_id = %start_id, "Created consumer group");
                Ok(true)
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                tracing::debug!(stream = %stream, group = %group, "Consumer group already exists");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Reads a batch for a consumer of a group
    ///
    /// New-entry reads block for up to `block_ms`; pending reads return
    /// immediately. Returns an empty batch when nothing is available.
    pub async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        streams: &[String],
        position: ReadPosition,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<StreamEntry>, RedisError> {
        if streams.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.client.get_connection();

        let mut opts = StreamReadOptions::default().group(group, consumer).count(count);
        if position == ReadPosition::New {
            opts = opts.block(block_ms);
        }

        let ids = vec![position.as_id(); streams.len()];
        let reply: Option<StreamReadReply> = conn.xread_options(streams, &ids, &opts).await?;

        let mut entries = Vec::new();
        for key in reply.map(|r| r.keys).unwrap_or_default() {
            for stream_id in key.ids {
                let fields = stream_id
                    .map
                    .iter()
                    .filter_map(|(name, value)| {
                        redis::from_redis_value::<String>(value)
                            .ok()
                            .map(|v| (name.clone(), v))
                    })
                    .collect();

                entries.push(StreamEntry {
                    stream: key.key.clone(),
                    id: stream_id.id,
                    fields,
                });
            }
        }

        Ok(entries)
    }

    /// Acknowledges an entry for a group
    ///
    /// # Returns
    ///
    /// Number of entries acknowledged (0 if it was already acknowledged)
    pub async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<i64, RedisError> {
        let mut conn = self.client.get_connection();
        conn.xack(stream, group, &[id]).await
    }

    /// Appends an entry, retrying with exponential backoff
    ///
    /// # Returns
    ///
    /// The ID Redis assigned to the entry
    pub async fn append(&self, stream: &str, fields: &[(&str, &str)]) -> Result<String, RedisError> {
        let max_retries = self.client.config().max_retries;
        let mut attempt = 0;

        loop {
            let mut conn = self.client.get_connection();

            match conn.xadd::<_, _, _, _, String>(stream, "*", fields).await {
                Ok(id) => return Ok(id),
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(attempt);

                    tracing::warn!(
                        stream = %stream,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "XADD failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Number of entries in a stream
    pub async fn stream_len(&self, stream: &str) -> Result<usize, RedisError> {
        let mut conn = self.client.get_connection();
        conn.xlen(stream).await
    }
}

const BASE_RETRY_DELAY_MS: u64 = 100;
const MAX_RETRY_DELAY_MS: u64 = 2_000;

fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(BASE_RETRY_DELAY_MS.saturating_mul(factor).min(MAX_RETRY_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redis::client::RedisConfig;

    #[test]
    fn test_read_position_ids() {
        assert_eq!(ReadPosition::Pending.as_id(), "0");
        assert_eq!(ReadPosition::New.as_id(), ">");
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        assert_eq!(backoff_delay(1), Duration::from_millis(100));
        assert_eq!(backoff_delay(2), Duration::from_millis(200));
        assert_eq!(backoff_delay(3), Duration::from_millis(400));
        assert_eq!(backoff_delay(20), Duration::from_millis(MAX_RETRY_DELAY_MS));
    }

    #[test]
    fn test_stream_entry_field() {
        let entry = StreamEntry {
            stream: "tidb-cdc:0".to_string(),
            id: "1-0".to_string(),
            fields: HashMap::from([("value".to_string(), "{}".to_string())]),
        };

        assert_eq!(entry.field("value"), Some("{}"));
        assert_eq!(entry.field("key"), None);
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_group_read_and_ack() {
        let client = RedisClient::new(RedisConfig::default()).await.unwrap();
        let streams = StreamClient::new(client);
        let stream = format!("test-stream:{}", uuid::Uuid::new_v4());

        assert!(streams.ensure_group(&stream, "g", "0").await.unwrap());
        assert!(!streams.ensure_group(&stream, "g", "0").await.unwrap());

        let id = streams.append(&stream, &[("value", "hello")]).await.unwrap();

        let batch = streams
            .read_group("g", "c", &[stream.clone()], ReadPosition::New, 10, 100)
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
        assert_eq!(batch[0].field("value"), Some("hello"));

        let pending = streams
            .read_group("g", "c", &[stream.clone()], ReadPosition::Pending, 10, 0)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        assert_eq!(streams.ack(&stream, "g", &id).await.unwrap(), 1);

        let pending = streams
            .read_group("g", "c", &[stream.clone()], ReadPosition::Pending, 10, 0)
            .await
            .unwrap();
        assert!(pending.is_empty());

        let mut conn = streams.client().get_connection();
        let _: () = conn.del(&stream).await.unwrap();
    }
}
