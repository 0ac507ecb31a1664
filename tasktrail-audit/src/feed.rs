/// Change feed: pull-based access to the partitioned change topic
///
/// The consumer only sees the [`ChangeFeed`] trait: subscribe once, pull
/// batches, acknowledge each message after it has been handled, close on
/// shutdown. Acknowledged messages are never delivered again to the group;
/// unacknowledged ones are, which makes delivery at-least-once.
///
/// [`RedisChangeFeed`] maps this onto Redis Streams:
///
/// ```text
/// partition n        -> stream "{topic}:{n}"
/// subscribe          -> XGROUP CREATE {stream} {group} {start} MKSTREAM (per partition)
/// poll (startup)     -> XREADGROUP ... STREAMS {streams} 0 0 ...   (own pending entries)
/// poll (steady)      -> XREADGROUP ... BLOCK {ms} STREAMS {streams} > > ...
/// commit             -> XACK {stream} {group} {id}
/// ```

use async_trait::async_trait;
use redis::RedisError;
use tasktrail_shared::cdc::{parse_stream_partition, partition_stream_key, topic_stream_keys, Delivery};
use tasktrail_shared::redis::{ReadPosition, StreamClient, StreamEntry};

use crate::config::ConsumerSettings;

/// Stream field holding the canal-JSON payload
pub const VALUE_FIELD: &str = "value";

/// Stream field holding the row key
pub const KEY_FIELD: &str = "key";

/// Change feed errors
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Broker unreachable or connection lost
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Broker answered with something unexpected
    #[error("Broker protocol error: {0}")]
    Protocol(String),
}

impl From<RedisError> for FeedError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            FeedError::Unavailable(err.to_string())
        } else {
            FeedError::Protocol(err.to_string())
        }
    }
}

/// One delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
    /// Topic name
    pub topic: String,

    /// Partition index
    pub partition: u32,

    /// Position within the partition
    pub offset: String,

    /// Row key the producer partitioned by
    pub key: Option<String>,

    /// Canal-JSON payload; `None` for tombstones
    pub payload: Option<String>,
}

impl FeedMessage {
    /// Where this message came from
    pub fn delivery(&self) -> Delivery {
        Delivery {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset.clone(),
        }
    }
}

/// Pull-based change feed
#[async_trait]
pub trait ChangeFeed: Send {
    /// Joins the consumer group; called at startup and after every reconnect
    async fn subscribe(&mut self) -> Result<(), FeedError>;

    /// Next batch, possibly empty once the block timeout elapses
    async fn poll(&mut self) -> Result<Vec<FeedMessage>, FeedError>;

    /// Acknowledges a handled message
    async fn commit(&mut self, message: &FeedMessage) -> Result<(), FeedError>;

    /// Leaves the feed; uncommitted messages stay pending for redelivery
    async fn close(&mut self) -> Result<(), FeedError>;
}

/// [`ChangeFeed`] over Redis Streams consumer groups
pub struct RedisChangeFeed {
    streams: StreamClient,
    topic: String,
    group: String,
    consumer: String,
    start_id: String,
    stream_keys: Vec<String>,
    batch_size: usize,
    block_ms: usize,
    draining_pending: bool,
}

impl RedisChangeFeed {
    /// Creates a feed; nothing is sent to Redis until [`ChangeFeed::subscribe`]
    pub fn new(streams: StreamClient, settings: &ConsumerSettings, start_id: impl Into<String>) -> Self {
        Self {
            streams,
            topic: settings.topic.clone(),
            group: settings.consumer_group.clone(),
            consumer: settings.consumer_name.clone(),
            start_id: start_id.into(),
            stream_keys: topic_stream_keys(&settings.topic, settings.partitions),
            batch_size: settings.batch_size,
            block_ms: usize::try_from(settings.block_ms).unwrap_or(usize::MAX),
            draining_pending: true,
        }
    }

    /// Stream keys this feed reads
    pub fn stream_keys(&self) -> &[String] {
        &self.stream_keys
    }

    fn to_message(&self, entry: StreamEntry) -> Result<FeedMessage, FeedError> {
        let partition = parse_stream_partition(&self.topic, &entry.stream).ok_or_else(|| {
            FeedError::Protocol(format!("unexpected stream key {}", entry.stream))
        })?;

        Ok(FeedMessage {
            topic: self.topic.clone(),
            partition,
            key: entry.field(KEY_FIELD).map(str::to_string),
            payload: entry.field(VALUE_FIELD).map(str::to_string),
            offset: entry.id,
        })
    }

    async fn read(&self, position: ReadPosition) -> Result<Vec<FeedMessage>, FeedError> {
        let entries = self
            .streams
            .read_group(
                &self.group,
                &self.consumer,
                &self.stream_keys,
                position,
                self.batch_size,
                self.block_ms,
            )
            .await?;

        entries.into_iter().map(|entry| self.to_message(entry)).collect()
    }
}

#[async_trait]
impl ChangeFeed for RedisChangeFeed {
    async fn subscribe(&mut self) -> Result<(), FeedError> {
        self.streams
            .client()
            .ping()
            .await
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        for stream in &self.stream_keys {
            self.streams
                .ensure_group(stream, &self.group, &self.start_id)
                .await?;
        }

        // Anything delivered to this consumer before a crash comes first
        self.draining_pending = true;

        tracing::info!(
            topic = %self.topic,
            group = %self.group,
            consumer = %self.consumer,
            partitions = self.stream_keys.len(),
            "Subscribed to change feed"
        );
        Ok(())
    }

    async fn poll(&mut self) -> Result<Vec<FeedMessage>, FeedError> {
        if self.draining_pending {
            let pending = self.read(ReadPosition::Pending).await?;
            if !pending.is_empty() {
                tracing::debug!(count = pending.len(), "Redelivering pending messages");
                return Ok(pending);
            }
            self.draining_pending = false;
        }

        self.read(ReadPosition::New).await
    }

    async fn commit(&mut self, message: &FeedMessage) -> Result<(), FeedError> {
        let stream = partition_stream_key(&message.topic, message.partition);
        let acked = self.streams.ack(&stream, &self.group, &message.offset).await?;

        if acked == 0 {
            tracing::debug!(stream = %stream, offset = %message.offset, "Message was already acknowledged");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), FeedError> {
        tracing::info!(group = %self.group, consumer = %self.consumer, "Closing change feed");
        self.draining_pending = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_delivery() {
        let message = FeedMessage {
            topic: "tidb-cdc".to_string(),
            partition: 2,
            offset: "1730000000000-1".to_string(),
            key: Some("t1".to_string()),
            payload: None,
        };

        let delivery = message.delivery();
        assert_eq!(delivery.topic, "tidb-cdc");
        assert_eq!(delivery.partition, 2);
        assert_eq!(delivery.offset, "1730000000000-1");
    }

    #[test]
    fn test_feed_error_display() {
        assert_eq!(
            FeedError::Unavailable("connection refused".to_string()).to_string(),
            "Broker unavailable: connection refused"
        );
    }
}
