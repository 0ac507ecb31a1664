/// Redis integration for the change feed
///
/// Redis Streams carry change events from the relay to the audit consumer:
/// - Connection management with automatic reconnection
/// - Consumer groups with explicit acknowledgement
/// - Publishing with retry and backoff
///
/// # Architecture
///
/// ```text
/// ┌─────────────┐
/// │   Relay     │ ──XADD──> tidb-cdc:{partition}
/// └─────────────┘
///        │
///        │ XREADGROUP (group cdc-group)
///        ▼
/// ┌─────────────┐
/// │  Consumer   │ ──XACK──> commit
/// └─────────────┘
/// ```
///
/// # Example
///
/// ```no_run
/// use tasktrail_shared::redis::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = RedisConfig::from_env()?;
/// let client = RedisClient::new(config).await?;
///
/// let healthy = client.ping().await?;
/// println!("Redis healthy: {}", healthy);
/// # Ok(())
/// # }
/// ```

pub mod client;
pub mod streams;

pub use client::{RedisClient, RedisClientError, RedisConfig};
pub use streams::{ReadPosition, StreamClient, StreamEntry};
