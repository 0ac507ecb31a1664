//! # TaskTrail Audit
//!
//! Change data capture for TaskTrail: the relay publishes committed row
//! changes from the `change_feed` outbox to a partitioned Redis Streams
//! topic, and the audit consumer turns every changed row into one JSON
//! audit line.
//!
//! ## Modules
//!
//! - `config`: `CDC_*` and `RELAY_*` settings
//! - `feed`: the pull-based [`feed::ChangeFeed`] and its Redis Streams implementation
//! - `consumer`: the audit consumer state machine
//! - `sink`: append-only audit outputs
//! - `relay`: outbox to broker publishing
//! - `shutdown`: signal handling
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tasktrail_audit::consumer::{AuditConsumer, ConsumerOptions};
//! use tasktrail_audit::feed::RedisChangeFeed;
//! use tasktrail_audit::sink::JsonLinesSink;
//! use tasktrail_audit::config::ConsumerSettings;
//! use tasktrail_shared::redis::{RedisClient, RedisConfig, StreamClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = ConsumerSettings::default();
//! let redis = RedisClient::new(RedisConfig::from_env()?).await?;
//! let feed = RedisChangeFeed::new(StreamClient::new(redis), &settings, "0");
//!
//! let mut consumer = AuditConsumer::new(feed, Arc::new(JsonLinesSink::stdout()), ConsumerOptions::default());
//! let stats = consumer.run(tasktrail_audit::shutdown::shutdown_token()).await?;
//! println!("{} records", stats.records);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod feed;
pub mod relay;
pub mod shutdown;
pub mod sink;
