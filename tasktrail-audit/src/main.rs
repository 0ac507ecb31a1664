//! # TaskTrail Audit Consumer
//!
//! Reads change events from the partitioned topic and appends one audit
//! line per changed row to the configured sink.
//!
//! ## Usage
//!
//! ```bash
//! REDIS_URL=redis://localhost:6379 CDC_SINK=/var/log/tasktrail/audit.jsonl \
//!     cargo run -p tasktrail-audit
//! ```
//!
//! Exits non-zero if the broker cannot be reached at startup.

use anyhow::Context;
use tasktrail_audit::config::ConsumerSettings;
use tasktrail_audit::consumer::{AuditConsumer, ConsumerOptions};
use tasktrail_audit::feed::RedisChangeFeed;
use tasktrail_audit::shutdown::shutdown_token;
use tasktrail_audit::sink::open_sink;
use tasktrail_shared::redis::{RedisClient, RedisConfig, StreamClient};
use tasktrail_shared::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("tasktrail_audit=info,audit=info");

    tracing::info!("TaskTrail audit consumer v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = ConsumerSettings::from_env().context("Invalid CDC configuration")?;
    let start = settings.start_offset()?;
    let sink_target = settings.sink_target();
    let sink = open_sink(&sink_target)
        .with_context(|| format!("Failed to open audit sink {}", sink_target))?;

    let redis_config = RedisConfig::from_env().context("Invalid Redis configuration")?;
    let redis = RedisClient::new(redis_config)
        .await
        .context("Failed to connect to the broker")?;
    tracing::info!(url = %redis.display_url(), "Connected to broker");

    tracing::info!(
        topic = %settings.topic,
        partitions = settings.partitions,
        group = %settings.consumer_group,
        consumer = %settings.consumer_name,
        start = start.as_stream_id(),
        sink = %sink_target,
        "Starting audit consumer"
    );

    let feed = RedisChangeFeed::new(StreamClient::new(redis), &settings, start.as_stream_id());
    let (reconnect_initial, reconnect_max) = settings.reconnect_backoff();
    let options = ConsumerOptions {
        default_database: settings.default_database.clone(),
        reconnect_initial,
        reconnect_max,
    };

    let mut consumer = AuditConsumer::new(feed, sink, options);
    let stats = consumer.run(shutdown_token()).await?;

    tracing::info!(
        messages = stats.messages,
        records = stats.records,
        skipped = stats.skipped,
        parse_errors = stats.parse_errors,
        sink_errors = stats.sink_errors,
        commit_errors = stats.commit_errors,
        reconnects = stats.reconnects,
        "Audit consumer shut down"
    );
    Ok(())
}
