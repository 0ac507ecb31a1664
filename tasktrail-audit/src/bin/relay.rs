//! # TaskTrail Change Relay
//!
//! Publishes captured row changes from the `change_feed` table to the
//! partitioned topic read by the audit consumer.
//!
//! ```bash
//! DATABASE_URL=postgresql://... REDIS_URL=redis://localhost:6379 \
//!     cargo run -p tasktrail-audit --bin tasktrail-relay
//! ```

use anyhow::Context;
use tasktrail_audit::config::{ConsumerSettings, RelaySettings};
use tasktrail_audit::relay::ChangeRelay;
use tasktrail_audit::shutdown::shutdown_token;
use tasktrail_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use tasktrail_shared::models::change_feed::ChangeRow;
use tasktrail_shared::redis::{RedisClient, RedisConfig, StreamClient};
use tasktrail_shared::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("tasktrail_audit=info,tasktrail_relay=info");

    tracing::info!("TaskTrail change relay v{} starting", env!("CARGO_PKG_VERSION"));

    // Topic and partition count are shared with the consumer
    let topic = ConsumerSettings::from_env().context("Invalid CDC configuration")?;
    let settings = RelaySettings::from_env().context("Invalid relay configuration")?;

    let pool = create_pool(DatabaseConfig::from_env()?).await?;
    let redis = RedisClient::new(RedisConfig::from_env()?)
        .await
        .context("Failed to connect to the broker")?;

    match ChangeRow::pending_count(&pool).await {
        Ok(pending) => tracing::info!(pending, "Changes waiting to be published"),
        Err(e) => tracing::warn!(error = %e, "Could not count pending changes"),
    }

    let relay = ChangeRelay::new(
        pool.clone(),
        StreamClient::new(redis),
        topic.topic,
        topic.partitions,
        settings,
    );
    relay.run(shutdown_token()).await;

    close_pool(pool).await;
    Ok(())
}
