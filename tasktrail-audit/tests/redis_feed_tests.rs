/// Redis Streams change feed against a live broker
///
/// Run with: cargo test -p tasktrail-audit --test redis_feed_tests -- --ignored
///
/// export REDIS_URL="redis://localhost:6379"

use tasktrail_audit::config::ConsumerSettings;
use tasktrail_audit::feed::{ChangeFeed, RedisChangeFeed, KEY_FIELD, VALUE_FIELD};
use tasktrail_shared::cdc::partition_stream_key;
use tasktrail_shared::redis::{RedisClient, RedisConfig, StreamClient};
use uuid::Uuid;

async fn streams() -> StreamClient {
    let config = RedisConfig::from_env().unwrap();
    StreamClient::new(RedisClient::new(config).await.unwrap())
}

fn settings(topic: &str) -> ConsumerSettings {
    ConsumerSettings {
        topic: topic.to_string(),
        partitions: 2,
        block_ms: 100,
        ..Default::default()
    }
}

#[tokio::test]
#[ignore] // Requires running Redis instance
async fn test_uncommitted_messages_are_redelivered() {
    let topic = format!("feed-test-{}", Uuid::new_v4());
    let streams = streams().await;

    let first = streams
        .append(&partition_stream_key(&topic, 0), &[(KEY_FIELD, "a"), (VALUE_FIELD, "{}")])
        .await
        .unwrap();
    let second = streams
        .append(&partition_stream_key(&topic, 1), &[(KEY_FIELD, "b"), (VALUE_FIELD, "{}")])
        .await
        .unwrap();

    let mut feed = RedisChangeFeed::new(streams.clone(), &settings(&topic), "0");
    feed.subscribe().await.unwrap();

    let batch = feed.poll().await.unwrap();
    assert_eq!(batch.len(), 2);
    let committed = batch.iter().find(|m| m.offset == first).unwrap();
    assert_eq!(committed.partition, 0);
    assert_eq!(committed.key.as_deref(), Some("a"));
    feed.commit(committed).await.unwrap();
    feed.close().await.unwrap();

    // Same consumer name after a restart sees only the unacknowledged entry
    let mut restarted = RedisChangeFeed::new(streams, &settings(&topic), "0");
    restarted.subscribe().await.unwrap();

    let redelivered = restarted.poll().await.unwrap();
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].offset, second);
    assert_eq!(redelivered[0].partition, 1);
    restarted.commit(&redelivered[0]).await.unwrap();

    assert!(restarted.poll().await.unwrap().is_empty());
    assert!(restarted.poll().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Requires running Redis instance
async fn test_latest_start_skips_existing_entries() {
    let topic = format!("feed-test-{}", Uuid::new_v4());
    let streams = streams().await;

    streams
        .append(&partition_stream_key(&topic, 0), &[(VALUE_FIELD, "{}")])
        .await
        .unwrap();

    let mut feed = RedisChangeFeed::new(streams.clone(), &settings(&topic), "$");
    feed.subscribe().await.unwrap();
    assert!(feed.poll().await.unwrap().is_empty());

    let fresh = streams
        .append(&partition_stream_key(&topic, 0), &[(VALUE_FIELD, "{}")])
        .await
        .unwrap();
    let batch = feed.poll().await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].offset, fresh);
    assert_eq!(batch[0].key, None);
}
