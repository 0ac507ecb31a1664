/// Audit consumer
///
/// Pulls change events from a [`ChangeFeed`], turns every changed row into an
/// [`AuditRecord`](tasktrail_shared::cdc::AuditRecord) and appends it to an
/// [`AuditSink`]. Messages are handled one at a time, in the order the feed
/// returns them, and acknowledged after handling.
///
/// # States
///
/// ```text
/// Disconnected -> Connecting -> Subscribed -> Consuming <-> Processing
///                     |                           |
///                     | startup failure           | poll/commit failure
///                     v                           v
///                 Terminated              Disconnected -> Connecting (backoff)
///
/// shutdown: ShutdownRequested -> Disconnected
/// ```
///
/// # Failure isolation
///
/// - a payload that does not parse, or a row event that cannot be turned
///   into records, is logged and counted; the message is still acknowledged
/// - a failed append affects only that row
/// - broker failures after startup trigger reconnects with capped
///   exponential backoff and are never fatal
///
/// Delivery is at-least-once: a message redelivered after a crash produces a
/// second set of records that differ from the first only in `timestamp`.

use chrono::Utc;
use std::fmt;
use std::time::Duration;
use tasktrail_shared::cdc::ChangeEvent;
use tokio_util::sync::CancellationToken;

use crate::feed::{ChangeFeed, FeedError, FeedMessage};
use crate::sink::AuditSink;

/// Consumer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// No subscription
    Disconnected,
    /// Joining the feed
    Connecting,
    /// Joined, not yet polling
    Subscribed,
    /// Waiting for the next batch
    Consuming,
    /// Handling one message
    Processing,
    /// Draining after a shutdown signal
    ShutdownRequested,
    /// Startup failed; the consumer will not run again
    Terminated,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Consumer errors
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// The feed could not be joined at startup
    #[error("Failed to subscribe to the change feed at startup: {0}")]
    Startup(#[source] FeedError),
}

/// Counters returned when the consumer stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages handled and acknowledged
    pub messages: u64,
    /// Records appended
    pub records: u64,
    /// Messages without rows (DDL, empty data, tombstones)
    pub skipped: u64,
    /// Messages whose payload could not be turned into records
    pub parse_errors: u64,
    /// Rows whose append failed
    pub sink_errors: u64,
    /// Acknowledgements that failed
    pub commit_errors: u64,
    /// Reconnect attempts after startup
    pub reconnects: u64,
}

/// Consumer behaviour that is not feed- or sink-specific
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Database name for events that carry none
    pub default_database: String,
    /// First reconnect delay
    pub reconnect_initial: Duration,
    /// Reconnect delay cap
    pub reconnect_max: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            default_database: "taskmanager".to_string(),
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

/// Capped exponential backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    /// Starts at `initial`, doubling up to `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            next: initial,
        }
    }

    /// Delay to wait now; the following one is doubled
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the initial delay
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Audit consumer over a feed and a sink
pub struct AuditConsumer<F, S> {
    feed: F,
    sink: S,
    options: ConsumerOptions,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl<F: ChangeFeed, S: AuditSink> AuditConsumer<F, S> {
    /// Creates a disconnected consumer
    pub fn new(feed: F, sink: S, options: ConsumerOptions) -> Self {
        Self {
            feed,
            sink,
            options,
            state: ConsumerState::Disconnected,
            stats: ConsumerStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// The feed
    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// The sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn transition(&mut self, next: ConsumerState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "Consumer state change");
            self.state = next;
        }
    }

    /// Consumes until `shutdown` is cancelled
    ///
    /// # Errors
    ///
    /// `ConsumerError::Startup` if the first subscribe fails; every later
    /// broker failure is retried.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<ConsumerStats, ConsumerError> {
        self.transition(ConsumerState::Connecting);

        if let Err(e) = self.feed.subscribe().await {
            tracing::error!(error = %e, "Could not subscribe to the change feed");
            self.transition(ConsumerState::Terminated);
            return Err(ConsumerError::Startup(e));
        }
        self.transition(ConsumerState::Subscribed);

        let mut backoff = Backoff::new(self.options.reconnect_initial, self.options.reconnect_max);

        'consume: while !shutdown.is_cancelled() {
            self.transition(ConsumerState::Consuming);

            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break 'consume,
                polled = self.feed.poll() => polled,
            };

            let batch = match polled {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(error = %e, "Polling the change feed failed");
                    if !self.reconnect(&shutdown, &mut backoff).await {
                        break 'consume;
                    }
                    continue;
                }
            };
            backoff.reset();

            let batch_len = batch.len();
            for (handled, message) in batch.into_iter().enumerate() {
                if shutdown.is_cancelled() {
                    tracing::info!(
                        left = batch_len - handled,
                        "Shutdown requested, leaving the rest of the batch for redelivery"
                    );
                    break 'consume;
                }

                self.transition(ConsumerState::Processing);
                self.process(&message);

                if let Err(e) = self.feed.commit(&message).await {
                    self.stats.commit_errors += 1;
                    tracing::warn!(
                        error = %e,
                        partition = message.partition,
                        offset = %message.offset,
                        "Failed to acknowledge message; it will be redelivered"
                    );
                    if !self.reconnect(&shutdown, &mut backoff).await {
                        break 'consume;
                    }
                    continue 'consume;
                }
                self.transition(ConsumerState::Consuming);
            }
        }

        self.transition(ConsumerState::ShutdownRequested);
        if let Err(e) = self.feed.close().await {
            tracing::warn!(error = %e, "Failed to close the change feed cleanly");
        }
        self.transition(ConsumerState::Disconnected);

        tracing::info!(
            messages = self.stats.messages,
            records = self.stats.records,
            parse_errors = self.stats.parse_errors,
            sink_errors = self.stats.sink_errors,
            "Audit consumer stopped"
        );
        Ok(self.stats.clone())
    }

    /// Re-subscribes with backoff; `false` if shutdown came first
    async fn reconnect(&mut self, shutdown: &CancellationToken, backoff: &mut Backoff) -> bool {
        loop {
            self.transition(ConsumerState::Disconnected);
            self.stats.reconnects += 1;

            let delay = backoff.next_delay();
            tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnecting to the change feed");

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }

            self.transition(ConsumerState::Connecting);
            match self.feed.subscribe().await {
                Ok(()) => {
                    self.transition(ConsumerState::Subscribed);
                    return true;
                }
                Err(e) => tracing::warn!(error = %e, "Reconnect failed"),
            }
        }
    }

    /// Handles one message; returns the number of records appended
    ///
    /// Never fails: problems are logged and counted.
    pub fn process(&mut self, message: &FeedMessage) -> usize {
        self.stats.messages += 1;

        let Some(payload) = message.payload.as_deref() else {
            tracing::debug!(offset = %message.offset, "Skipping message without payload");
            self.stats.skipped += 1;
            return 0;
        };

        let records = ChangeEvent::parse(payload).and_then(|event| {
            event.audit_records(&message.delivery(), &self.options.default_database, Utc::now())
        });

        let records = match records {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    partition = message.partition,
                    offset = %message.offset,
                    "Failed to process change event"
                );
                self.stats.parse_errors += 1;
                return 0;
            }
        };

        if records.is_empty() {
            tracing::debug!(offset = %message.offset, "Change event carries no rows");
            self.stats.skipped += 1;
            return 0;
        }

        let mut written = 0;
        for record in &records {
            match self.sink.append(record) {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        table = %record.table,
                        offset = %record.kafka_offset,
                        "Failed to append audit record"
                    );
                    self.stats.sink_errors += 1;
                }
            }
        }

        self.stats.records += written as u64;
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConsumerState::ShutdownRequested.to_string(), "ShutdownRequested");
    }
}
