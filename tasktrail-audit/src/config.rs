/// Settings for the audit consumer and the change relay
///
/// Read from the environment through the `config` crate, one prefix per
/// process concern:
///
/// - `CDC_TOPIC` (tidb-cdc), `CDC_PARTITIONS` (1)
/// - `CDC_CONSUMER_GROUP` (cdc-group), `CDC_CONSUMER_NAME` (cdc-consumer)
/// - `CDC_START_OFFSET`: `earliest` (default), `latest` or a stream entry ID
/// - `CDC_BATCH_SIZE` (100), `CDC_BLOCK_MS` (5000)
/// - `CDC_DEFAULT_DATABASE` (taskmanager)
/// - `CDC_SINK`: `stdout` (default), `log` or a file path
/// - `CDC_RECONNECT_INITIAL_MS` (500), `CDC_RECONNECT_MAX_MS` (30000)
/// - `RELAY_BATCH_SIZE` (100), `RELAY_POLL_INTERVAL_MS` (500)
///
/// The broker address is `REDIS_URL` (see `RedisConfig::from_env`).

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where a new consumer group starts reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOffset {
    /// Replay everything still in the stream
    Earliest,

    /// Only entries added after the group is created
    Latest,

    /// Entries after an explicit stream ID
    Explicit(String),
}

impl StartOffset {
    /// ID passed to `XGROUP CREATE`
    pub fn as_stream_id(&self) -> &str {
        match self {
            StartOffset::Earliest => "0",
            StartOffset::Latest => "$",
            StartOffset::Explicit(id) => id,
        }
    }
}

impl FromStr for StartOffset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        match value.to_ascii_lowercase().as_str() {
            "earliest" | "beginning" => Ok(StartOffset::Earliest),
            "latest" | "end" => Ok(StartOffset::Latest),
            _ if is_stream_id(value) => Ok(StartOffset::Explicit(value.to_string())),
            _ => Err(ConfigError::Message(format!(
                "CDC_START_OFFSET must be earliest, latest or a stream ID, got '{}'",
                value
            ))),
        }
    }
}

// `<millis>` or `<millis>-<seq>`
fn is_stream_id(value: &str) -> bool {
    let mut parts = value.splitn(2, '-');
    let millis = parts.next().unwrap_or_default();
    let seq = parts.next();

    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    digits(millis) && seq.map_or(true, digits)
}

/// Audit output selected by `CDC_SINK`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// JSON lines on standard output
    Stdout,

    /// JSON lines as `tracing` events on the `audit` target
    Log,

    /// JSON lines appended to a file
    File(PathBuf),
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkTarget::Stdout => f.write_str("stdout"),
            SinkTarget::Log => f.write_str("log"),
            SinkTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Audit consumer settings (`CDC_*`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    /// Topic name; partition `n` is the stream `{topic}:{n}`
    pub topic: String,

    /// Number of partitions
    pub partitions: u32,

    /// Consumer group
    pub consumer_group: String,

    /// Consumer name within the group
    pub consumer_name: String,

    /// Start offset policy for a new group
    pub start_offset: String,

    /// Maximum messages per poll
    pub batch_size: usize,

    /// How long a poll waits for new messages
    pub block_ms: u64,

    /// Database name used when an event carries none
    pub default_database: String,

    /// Audit output
    pub sink: String,

    /// First reconnect delay after a broker failure
    pub reconnect_initial_ms: u64,

    /// Reconnect delay cap
    pub reconnect_max_ms: u64,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            topic: "tidb-cdc".to_string(),
            partitions: 1,
            consumer_group: "cdc-group".to_string(),
            consumer_name: "cdc-consumer".to_string(),
            start_offset: "earliest".to_string(),
            batch_size: 100,
            block_ms: 5000,
            default_database: "taskmanager".to_string(),
            sink: "stdout".to_string(),
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
        }
    }
}

impl ConsumerSettings {
    /// Loads `CDC_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_environment(Environment::with_prefix("CDC"))
    }

    /// Loads from an explicit environment source
    pub fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        let settings: Self = Config::builder()
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::Message("CDC_TOPIC must not be empty".to_string()));
        }
        if self.partitions == 0 {
            return Err(ConfigError::Message("CDC_PARTITIONS must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Message("CDC_BATCH_SIZE must be at least 1".to_string()));
        }
        self.start_offset()?;
        Ok(())
    }

    /// Parsed start offset policy
    pub fn start_offset(&self) -> Result<StartOffset, ConfigError> {
        self.start_offset.parse()
    }

    /// Parsed sink target
    pub fn sink_target(&self) -> SinkTarget {
        match self.sink.trim() {
            s if s.is_empty() || s.eq_ignore_ascii_case("stdout") => SinkTarget::Stdout,
            s if s.eq_ignore_ascii_case("log") => SinkTarget::Log,
            path => SinkTarget::File(PathBuf::from(path)),
        }
    }

    /// Poll block timeout
    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    /// Reconnect backoff bounds
    pub fn reconnect_backoff(&self) -> (Duration, Duration) {
        let initial = Duration::from_millis(self.reconnect_initial_ms.max(1));
        let max = Duration::from_millis(self.reconnect_max_ms).max(initial);
        (initial, max)
    }
}

/// Change relay settings (`RELAY_*`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Change rows claimed per transaction
    pub batch_size: i64,

    /// Sleep between polls when nothing is pending
    pub poll_interval_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval_ms: 500,
        }
    }
}

impl RelaySettings {
    /// Loads `RELAY_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_environment(Environment::with_prefix("RELAY"))
    }

    /// Loads from an explicit environment source
    pub fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        let settings: Self = Config::builder()
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        if settings.batch_size <= 0 {
            return Err(ConfigError::Message("RELAY_BATCH_SIZE must be at least 1".to_string()));
        }
        Ok(settings)
    }

    /// Idle poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
