/// Security activity log
///
/// Authentication outcomes and task mutations are recorded as structured
/// entries: who acted, on what, from where and why a request was refused.
/// Entries go to an [`ActivitySink`]; the default sink emits `tracing` events
/// on the `activity` target so they can be routed separately from
/// operational logs. The log is built once at startup and shared through
/// application state.
///
/// Raw passwords and tokens are never part of an entry.
///
/// # Example
///
/// ```
/// use tasktrail_shared::activity::{ActivityAction, ActivityEntry, ActivityLog};
/// use uuid::Uuid;
///
/// let log = ActivityLog::tracing();
/// log.record(
///     ActivityEntry::new(ActivityAction::TaskCreated)
///         .user(Uuid::new_v4(), "a@x.io")
///         .task(Uuid::new_v4()),
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Recorded action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    /// Account created
    UserRegistered,
    /// Registration refused (duplicate, invalid input)
    RegistrationRejected,
    /// Successful login
    UserLogin,
    /// Login refused
    LoginFailed,
    /// Protected request refused by the access guard
    AuthRejected,
    /// Task list read
    TasksFetched,
    /// Task created
    TaskCreated,
    /// Task updated
    TaskUpdated,
    /// Task deleted
    TaskDeleted,
}

impl ActivityAction {
    /// Upper-case action name
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::UserRegistered => "USER_REGISTERED",
            ActivityAction::RegistrationRejected => "REGISTRATION_REJECTED",
            ActivityAction::UserLogin => "USER_LOGIN",
            ActivityAction::LoginFailed => "LOGIN_FAILED",
            ActivityAction::AuthRejected => "AUTH_REJECTED",
            ActivityAction::TasksFetched => "TASKS_FETCHED",
            ActivityAction::TaskCreated => "TASK_CREATED",
            ActivityAction::TaskUpdated => "TASK_UPDATED",
            ActivityAction::TaskDeleted => "TASK_DELETED",
        }
    }

    /// Whether the action records a refusal
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ActivityAction::RegistrationRejected
                | ActivityAction::LoginFailed
                | ActivityAction::AuthRejected
        )
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One activity log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// When the action happened
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub action: ActivityAction,

    /// Acting user, when known
    pub user_id: Option<Uuid>,

    /// Acting user's email, when known
    pub email: Option<String>,

    /// Task acted on
    pub task_id: Option<Uuid>,

    /// Number of items involved (list reads)
    pub count: Option<usize>,

    /// Client address, when known
    pub ip: Option<IpAddr>,

    /// Why the action was refused
    pub reason: Option<String>,
}

impl ActivityEntry {
    /// Starts an entry stamped with the current time
    pub fn new(action: ActivityAction) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            user_id: None,
            email: None,
            task_id: None,
            count: None,
            ip: None,
            reason: None,
        }
    }

    /// Sets the acting user
    pub fn user(mut self, user_id: Uuid, email: impl Into<String>) -> Self {
        self.user_id = Some(user_id);
        self.email = Some(email.into());
        self
    }

    /// Sets only the email (unknown or unverified accounts)
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the task
    pub fn task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Sets the item count
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Sets the client address
    pub fn ip(mut self, ip: Option<IpAddr>) -> Self {
        self.ip = ip;
        self
    }

    /// Sets the refusal reason
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Destination for activity entries
pub trait ActivitySink: Send + Sync {
    /// Records one entry; must not fail the calling request
    fn record(&self, entry: &ActivityEntry);
}

/// Emits entries as `tracing` events on the `activity` target
#[derive(Debug, Clone, Default)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, entry: &ActivityEntry) {
        let user_id = entry.user_id.map(|id| id.to_string());
        let task_id = entry.task_id.map(|id| id.to_string());
        let ip = entry.ip.map(|ip| ip.to_string());

        if entry.action.is_failure() {
            tracing::warn!(
                target: "activity",
                action = entry.action.as_str(),
                timestamp = %entry.timestamp.to_rfc3339(),
                user_id = user_id.as_deref().unwrap_or(""),
                email = entry.email.as_deref().unwrap_or(""),
                ip = ip.as_deref().unwrap_or(""),
                reason = entry.reason.as_deref().unwrap_or(""),
                "{}",
                entry.action
            );
        } else {
            tracing::info!(
                target: "activity",
                action = entry.action.as_str(),
                timestamp = %entry.timestamp.to_rfc3339(),
                user_id = user_id.as_deref().unwrap_or(""),
                email = entry.email.as_deref().unwrap_or(""),
                task_id = task_id.as_deref().unwrap_or(""),
                count = entry.count,
                ip = ip.as_deref().unwrap_or(""),
                "{}",
                entry.action
            );
        }
    }
}

/// Keeps entries in memory; useful in tests
#[derive(Debug, Default)]
pub struct MemoryActivitySink {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl MemoryActivitySink {
    /// Snapshot of recorded entries
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded entries with a given action
    pub fn with_action(&self, action: ActivityAction) -> Vec<ActivityEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.action == action)
            .collect()
    }
}

impl ActivitySink for MemoryActivitySink {
    fn record(&self, entry: &ActivityEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}

/// Shared handle to the configured sink
#[derive(Clone)]
pub struct ActivityLog {
    sink: Arc<dyn ActivitySink>,
}

impl fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityLog").finish_non_exhaustive()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::tracing()
    }
}

impl ActivityLog {
    /// Wraps a sink
    pub fn new(sink: Arc<dyn ActivitySink>) -> Self {
        Self { sink }
    }

    /// Log backed by [`TracingActivitySink`]
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingActivitySink))
    }

    /// Records an entry
    pub fn record(&self, entry: ActivityEntry) {
        self.sink.record(&entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names() {
        assert_eq!(ActivityAction::UserRegistered.as_str(), "USER_REGISTERED");
        assert_eq!(ActivityAction::AuthRejected.to_string(), "AUTH_REJECTED");
        assert_eq!(
            serde_json::to_value(ActivityAction::TasksFetched).unwrap(),
            "TASKS_FETCHED"
        );
    }

    #[test]
    fn test_failure_actions() {
        assert!(ActivityAction::LoginFailed.is_failure());
        assert!(ActivityAction::AuthRejected.is_failure());
        assert!(!ActivityAction::TaskDeleted.is_failure());
    }

    #[test]
    fn test_entry_builder() {
        let user_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        let entry = ActivityEntry::new(ActivityAction::TaskUpdated)
            .user(user_id, "a@x.io")
            .task(task_id)
            .ip(Some(ip));

        assert_eq!(entry.user_id, Some(user_id));
        assert_eq!(entry.email.as_deref(), Some("a@x.io"));
        assert_eq!(entry.task_id, Some(task_id));
        assert_eq!(entry.ip, Some(ip));
        assert!(entry.reason.is_none());
    }

    #[test]
    fn test_memory_sink_through_log() {
        let sink = Arc::new(MemoryActivitySink::default());
        let log = ActivityLog::new(sink.clone());

        log.record(ActivityEntry::new(ActivityAction::LoginFailed).email("a@x.io").reason("bad password"));
        log.record(ActivityEntry::new(ActivityAction::TasksFetched).count(3));

        assert_eq!(sink.entries().len(), 2);
        let failed = sink.with_action(ActivityAction::LoginFailed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].reason.as_deref(), Some("bad password"));
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        ActivityLog::tracing().record(ActivityEntry::new(ActivityAction::UserLogin).user(Uuid::new_v4(), "a@x.io"));
    }
}
