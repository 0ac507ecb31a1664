//! In-memory feed and sinks for consumer tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use tasktrail_audit::feed::{ChangeFeed, FeedError, FeedMessage};
use tasktrail_audit::sink::{AuditSink, SinkError};
use tasktrail_shared::cdc::AuditRecord;
use tokio_util::sync::CancellationToken;

pub const TOPIC: &str = "tidb-cdc";

/// What the feed saw, shared with the test after the feed moves into the consumer
#[derive(Debug, Default)]
pub struct FeedLog {
    pub subscribes: usize,
    pub polls: usize,
    pub committed: Vec<String>,
    pub closed: bool,
}

/// Scripted feed
///
/// Each poll pops the next scripted result. Once the script is exhausted the
/// feed cancels `shutdown` and returns empty batches.
pub struct ScriptedFeed {
    subscribe_results: VecDeque<Result<(), FeedError>>,
    polls: VecDeque<Result<Vec<FeedMessage>, FeedError>>,
    shutdown: CancellationToken,
    pub log: Arc<Mutex<FeedLog>>,
}

impl ScriptedFeed {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            subscribe_results: VecDeque::new(),
            polls: VecDeque::new(),
            shutdown,
            log: Arc::new(Mutex::new(FeedLog::default())),
        }
    }

    pub fn batch(mut self, messages: Vec<FeedMessage>) -> Self {
        self.polls.push_back(Ok(messages));
        self
    }

    pub fn poll_error(mut self) -> Self {
        self.polls
            .push_back(Err(FeedError::Unavailable("connection reset".to_string())));
        self
    }

    pub fn subscribe_ok(mut self) -> Self {
        self.subscribe_results.push_back(Ok(()));
        self
    }

    pub fn subscribe_error(mut self) -> Self {
        self.subscribe_results
            .push_back(Err(FeedError::Unavailable("connection refused".to_string())));
        self
    }

    pub fn log(&self) -> Arc<Mutex<FeedLog>> {
        self.log.clone()
    }
}

#[async_trait]
impl ChangeFeed for ScriptedFeed {
    async fn subscribe(&mut self) -> Result<(), FeedError> {
        self.log.lock().unwrap().subscribes += 1;
        self.subscribe_results.pop_front().unwrap_or(Ok(()))
    }

    async fn poll(&mut self) -> Result<Vec<FeedMessage>, FeedError> {
        self.log.lock().unwrap().polls += 1;
        match self.polls.pop_front() {
            Some(result) => result,
            None => {
                self.shutdown.cancel();
                Ok(Vec::new())
            }
        }
    }

    async fn commit(&mut self, message: &FeedMessage) -> Result<(), FeedError> {
        self.log.lock().unwrap().committed.push(message.offset.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), FeedError> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Collects records; rows whose `id` is in `reject` fail to append
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
    reject: Vec<String>,
    cancel_after_first: Option<CancellationToken>,
}

impl MemorySink {
    pub fn rejecting(ids: &[&str]) -> Self {
        Self {
            reject: ids.iter().map(|id| id.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Cancels `token` on the first append, like a signal arriving mid-batch
    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_after_first: Some(token),
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditSink for MemorySink {
    fn append(&self, record: &AuditRecord) -> Result<(), SinkError> {
        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }

        let id = record.data["id"].as_str().unwrap_or_default();
        if self.reject.iter().any(|r| r == id) {
            return Err(SinkError::Io(io::Error::new(io::ErrorKind::Other, "disk full")));
        }

        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub fn message(partition: u32, offset: &str, payload: Option<Value>) -> FeedMessage {
    FeedMessage {
        topic: TOPIC.to_string(),
        partition,
        offset: offset.to_string(),
        key: None,
        payload: payload.map(|p| p.to_string()),
    }
}

pub fn raw_message(offset: &str, payload: &str) -> FeedMessage {
    FeedMessage {
        topic: TOPIC.to_string(),
        partition: 0,
        offset: offset.to_string(),
        key: None,
        payload: Some(payload.to_string()),
    }
}

/// Canal-JSON row event for the tasks table
pub fn task_event(kind: &str, rows: &[&str]) -> Value {
    let data: Vec<Value> = rows
        .iter()
        .map(|id| json!({ "id": id, "title": format!("task {}", id), "status": "pending" }))
        .collect();

    json!({
        "id": 1,
        "database": "taskmanager",
        "table": "tasks",
        "pkNames": ["id"],
        "isDdl": false,
        "type": kind,
        "es": 1735732800000i64,
        "ts": 1735732800100i64,
        "data": data,
        "old": null
    })
}

pub fn ddl_event() -> Value {
    json!({
        "id": 2,
        "database": "taskmanager",
        "table": "tasks",
        "isDdl": true,
        "type": "ALTER",
        "es": 1735732800000i64,
        "ts": 1735732800100i64,
        "data": null,
        "old": null
    })
}
