//! # TaskTrail Shared Library
//!
//! This crate contains the types, storage contracts and security primitives
//! shared by the TaskTrail API server and the audit pipeline.
//!
//! ## Module Organization
//!
//! - `activity`: Structured activity log (security observability)
//! - `auth`: Token service, password hashing and access guard primitives
//! - `cdc`: Change-feed wire format and audit records
//! - `db`: Connection pool and migrations
//! - `models`: Users, tasks and the change-feed outbox
//! - `redis`: Redis client used as the change-feed broker
//! - `telemetry`: Tracing subscriber bootstrap

pub mod activity;
pub mod auth;
pub mod cdc;
pub mod db;
pub mod models;
pub mod redis;
pub mod telemetry;

/// Current version of the TaskTrail shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
