/// API route handlers
///
/// - `health`: Health check endpoint
/// - `auth`: Registration and login
/// - `tasks`: Owner-scoped task CRUD

pub mod auth;
pub mod health;
pub mod tasks;
