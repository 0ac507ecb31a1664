/// Middleware for the API server
///
/// - `auth`: bearer-token access guard for the task routes
/// - `security`: hardening headers on every response

pub mod auth;
pub mod security;
