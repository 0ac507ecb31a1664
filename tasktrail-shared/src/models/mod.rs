/// Database models for TaskTrail
///
/// # Models
///
/// - `user`: registered accounts (credential store)
/// - `task`: per-owner task rows (task repository)
/// - `change_feed`: trigger-populated outbox of committed row changes
///
/// # Example
///
/// ```no_run
/// use tasktrail_shared::models::user::{normalize_email, CreateUser, User};
/// use tasktrail_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::from_env()?).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: normalize_email(" A@X.io"),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
/// # Ok(())
/// # }
/// ```

pub mod change_feed;
pub mod task;
pub mod user;
