/// User model and database operations
///
/// This is the credential store: one row per registered account, keyed by a
/// UUID and unique by email. Rows are immutable after registration.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY,
///     email VARCHAR(255) NOT NULL,
///     password_hash VARCHAR(255) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT users_email_key UNIQUE (email)
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use tasktrail_shared::models::user::{User, CreateUser};
/// use tasktrail_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::from_env()?).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "a@x.io".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
///
/// let found = User::find_by_email(&pool, "a@x.io").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Name of the unique constraint on `users.email`
pub const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";

/// Width of the `users.email` column
pub const MAX_EMAIL_LEN: usize = 255;

/// User model representing a registered account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Normalized (trimmed, lower-cased) email address
    pub email: String,

    /// Argon2id PHC string; never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// When the account was created
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    /// Email address, already normalized with [`normalize_email`]
    pub email: String,

    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: String,
}

/// Trims and lower-cases an email address
///
/// Emails are compared and stored in this form so that `A@X.io ` and `a@x.io`
/// are the same account.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Whether a normalized email fits the `users.email` column
///
/// Postgres rejects NUL in text and the column holds 255 characters.
pub fn is_storable_email(email: &str) -> bool {
    email.chars().count() <= MAX_EMAIL_LEN && !email.contains('\0')
}

/// Whether an insert failed because the email is already registered
pub fn is_duplicate_email(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                && db_err
                    .constraint()
                    .map_or(true, |name| name == EMAIL_UNIQUE_CONSTRAINT)
        }
        _ => false,
    }
}

impl User {
    /// Creates a new user with a fresh UUID
    ///
    /// # Errors
    ///
    /// Returns an error if the email is taken (check with
    /// [`is_duplicate_email`]) or the database is unreachable.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.email)
        .bind(data.password_hash)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by (normalized) email
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Checks whether an email is already registered
    ///
    /// Advisory only: two concurrent registrations can both pass this check,
    /// the unique constraint decides.
    pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(pool)
                .await?;

        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  A@X.io "), "a@x.io");
        assert_eq!(normalize_email("a@x.io"), "a@x.io");
        assert_eq!(normalize_email(""), "");
    }

    #[test]
    fn test_storable_email() {
        assert!(is_storable_email("a@x.io"));
        assert!(is_storable_email(&"a".repeat(MAX_EMAIL_LEN)));
        assert!(!is_storable_email(&"a".repeat(MAX_EMAIL_LEN + 1)));
        assert!(!is_storable_email("a\0@x.io"));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@x.io".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("$argon2id$secret"));
    }

    #[test]
    fn test_non_database_error_is_not_duplicate() {
        assert!(!is_duplicate_email(&sqlx::Error::RowNotFound));
        assert!(!is_duplicate_email(&sqlx::Error::PoolTimedOut));
    }
}
