/// Authentication utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and verification
/// - [`jwt`]: session token issuance and verification
/// - [`guard`]: bearer-token extraction and caller context
///
/// # Example
///
/// ```no_run
/// use tasktrail_shared::auth::password::{hash_password, verify_password};
/// use tasktrail_shared::auth::jwt::TokenService;
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let tokens = TokenService::new("secret-key-of-at-least-32-bytes!!", Duration::hours(24));
/// let token = tokens.issue(Uuid::new_v4(), "a@x.io")?;
/// # Ok(())
/// # }
/// ```

pub mod guard;
pub mod jwt;
pub mod password;
