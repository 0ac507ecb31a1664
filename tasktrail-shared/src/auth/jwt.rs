/// Session token issuance and verification
///
/// A session token is an HS256-signed JWT carrying the user's identity. It is
/// never stored server-side: validity is a pure function of the signature and
/// the `exp` claim, checked with zero leeway. There is no revocation list.
///
/// # Claims
///
/// - `userId`: User ID
/// - `email`: User email at the time of login
/// - `iat`: Issued at (Unix timestamp)
/// - `exp`: Expiration (Unix timestamp), `iat + ttl`
///
/// # Example
///
/// ```
/// use tasktrail_shared::auth::jwt::TokenService;
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tokens = TokenService::new("your-secret-key-at-least-32-bytes!", Duration::hours(24));
///
/// let user_id = Uuid::new_v4();
/// let token = tokens.issue(user_id, "a@x.io")?;
///
/// let claims = tokens.verify(&token)?;
/// assert_eq!(claims.user_id, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default session lifetime
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Bad signature, malformed payload or wrong algorithm
    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    #[serde(rename = "userId")]
    pub user_id: Uuid,

    /// User email
    pub email: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Creates new claims with the default 24 hour expiration
    pub fn new(user_id: Uuid, email: impl Into<String>) -> Self {
        Self::with_expiration(user_id, email, Duration::hours(DEFAULT_TOKEN_TTL_HOURS))
    }

    /// Creates claims with custom expiration
    ///
    /// A negative `expires_in` yields claims that are already expired, which
    /// is handy in tests.
    ///
    /// # Example
    ///
    /// ```
    /// use tasktrail_shared::auth::jwt::Claims;
    /// use chrono::Duration;
    /// use uuid::Uuid;
    ///
    /// let claims = Claims::with_expiration(Uuid::new_v4(), "a@x.io", Duration::hours(1));
    /// assert!(!claims.is_expired());
    /// ```
    pub fn with_expiration(user_id: Uuid, email: impl Into<String>, expires_in: Duration) -> Self {
        let now = Utc::now();
        let expiration = now + expires_in;

        Self {
            user_id,
            email: email.into(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
        }
    }

    /// Checks if token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// Gets time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let now = Utc::now().timestamp();
        if self.exp > now {
            Some(Duration::seconds(self.exp - now))
        } else {
            None
        }
    }
}

/// Signs and verifies session tokens with one shared secret
///
/// Cheap to clone; built once at startup and shared through application
/// state.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"<redacted>")
            .field("ttl_seconds", &self.ttl.num_seconds())
            .finish()
    }
}

impl TokenService {
    /// Creates a token service
    ///
    /// # Arguments
    ///
    /// * `secret` - HMAC secret (at least 32 bytes recommended)
    /// * `ttl` - Lifetime of issued tokens
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    /// Lifetime of tokens issued by this service
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for the given identity
    ///
    /// # Errors
    ///
    /// Returns `JwtError::CreateError` if encoding fails
    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, JwtError> {
        self.sign(&Claims::with_expiration(user_id, email, self.ttl))
    }

    /// Signs arbitrary claims
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
    }

    /// Verifies a token and extracts its claims
    ///
    /// # Errors
    ///
    /// - `JwtError::Expired` if `exp` is in the past
    /// - `JwtError::Invalid` for any other failure (signature, format, algorithm)
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e.to_string()),
            })
    }
}
