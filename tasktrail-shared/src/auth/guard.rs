/// Access guard primitives
///
/// Extracts the bearer token from the `Authorization` header and turns it into
/// an [`AuthContext`]. The HTTP layer wraps [`authenticate`] in a middleware
/// that runs before every protected route and inserts the context into request
/// extensions; handlers read it with axum's `Extension` extractor.
///
/// Only two outcomes are visible to clients:
/// - no header, or a header without a token part: [`GuardError::MissingToken`]
/// - anything else that fails (wrong scheme, bad signature, expired,
///   malformed): [`GuardError::InvalidToken`]
///
/// # Example
///
/// ```
/// use axum::http::{header, HeaderMap, HeaderValue};
/// use chrono::Duration;
/// use tasktrail_shared::auth::guard::authenticate;
/// use tasktrail_shared::auth::jwt::TokenService;
/// use uuid::Uuid;
///
/// let tokens = TokenService::new("your-secret-key-at-least-32-bytes!", Duration::hours(24));
/// let token = tokens.issue(Uuid::new_v4(), "a@x.io").unwrap();
///
/// let mut headers = HeaderMap::new();
/// headers.insert(
///     header::AUTHORIZATION,
///     HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
/// );
///
/// let auth = authenticate(&tokens, &headers).unwrap();
/// assert_eq!(auth.email, "a@x.io");
/// ```

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{Claims, JwtError, TokenService};

/// Authenticated caller, added to request extensions by the guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user ID; every task query is scoped by it
    pub user_id: Uuid,

    /// Email carried by the token
    pub email: String,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
        }
    }
}

/// Guard rejection
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// No `Authorization` header, or one without a token part
    #[error("No token provided")]
    MissingToken,

    /// The token was present but could not be accepted
    #[error("Invalid token")]
    InvalidToken {
        /// Why the token was refused; server-side only
        reason: String,
    },
}

impl GuardError {
    fn invalid(reason: impl Into<String>) -> Self {
        GuardError::InvalidToken {
            reason: reason.into(),
        }
    }

    /// Server-side detail for logs
    pub fn reason(&self) -> &str {
        match self {
            GuardError::MissingToken => "missing token",
            GuardError::InvalidToken { reason } => reason,
        }
    }
}

/// Extracts the bearer token from request headers
///
/// The token is the second whitespace-separated part of the header value.
///
/// # Errors
///
/// - `GuardError::MissingToken` if there is no header or no token part
/// - `GuardError::InvalidToken` if the header is not valid ASCII or the
///   scheme is not `Bearer`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, GuardError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(GuardError::MissingToken)?
        .to_str()
        .map_err(|_| GuardError::invalid("authorization header is not valid ASCII"))?;

    let mut parts = value.split_whitespace();
    let scheme = parts.next().ok_or(GuardError::MissingToken)?;
    let token = parts.next().ok_or(GuardError::MissingToken)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(GuardError::invalid(format!("unsupported scheme {}", scheme)));
    }

    Ok(token)
}

/// Verifies the request's bearer token and builds the caller's context
pub fn authenticate(tokens: &TokenService, headers: &HeaderMap) -> Result<AuthContext, GuardError> {
    let token = bearer_token(headers)?;

    tokens
        .verify(token)
        .map(AuthContext::from)
        .map_err(|e| match e {
            JwtError::Expired => GuardError::invalid("token expired"),
            other => GuardError::invalid(other.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Duration;

    const SECRET: &str = "guard-test-secret-at-least-32-bytes";

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_missing_header() {
        let err = bearer_token(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, GuardError::MissingToken));
        assert_eq!(err.to_string(), "No token provided");
    }

    #[test]
    fn test_header_without_token_part() {
        assert!(matches!(bearer_token(&headers_with("Bearer")), Err(GuardError::MissingToken)));
        assert!(matches!(bearer_token(&headers_with("")), Err(GuardError::MissingToken)));
        assert!(matches!(bearer_token(&headers_with("Bearer   ")), Err(GuardError::MissingToken)));
    }

    #[test]
    fn test_second_part_is_token() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(bearer_token(&headers_with("bearer   xyz")).unwrap(), "xyz");
    }

    #[test]
    fn test_wrong_scheme_is_invalid() {
        let err = bearer_token(&headers_with("Basic dXNlcjpwYXNz")).unwrap_err();
        assert!(matches!(err, GuardError::InvalidToken { .. }));
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[test]
    fn test_authenticate_valid_token() {
        let tokens = TokenService::new(SECRET, Duration::hours(24));
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id, "a@x.io").unwrap();

        let auth = authenticate(&tokens, &headers_with(&format!("Bearer {}", token))).unwrap();
        assert_eq!(auth.user_id, user_id);
        assert_eq!(auth.email, "a@x.io");
    }

    #[test]
    fn test_authenticate_garbage_token() {
        let tokens = TokenService::new(SECRET, Duration::hours(24));

        let err = authenticate(&tokens, &headers_with("Bearer garbage")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[test]
    fn test_authenticate_expired_token() {
        let tokens = TokenService::new(SECRET, Duration::hours(24));
        let claims = Claims::with_expiration(Uuid::new_v4(), "a@x.io", Duration::seconds(-60));
        let token = tokens.sign(&claims).unwrap();

        let err = authenticate(&tokens, &headers_with(&format!("Bearer {}", token))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
        assert_eq!(err.reason(), "token expired");
    }

    #[test]
    fn test_authenticate_foreign_secret() {
        let tokens = TokenService::new(SECRET, Duration::hours(24));
        let foreign = TokenService::new("another-secret-that-is-32-bytes-long", Duration::hours(24));
        let token = foreign.issue(Uuid::new_v4(), "a@x.io").unwrap();

        let err = authenticate(&tokens, &headers_with(&format!("Bearer {}", token))).unwrap_err();
        assert!(matches!(err, GuardError::InvalidToken { .. }));
    }
}
