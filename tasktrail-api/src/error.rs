/// Error handling for the API server
///
/// Every handler returns `Result<T, ApiError>`. Intentional failures
/// (validation, authentication, not-found) carry a precise message; storage
/// and other unexpected failures are logged here with their detail and reach
/// the client only as a per-operation safe message.
///
/// Response body:
///
/// ```json
/// { "error": "Task not found", "code": "not_found" }
/// ```
///
/// # Example
///
/// ```
/// use tasktrail_api::error::{ApiError, ApiResult};
///
/// fn lookup(found: bool) -> ApiResult<&'static str> {
///     if !found {
///         return Err(ApiError::NotFound("Task not found".to_string()));
///     }
///     Ok("task")
/// }
///
/// assert!(lookup(false).is_err());
/// ```

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tasktrail_shared::auth::guard::GuardError;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed input (400)
    Validation(String),

    /// Missing, invalid or expired token (401)
    Unauthenticated(String),

    /// Login mismatch; identical for unknown email and wrong password (401)
    InvalidCredentials,

    /// Registration with an email that is already taken (400)
    DuplicateUser,

    /// Resource absent or owned by someone else (404)
    NotFound(String),

    /// Backing store failed (500)
    StorageUnavailable {
        /// Safe message returned to the client
        context: &'static str,

        /// Underlying error, server-side only
        detail: String,
    },

    /// Anything else (500)
    Internal(String),
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,

    /// Machine-readable code
    pub code: String,
}

impl ApiError {
    /// Maps a storage error to [`ApiError::StorageUnavailable`] with a fixed
    /// client message
    ///
    /// ```
    /// use tasktrail_api::error::ApiError;
    ///
    /// let result: Result<(), std::io::Error> =
    ///     Err(std::io::Error::new(std::io::ErrorKind::Other, "pool timed out"));
    /// let err = result.map_err(ApiError::storage("Failed to fetch tasks")).unwrap_err();
    /// assert_eq!(err.code(), "storage_unavailable");
    /// ```
    pub fn storage<E: fmt::Display>(context: &'static str) -> impl FnOnce(E) -> ApiError {
        move |err| ApiError::StorageUnavailable {
            context,
            detail: err.to_string(),
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::DuplicateUser => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::StorageUnavailable { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::DuplicateUser => "duplicate_user",
            ApiError::NotFound(_) => "not_found",
            ApiError::StorageUnavailable { .. } => "storage_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// Message shown to the client
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Validation(msg)
            | ApiError::Unauthenticated(msg)
            | ApiError::NotFound(msg) => msg.clone(),
            ApiError::InvalidCredentials => "Invalid credentials".to_string(),
            ApiError::DuplicateUser => "User already exists".to_string(),
            ApiError::StorageUnavailable { context, .. } => context.to_string(),
            ApiError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(msg) => write!(f, "Validation failed: {}", msg),
            ApiError::Unauthenticated(msg) => write!(f, "Unauthenticated: {}", msg),
            ApiError::InvalidCredentials => write!(f, "Invalid credentials"),
            ApiError::DuplicateUser => write!(f, "User already exists"),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::StorageUnavailable { context, detail } => {
                write!(f, "{}: {}", context, detail)
            }
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Log unexpected failures but don't expose details to clients
        match &self {
            ApiError::StorageUnavailable { context, detail } => {
                tracing::error!(error = %detail, "{}", context);
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
            }
            _ => {}
        }

        let body = Json(ErrorResponse {
            error: self.client_message(),
            code: self.code().to_string(),
        });

        (self.status(), body).into_response()
    }
}

/// Guard rejections become 401 with the guard's public message
impl From<GuardError> for ApiError {
    fn from(err: GuardError) -> Self {
        ApiError::Unauthenticated(err.to_string())
    }
}

/// Malformed or non-JSON bodies are validation errors
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

/// Field validation failures carry the first field message
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Invalid input".to_string());

        ApiError::Validation(message)
    }
}

/// Hashing failures are internal errors
impl From<tasktrail_shared::auth::password::PasswordError> for ApiError {
    fn from(err: tasktrail_shared::auth::password::PasswordError) -> Self {
        ApiError::Internal(format!("Password operation failed: {}", err))
    }
}

/// Token signing failures are internal errors
impl From<tasktrail_shared::auth::jwt::JwtError> for ApiError {
    fn from(err: tasktrail_shared::auth::jwt::JwtError) -> Self {
        ApiError::Internal(format!("Token operation failed: {}", err))
    }
}

/// `Json` extractor whose rejection is an [`ApiError`]
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
