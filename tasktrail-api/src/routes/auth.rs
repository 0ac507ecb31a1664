/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /auth/register` - Create an account
/// - `POST /auth/login` - Exchange credentials for a session token
///
/// Both record their outcome on the activity log. Passwords and tokens are
/// never logged.

use crate::{
    app::AppState,
    error::{ApiError, ApiJson, ApiResult},
};
use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tasktrail_shared::{
    activity::{ActivityAction, ActivityEntry},
    auth::password,
    models::user::{is_duplicate_email, is_storable_email, normalize_email, CreateUser, User},
};
use uuid::Uuid;
use validator::Validate;

const MISSING_CREDENTIALS: &str = "Email and password required";
const STORAGE_UNAVAILABLE: &str = "storage unavailable";

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address
    #[serde(default)]
    #[validate(
        email(message = "Invalid email format"),
        length(max = 255, message = "Email must be at most 255 characters")
    )]
    pub email: String,

    /// Password
    #[serde(default)]
    pub password: String,
}

/// Register response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// Confirmation message
    pub message: String,

    /// New user ID
    pub user_id: Uuid,
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email address
    #[serde(default)]
    pub email: String,

    /// Password
    #[serde(default)]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Bearer token
    pub token: String,

    /// User ID
    pub user_id: Uuid,

    /// Normalized email
    pub email: String,
}

/// Register a new user
///
/// ```text
/// POST /auth/register
/// {"email": "alice@example.com", "password": "pw123"}
/// ```
///
/// ```json
/// {"message": "User created successfully", "userId": "uuid"}
/// ```
///
/// # Errors
///
/// - `400`: missing fields, malformed email, email already registered
/// - `500`: storage failure
pub async fn register(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    ApiJson(mut req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let ip = peer_ip(connect_info);
    req.email = normalize_email(&req.email);

    let rejected = |email: &str, reason: &str| {
        state.activity.record(
            ActivityEntry::new(ActivityAction::RegistrationRejected)
                .email(email)
                .ip(ip)
                .reason(reason),
        );
    };

    if req.email.is_empty() || req.password.trim().is_empty() {
        rejected(&req.email, "missing fields");
        return Err(ApiError::Validation(MISSING_CREDENTIALS.to_string()));
    }

    if let Err(errors) = req.validate() {
        tracing::debug!(error = %errors, "Registration input failed validation");
        rejected(&req.email, "invalid email");
        return Err(errors.into());
    }

    // Advisory pre-check; the unique constraint is the real guard
    let exists = User::email_exists(&state.db, &req.email)
        .await
        .map_err(|e| {
            rejected(&req.email, STORAGE_UNAVAILABLE);
            ApiError::storage("Registration failed")(e)
        })?;
    if exists {
        rejected(&req.email, "duplicate email");
        return Err(ApiError::DuplicateUser);
    }

    let password_hash = hash_off_thread(req.password).await.map_err(|e| {
        rejected(&req.email, "password hashing failed");
        e
    })?;

    let user = match User::create(
        &state.db,
        CreateUser {
            email: req.email.clone(),
            password_hash,
        },
    )
    .await
    {
        Ok(user) => user,
        Err(e) if is_duplicate_email(&e) => {
            rejected(&req.email, "duplicate email");
            return Err(ApiError::DuplicateUser);
        }
        Err(e) => {
            rejected(&req.email, STORAGE_UNAVAILABLE);
            return Err(ApiError::storage("Registration failed")(e));
        }
    };

    state.activity.record(
        ActivityEntry::new(ActivityAction::UserRegistered)
            .user(user.id, &user.email)
            .ip(ip),
    );

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully".to_string(),
            user_id: user.id,
        }),
    ))
}

/// Login endpoint
///
/// ```text
/// POST /auth/login
/// {"email": "alice@example.com", "password": "pw123"}
/// ```
///
/// ```json
/// {"token": "eyJ...", "userId": "uuid", "email": "alice@example.com"}
/// ```
///
/// # Errors
///
/// - `400`: missing fields
/// - `401`: unknown email or wrong password (same body for both)
/// - `500`: storage failure
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let ip = peer_ip(connect_info);
    let email = normalize_email(&req.email);

    let failed = |reason: &str| {
        state.activity.record(
            ActivityEntry::new(ActivityAction::LoginFailed)
                .email(&email)
                .ip(ip)
                .reason(reason),
        );
    };

    if email.is_empty() || req.password.is_empty() {
        failed("missing credentials");
        return Err(ApiError::Validation(MISSING_CREDENTIALS.to_string()));
    }

    // An email the users table could never hold cannot match an account
    let user = if is_storable_email(&email) {
        User::find_by_email(&state.db, &email).await.map_err(|e| {
            failed(STORAGE_UNAVAILABLE);
            ApiError::storage("Login failed")(e)
        })?
    } else {
        None
    };

    let Some(user) = user else {
        // Same work as a real check so timing does not reveal the miss
        let password = req.password;
        tokio::task::spawn_blocking(move || password::dummy_verify(&password))
            .await
            .map_err(|e| ApiError::Internal(format!("Password task failed: {}", e)))?;
        failed("unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let valid = verify_off_thread(req.password, user.password_hash.clone()).await?;
    if !valid {
        failed("wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.tokens.issue(user.id, &user.email)?;

    state.activity.record(
        ActivityEntry::new(ActivityAction::UserLogin)
            .user(user.id, &user.email)
            .ip(ip),
    );

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        email: user.email,
    }))
}

fn peer_ip(connect_info: Option<ConnectInfo<SocketAddr>>) -> Option<IpAddr> {
    connect_info.map(|ConnectInfo(addr)| addr.ip())
}

// Argon2 is deliberately slow; keep it off the async workers
async fn hash_off_thread(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("Password task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn verify_off_thread(password: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("Password task failed: {}", e)))?
        .map_err(ApiError::from)
}
