//! Authentication API Endpoints
//! Mission: Provide registration, login, and password management endpoints

use crate::auth::{
    jwt::JwtHandler,
    models::{
        ChangePasswordRequest, Claims, LoginRequest, LoginResponse, RegisterRequest, UserResponse,
    },
    user_store::UserStore,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use bcrypt::verify;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub jwt_handler: Arc<JwtHandler>,
}

impl AuthState {
    pub fn new(user_store: Arc<UserStore>, jwt_handler: Arc<JwtHandler>) -> Self {
        Self {
            user_store,
            jwt_handler,
        }
    }
}

/// Register endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AuthApiError> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(AuthApiError::Validation("Username is required".to_string()));
    }
    if payload.password.is_empty() {
        return Err(AuthApiError::Validation("Password is required".to_string()));
    }

    // Case-sensitive exact match; the UNIQUE column backs this check
    let existing = state
        .user_store
        .get_user_by_username(username)
        .map_err(AuthApiError::internal)?;
    if existing.is_some() {
        warn!("Registration rejected, username taken: {}", username);
        return Err(AuthApiError::UsernameTaken);
    }

    let user = state
        .user_store
        .create_user(username, &payload.password)
        .map_err(AuthApiError::internal)?;

    info!("Registered user: {}", user.username);

    Ok((StatusCode::CREATED, Json(UserResponse::from_user(&user))))
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    info!("Login attempt: {}", payload.username);

    // Verify credentials
    let valid = state
        .user_store
        .verify_password(&payload.username, &payload.password)
        .map_err(AuthApiError::internal)?;

    // Unknown user and wrong password are deliberately indistinguishable
    if !valid {
        warn!("Failed login attempt: {}", payload.username);
        return Err(AuthApiError::InvalidCredentials);
    }

    let user = state
        .user_store
        .get_user_by_username(&payload.username)
        .map_err(AuthApiError::internal)?
        .ok_or(AuthApiError::InvalidCredentials)?;

    // Generate JWT token
    let (token, expires_in) = state
        .jwt_handler
        .generate_token(&user)
        .map_err(AuthApiError::internal)?;

    info!("Login successful: {}", user.username);

    Ok(Json(LoginResponse {
        token,
        expires_in,
        user: UserResponse::from_user(&user),
    }))
}

/// Change password - POST /api/auth/password (protected)
///
/// Outstanding tokens are not revoked; they stay valid until their natural
/// expiration. Known limitation of the stateless token scheme.
pub async fn change_password(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, AuthApiError> {
    if payload.new_password.is_empty() {
        return Err(AuthApiError::Validation(
            "New password is required".to_string(),
        ));
    }

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthApiError::UserNotFound)?;

    let user = state
        .user_store
        .get_user_by_id(&user_id)
        .map_err(AuthApiError::internal)?
        .ok_or(AuthApiError::UserNotFound)?;

    let current_ok = verify(&payload.current_password, &user.password_hash)
        .map_err(|e| AuthApiError::internal(anyhow::anyhow!(e)))?;
    if !current_ok {
        warn!("Password change rejected for {}: bad current password", user.username);
        return Err(AuthApiError::InvalidCurrentPassword);
    }

    let updated = state
        .user_store
        .update_password(&user_id, &payload.new_password)
        .map_err(AuthApiError::internal)?;
    if !updated {
        return Err(AuthApiError::UserNotFound);
    }

    info!("Password changed for user: {}", user.username);

    Ok(Json(json!({ "message": "Password updated" })))
}

/// Current user info, carrying exactly what the token proves
#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub id: String,
    pub username: String,
}

/// Get current user info - GET /api/auth/me (protected)
///
/// Built from JWT claims, no store lookup needed.
pub async fn get_current_user(
    Extension(claims): Extension<Claims>,
) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        id: claims.sub.clone(),
        username: claims.username.clone(),
    })
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    Validation(String),
    InvalidCredentials,
    InvalidCurrentPassword,
    UsernameTaken,
    UserNotFound,
    Internal(String),
}

impl AuthApiError {
    fn internal(err: anyhow::Error) -> Self {
        error!("Auth internal error: {:#}", err);
        AuthApiError::Internal(err.to_string())
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AuthApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Invalid username or password".to_string(),
            ),
            AuthApiError::InvalidCurrentPassword => (
                StatusCode::UNAUTHORIZED,
                "Current password is incorrect".to_string(),
            ),
            AuthApiError::UsernameTaken => (
                StatusCode::CONFLICT,
                "Username already exists".to_string(),
            ),
            AuthApiError::UserNotFound => (StatusCode::NOT_FOUND, "User not found".to_string()),
            AuthApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
