//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use library_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;

const SESSION_LIFETIME_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
}

//=========================================================================================
// Session Helpers
//=========================================================================================

fn session_cookie(session_id: &str, max_age_seconds: i64) -> String {
    format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        session_id, max_age_seconds
    )
}

/// Creates a fresh auth session for `user_id` and returns its Set-Cookie value.
async fn open_session(state: &AppState, user_id: Uuid) -> Result<String, (StatusCode, String)> {
    let session_id = Uuid::new_v4().to_string();
    let lifetime = Duration::days(SESSION_LIFETIME_DAYS);

    state
        .store
        .create_auth_session(&session_id, user_id, Utc::now() + lifetime)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create session".to_string(),
            )
        })?;

    Ok(session_cookie(&session_id, lifetime.num_seconds()))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Email and password are required".to_string(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash password".to_string(),
            )
        })?
        .to_string();

    let user = state
        .store
        .create_user(&req.email, &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Conflict(message) => (StatusCode::CONFLICT, message),
            other => {
                error!("Failed to create user: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to create user".to_string(),
                )
            }
        })?;

    let cookie = open_session(&state, user.id).await?;
    let response = AuthResponse {
        user_id: user.id,
        email: user.email,
    };

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // A missing user and a wrong password produce the same response, so the
    // endpoint doesn't leak which addresses have accounts.
    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        )
    };

    let creds = state
        .store
        .find_credentials(&req.email)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => invalid(),
            other => {
                error!("Failed to look up credentials: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Authentication error".to_string(),
                )
            }
        })?;

    let parsed_hash = PasswordHash::new(&creds.password_hash).map_err(|e| {
        error!("Failed to parse password hash: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication error".to_string(),
        )
    })?;

    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(invalid());
    }

    let cookie = open_session(&state, creds.user_id).await?;
    let response = AuthResponse {
        user_id: creds.user_id,
        email: creds.email,
    };

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    let session_id = crate::web::middleware::session_id_from_cookies(cookie_header)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .store
        .delete_auth_session(session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to logout".to_string(),
            )
        })?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie("", 0))],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_scoped_and_http_only() {
        let cookie = session_cookie("abc", 60);
        assert!(cookie.starts_with("session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=60"));
        assert!(cookie.contains("Path=/"));
    }
}
