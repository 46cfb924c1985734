//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user registration, login, and logout.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_assistant_core::ports::PortError;
use tracing::error;
use utoipa::ToSchema;

use crate::error::port_error_response;
use crate::web::state::{AppState, AuthUser};

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// Missing fields deserialize as empty strings so they fail validation with a 400.
#[derive(Deserialize, ToSchema)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    pub username: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /register - Create a new account and sign it in
#[utoipa::path(
    post,
    path = "/register",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 400, description = "Missing fields, short username or username taken"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Create the account and its first session
    let session = state
        .sessions
        .register(&req.username, &req.password)
        .await
        .map_err(port_error_response)?;

    // 2. Create the user's empty library
    state
        .libraries
        .ensure_user(&session.username)
        .await
        .map_err(|e| {
            error!("Failed to initialise library for '{}': {:?}", session.username, e);
            port_error_response(e)
        })?;

    Ok(Json(AuthResponse {
        access_token: session.token,
        message: format!("User '{}' registered successfully.", session.username),
        username: session.username,
    }))
}

/// POST /login - Sign in to an existing account
#[utoipa::path(
    post,
    path = "/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Unknown user or incorrect password")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .sessions
        .login(&req.username, &req.password)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) | PortError::Unauthorized(_) => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password".to_string())
            }
            other => port_error_response(other),
        })?;

    Ok(Json(AuthResponse {
        access_token: session.token,
        message: "Login successful.".to_string(),
        username: session.username,
    }))
}

/// POST /logout - Invalidate every session of the caller
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "Invalid or expired token")
    ),
    security(("bearer" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .sessions
        .logout(&user.token)
        .await
        .map_err(port_error_response)?;

    Ok(Json(MessageResponse {
        message: format!("User '{}' logged out successfully.", user.username),
    }))
}
