//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::web::state::{AppState, AuthUser};

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Middleware that validates the bearer token and resolves the caller.
///
/// If valid, inserts an `AuthUser` into request extensions for handlers to use.
/// If missing, malformed, unknown or expired, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    // 1. Extract the bearer token
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
        .ok_or((StatusCode::UNAUTHORIZED, "Missing or malformed bearer token".to_string()))?;

    // 2. Validate the session, get the username
    let username = state.sessions.authenticate(&token).await.map_err(|e| {
        debug!("Rejected token: {}", e);
        (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string())
    })?;

    // 3. Insert the caller into request extensions
    req.extensions_mut().insert(AuthUser { username, token });

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
