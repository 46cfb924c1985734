//! services/api/src/web/chat.rs
//!
//! The question-answering endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::port_error_response;
use crate::web::state::{AppState, AuthUser};

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<String>,
}

/// Ask a question about the caller's uploaded documents.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Answer with its source filenames", body = ChatResponse),
        (status = 400, description = "Missing or empty query"),
        (status = 401, description = "Invalid or expired token"),
        (status = 503, description = "No documents indexed yet")
    ),
    security(("bearer" = []))
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let answer = state
        .libraries
        .answer(&user.username, &req.query)
        .await
        .map_err(port_error_response)?;

    Ok(Json(ChatResponse {
        response: answer.response,
        sources: answer.sources,
    }))
}
