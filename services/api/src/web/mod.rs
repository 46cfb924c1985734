//! services/api/src/web/mod.rs
//!
//! HTTP surface: handlers, auth middleware and the router that wires them.

pub mod auth;
pub mod chat;
pub mod documents;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::web::{rest::ApiDoc, state::AppState};

/// Builds the CORS layer from a comma-separated origin list; `*` allows any origin.
pub fn cors_layer(allow_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    if allow_origin.trim() == "*" {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allow_origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Builds the complete application router, Swagger UI included.
pub fn router(app_state: Arc<AppState>) -> Router {
    let config = app_state.config.clone();

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/register", post(auth::register_handler))
        .route("/login", post(auth::login_handler));

    // Protected routes (bearer token required)
    let protected_routes = Router::new()
        .route("/logout", post(auth::logout_handler))
        .route("/upload_pdf", post(documents::upload_pdf_handler))
        .route("/remove_pdf/{filename}", delete(documents::remove_pdf_handler))
        .route("/list_pdfs", get(documents::list_pdfs_handler))
        .route("/chat", post(chat::chat_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(&config.cors_allow_origin))
        .layer(TraceLayer::new_for_http())
}
