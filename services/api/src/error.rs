//! services/api/src/error.rs
//!
//! Defines the primary error type for the API service, and the mapping from
//! port errors to HTTP status codes used by every handler.

use crate::config::ConfigError;
use axum::http::StatusCode;
use study_assistant_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps a port error onto the `(StatusCode, String)` pair handlers return.
pub fn port_error_response(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        PortError::Unexpected(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
    }
}
