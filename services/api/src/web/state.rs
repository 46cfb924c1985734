//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-request identity
//! inserted by the auth middleware.

use crate::config::Config;
use crate::library::LibraryRegistry;
use crate::sessions::SessionManager;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub libraries: Arc<LibraryRegistry>,
}

//=========================================================================================
// AuthUser (Specific to One Request)
//=========================================================================================

/// The authenticated caller, placed in request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
    pub token: String,
}
