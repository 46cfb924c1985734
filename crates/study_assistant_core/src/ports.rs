//! crates/study_assistant_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of the PDF parser, the embedding and chat APIs, and the account file.

use async_trait::async_trait;
use std::path::Path;

use crate::domain::{PageText, UserAccount};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., file system, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates an account and persists the full account set.
    /// Fails with `Conflict` if the username is taken.
    async fn create_account(&self, username: &str, password_hash: &str) -> PortResult<UserAccount>;

    /// Fails with `NotFound` for unknown usernames.
    async fn get_account(&self, username: &str) -> PortResult<UserAccount>;

    async fn list_usernames(&self) -> PortResult<Vec<String>>;

    /// Rewrites the persisted account set.
    async fn flush(&self) -> PortResult<()>;
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embeds a batch of chunk texts, returning one vector per input in input order.
    async fn embed_documents(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>>;

    /// Embeds a single search query.
    async fn embed_query(&self, text: &str) -> PortResult<Vec<f32>>;
}

#[async_trait]
pub trait QuestionAnsweringService: Send + Sync {
    /// Answers a question based on a provided context.
    async fn answer_question(&self, question: &str, context: &str) -> PortResult<String>;
}

#[async_trait]
pub trait PdfTextExtractor: Send + Sync {
    /// Extracts text page by page. An unreadable file is an error; a file
    /// without text yields empty pages or no pages at all.
    async fn extract_pages(&self, path: &Path) -> PortResult<Vec<PageText>>;
}
