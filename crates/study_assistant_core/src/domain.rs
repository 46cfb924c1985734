//! crates/study_assistant_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any storage or transport format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user. Only ever created, never updated or deleted.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A bearer-token login session held in memory.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Text extracted from one page of a PDF. Pages are numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// Metadata attached to every page and inherited by every chunk cut from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl ChunkMetadata {
    /// Metadata for a page of an uploaded file; the document id is the filename.
    pub fn for_page(filename: &str, page: u32) -> Self {
        Self {
            source: filename.to_string(),
            document_id: filename.to_string(),
            page: Some(page),
        }
    }
}

/// A bounded span of document text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// The result of a retrieval-augmented question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatAnswer {
    pub response: String,
    pub sources: Vec<String>,
}

/// What an ingestion run produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: usize,
    pub chunks: usize,
}
