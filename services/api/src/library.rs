//! services/api/src/library.rs
//!
//! The per-user document libraries: each user's vector index, the retrieval
//! chain bound to it, and the ingestion and removal pipelines that change it.
//!
//! Mutations for one user are serialised by that user's write lock. They work
//! on a copy of the current index, persist the copy, and only then publish it,
//! so a query always runs against a complete snapshot and a failed save leaves
//! both memory and disk at the previous version.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use study_assistant_core::domain::{ChatAnswer, IngestReport};
use study_assistant_core::ports::{
    EmbeddingService, PdfTextExtractor, PortError, PortResult, QuestionAnsweringService,
};
use study_assistant_core::{RecursiveCharacterSplitter, RetrievalQa, SearchParams, VectorIndex};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::storage::UserPaths;

/// Whether a user has anything searchable yet.
#[derive(Clone)]
pub enum IndexState {
    NoIndex,
    Ready(Arc<RetrievalQa>),
}

/// One user's library.
pub struct UserLibrary {
    paths: UserPaths,
    write_lock: Mutex<()>,
    state: RwLock<IndexState>,
}

impl UserLibrary {
    pub fn paths(&self) -> &UserPaths {
        &self.paths
    }

    /// The current pipeline, cloned out so the read lock is held only briefly.
    pub async fn state(&self) -> IndexState {
        self.state.read().await.clone()
    }

    pub async fn indexed_chunks(&self) -> usize {
        match &*self.state.read().await {
            IndexState::NoIndex => 0,
            IndexState::Ready(chain) => chain.index().len(),
        }
    }
}

/// The external services every user's pipeline is built from.
#[derive(Clone)]
pub struct PipelineServices {
    pub embedder: Arc<dyn EmbeddingService>,
    pub answerer: Arc<dyn QuestionAnsweringService>,
    pub extractor: Arc<dyn PdfTextExtractor>,
}

/// Owns every user's library. Built once at startup and shared by all handlers.
pub struct LibraryRegistry {
    data_dir: PathBuf,
    services: PipelineServices,
    splitter: RecursiveCharacterSplitter,
    search: SearchParams,
    libraries: RwLock<HashMap<String, Arc<UserLibrary>>>,
}

impl LibraryRegistry {
    pub fn new(data_dir: impl Into<PathBuf>, services: PipelineServices) -> Self {
        Self {
            data_dir: data_dir.into(),
            services,
            splitter: RecursiveCharacterSplitter::default(),
            search: SearchParams::default(),
            libraries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the user's library, creating its directories and an empty
    /// placeholder if this is the first time the user is seen.
    pub async fn ensure_user(&self, username: &str) -> PortResult<Arc<UserLibrary>> {
        if let Some(library) = self.libraries.read().await.get(username) {
            return Ok(library.clone());
        }

        let paths = UserPaths::new(&self.data_dir, username)?;
        paths.ensure_dirs().await?;

        let mut libraries = self.libraries.write().await;
        let library = libraries
            .entry(username.to_string())
            .or_insert_with(|| {
                Arc::new(UserLibrary {
                    paths,
                    write_lock: Mutex::new(()),
                    state: RwLock::new(IndexState::NoIndex),
                })
            })
            .clone();
        Ok(library)
    }

    /// Loads the persisted snapshot of every given user. A corrupt snapshot is an error.
    pub async fn load_users(&self, usernames: &[String]) -> PortResult<usize> {
        let mut loaded = 0;
        for username in usernames {
            let library = self.ensure_user(username).await?;
            if let Some(index) = library.paths.load_index().await? {
                info!(
                    "Loaded vector index for '{}' ({} vectors) from {}",
                    username,
                    index.len(),
                    library.paths.index_file().display()
                );
                *library.state.write().await = IndexState::Ready(self.build_chain(index));
                loaded += 1;
            } else {
                info!("No existing vector index for '{}'. Starting fresh.", username);
            }
        }
        Ok(loaded)
    }

    /// Indexes an uploaded PDF into the user's library.
    ///
    /// A PDF without extractable text is not an error: the index is left
    /// untouched and the report says zero chunks.
    pub async fn ingest(&self, username: &str, file_path: &Path, filename: &str) -> PortResult<IngestReport> {
        let library = self.ensure_user(username).await?;
        let _guard = library.write_lock.lock().await;

        info!("Starting indexing for PDF: {} (path: {})", filename, file_path.display());
        self.ingest_locked(&library, file_path, filename)
            .await
            .inspect_err(|e| error!("Failed to index '{}' for '{}': {}", filename, username, e))
    }

    async fn ingest_locked(&self, library: &UserLibrary, file_path: &Path, filename: &str) -> PortResult<IngestReport> {
        let pages = self.services.extractor.extract_pages(file_path).await?;
        info!("Successfully loaded PDF with {} pages", pages.len());
        if pages.is_empty() {
            warn!("PDF '{}' has no extractable text pages. Skipping indexing.", filename);
            return Ok(IngestReport::default());
        }
        for page in &pages {
            debug!(
                "Page {}: {}...",
                page.page_number,
                page.text.chars().take(200).collect::<String>()
            );
        }
        info!("Added metadata (source & document_id) to {} document pages", pages.len());

        let chunks = self.splitter.split_pages(filename, &pages);
        info!(
            "Split into {} chunks (chunk_size={}, overlap={})",
            chunks.len(),
            self.splitter.chunk_size(),
            self.splitter.chunk_overlap()
        );
        if chunks.is_empty() {
            warn!("No chunks created from '{}'. Possible empty or unreadable content.", filename);
            return Ok(IngestReport { pages: pages.len(), chunks: 0 });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.services.embedder.embed_documents(&texts).await?;

        let report = IngestReport { pages: pages.len(), chunks: chunks.len() };
        let index = match library.state().await {
            IndexState::NoIndex => {
                info!("Creating new vector index from scratch");
                let index = VectorIndex::from_chunks(chunks, embeddings)?;
                info!("New vector index created with {} vectors", index.len());
                index
            }
            IndexState::Ready(chain) => {
                let mut index = VectorIndex::clone(chain.index());
                let previous = index.len();
                info!("Adding {} chunks to existing vector index (previous: {} vectors)", report.chunks, previous);
                index.add(chunks, embeddings)?;
                info!("Successfully added chunks. New total vectors: {}", index.len());
                index
            }
        };

        self.publish(library, index).await?;
        info!("Successfully indexed '{}'", filename);
        Ok(report)
    }

    /// Removes every chunk of `filename` from the user's index.
    /// Returns the number of chunks removed; a missing index or document is a no-op.
    pub async fn remove(&self, username: &str, filename: &str) -> PortResult<usize> {
        let library = self.ensure_user(username).await?;
        let _guard = library.write_lock.lock().await;

        info!("Starting removal of document: {} from vector index of '{}'", filename, username);
        let chain = match library.state().await {
            IndexState::NoIndex => {
                warn!("No vector index for '{}'. Nothing to remove.", username);
                return Ok(0);
            }
            IndexState::Ready(chain) => chain,
        };

        let ids = chain.index().ids_for_document(filename);
        info!("Found {} chunks to delete for document '{}'", ids.len(), filename);
        if ids.is_empty() {
            warn!(
                "No chunks found with document_id='{}'. It may have already been removed or never indexed.",
                filename
            );
            return Ok(0);
        }

        let mut index = VectorIndex::clone(chain.index());
        let old_count = index.len();
        let removed = index.delete(&ids);
        info!("Deleted {} vectors. Vector count: {} -> {}", removed, old_count, index.len());

        self.publish(&library, index)
            .await
            .inspect_err(|e| error!("Failed to remove '{}' from vector index: {}", filename, e))?;
        info!("Successfully removed '{}' from vector index", filename);
        Ok(removed)
    }

    /// Answers a question from the user's documents.
    pub async fn answer(&self, username: &str, question: &str) -> PortResult<ChatAnswer> {
        let library = self.ensure_user(username).await?;
        let chain = match library.state().await {
            IndexState::NoIndex => {
                return Err(PortError::Unavailable(
                    "No documents indexed yet. Please upload at least one PDF.".to_string(),
                ))
            }
            IndexState::Ready(chain) => chain,
        };
        chain
            .answer(question)
            .await
            .inspect_err(|e| error!("Chat failed for '{}': {}", username, e))
    }

    /// Persists `index`, then swaps in a chain bound to it.
    async fn publish(&self, library: &UserLibrary, index: VectorIndex) -> PortResult<()> {
        let path = library.paths.save_index(&index).await?;
        info!("Vector index saved to disk at {}", path.display());

        *library.state.write().await = IndexState::Ready(self.build_chain(index));
        info!("Retriever and QA chain updated");
        Ok(())
    }

    fn build_chain(&self, index: VectorIndex) -> Arc<RetrievalQa> {
        Arc::new(RetrievalQa::new(
            Arc::new(index),
            self.services.embedder.clone(),
            self.services.answerer.clone(),
            self.search,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use study_assistant_core::domain::PageText;

    /// Bag-of-letters embedding over a-z.
    struct LetterEmbedder;

    fn embed(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 26];
        for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
        v
    }

    #[async_trait]
    impl EmbeddingService for LetterEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| embed(t)).collect())
        }
        async fn embed_query(&self, text: &str) -> PortResult<Vec<f32>> {
            Ok(embed(text))
        }
    }

    struct EchoAnswerer;

    #[async_trait]
    impl QuestionAnsweringService for EchoAnswerer {
        async fn answer_question(&self, _question: &str, context: &str) -> PortResult<String> {
            Ok(context.to_string())
        }
    }

    /// Treats the file as UTF-8 with pages separated by form feeds.
    struct TextPages;

    #[async_trait]
    impl PdfTextExtractor for TextPages {
        async fn extract_pages(&self, path: &Path) -> PortResult<Vec<PageText>> {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
            if text.starts_with("BROKEN") {
                return Err(PortError::Unexpected("Failed to parse PDF".to_string()));
            }
            Ok(text
                .split('\u{c}')
                .filter(|p| !p.is_empty())
                .enumerate()
                .map(|(i, p)| PageText { page_number: i as u32 + 1, text: p.to_string() })
                .collect())
        }
    }

    fn registry(dir: &Path) -> LibraryRegistry {
        LibraryRegistry::new(
            dir,
            PipelineServices {
                embedder: Arc::new(LetterEmbedder),
                answerer: Arc::new(EchoAnswerer),
                extractor: Arc::new(TextPages),
            },
        )
    }

    async fn upload(registry: &LibraryRegistry, user: &str, name: &str, body: &str) -> PortResult<IngestReport> {
        let library = registry.ensure_user(user).await.unwrap();
        let path = library.paths().store_pdf(name, body.as_bytes()).await.unwrap();
        registry.ingest(user, &path, name).await
    }

    #[tokio::test]
    async fn answer_before_any_index_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.ensure_user("alice").await.unwrap();

        let err = registry.answer("alice", "anything").await.unwrap_err();
        assert!(matches!(err, PortError::Unavailable(_)));
    }

    #[tokio::test]
    async fn ingest_then_answer_cites_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        let report = upload(&registry, "alice", "cells.pdf", "Mitochondria make energy.\u{c}Ribosomes make proteins.")
            .await
            .unwrap();
        assert_eq!(report, IngestReport { pages: 2, chunks: 2 });

        let answer = registry.answer("alice", "what makes proteins?").await.unwrap();
        assert_eq!(answer.sources, vec!["cells.pdf"]);
        assert!(answer.response.contains("Ribosomes"));
    }

    #[tokio::test]
    async fn empty_document_leaves_index_absent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        let report = upload(&registry, "alice", "scan.pdf", "").await.unwrap();
        assert_eq!(report.chunks, 0);

        let report = upload(&registry, "alice", "blank.pdf", "   \u{c}  ").await.unwrap();
        assert_eq!(report, IngestReport { pages: 2, chunks: 0 });

        assert!(matches!(registry.answer("alice", "q").await, Err(PortError::Unavailable(_))));
        let library = registry.ensure_user("alice").await.unwrap();
        assert!(!library.paths().index_file().exists());
    }

    #[tokio::test]
    async fn extraction_failure_propagates_and_keeps_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        upload(&registry, "alice", "good.pdf", "Photosynthesis").await.unwrap();

        let err = upload(&registry, "alice", "bad.pdf", "BROKEN bytes").await.unwrap_err();
        assert!(matches!(err, PortError::Unexpected(_)));

        let library = registry.ensure_user("alice").await.unwrap();
        assert_eq!(library.indexed_chunks().await, 1);
    }

    #[tokio::test]
    async fn remove_drops_only_that_document() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        upload(&registry, "alice", "a.pdf", "alpha alpha").await.unwrap();
        upload(&registry, "alice", "b.pdf", "beta beta").await.unwrap();

        assert_eq!(registry.remove("alice", "a.pdf").await.unwrap(), 1);
        assert_eq!(registry.remove("alice", "a.pdf").await.unwrap(), 0);
        assert_eq!(registry.remove("alice", "never.pdf").await.unwrap(), 0);

        let answer = registry.answer("alice", "alpha").await.unwrap();
        assert_eq!(answer.sources, vec!["b.pdf"]);
    }

    #[tokio::test]
    async fn remove_without_index_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert_eq!(registry.remove("alice", "a.pdf").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        upload(&registry, "alice", "notes.pdf", "alice studies chemistry").await.unwrap();

        assert!(matches!(registry.answer("bob", "chemistry").await, Err(PortError::Unavailable(_))));
        upload(&registry, "bob", "notes.pdf", "bob studies history").await.unwrap();
        let answer = registry.answer("bob", "chemistry").await.unwrap();
        assert!(answer.response.contains("history"));
        assert!(!answer.response.contains("chemistry"));
    }

    #[tokio::test]
    async fn snapshots_reload_into_identical_answers() {
        let dir = tempfile::tempdir().unwrap();
        let first = registry(dir.path());
        upload(&first, "alice", "a.pdf", "enzymes speed reactions\u{c}atoms bond").await.unwrap();
        upload(&first, "alice", "b.pdf", "gravity pulls mass").await.unwrap();
        let before = first.answer("alice", "how do enzymes work").await.unwrap();

        let second = registry(dir.path());
        assert_eq!(second.load_users(&["alice".to_string(), "bob".to_string()]).await.unwrap(), 1);
        let after = second.answer("alice", "how do enzymes work").await.unwrap();

        assert_eq!(before, after);
        assert!(matches!(second.answer("bob", "x").await, Err(PortError::Unavailable(_))));
    }

    #[tokio::test]
    async fn registry_answers_from_at_most_six_passages() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let pages: Vec<String> = (0..10)
            .map(|i| format!("Chapter {i} covers cell biology and {} review.", "x".repeat(i + 1)))
            .collect();

        let report = upload(&registry, "alice", "biology.pdf", &pages.join("\u{c}")).await.unwrap();
        assert_eq!(report.chunks, 10);

        // The echo answerer returns the stuffed context verbatim.
        let answer = registry.answer("alice", "cell biology review").await.unwrap();
        assert_eq!(answer.response.split("\n\n").count(), 6);
        assert_eq!(answer.sources, vec!["biology.pdf"]);
    }

    #[tokio::test]
    async fn concurrent_ingests_for_one_user_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(registry(dir.path()));
        let library = registry.ensure_user("alice").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let name = format!("doc{i}.pdf");
            let path = library.paths().store_pdf(&name, format!("topic {i}").as_bytes()).await.unwrap();
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move { registry.ingest("alice", &path, &name).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(library.indexed_chunks().await, 8);
        let on_disk = library.paths().load_index().await.unwrap().unwrap();
        assert_eq!(on_disk.len(), 8);
    }
}
