//! crates/study_assistant_core/src/retrieval.rs
//!
//! The retrieval-and-answering chain: embed the question, pick passages from an
//! index snapshot with maximal marginal relevance, stuff them into one context
//! block and hand that to the answering service.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::ChatAnswer;
use crate::index::{ScoredChunk, VectorIndex};
use crate::ports::{EmbeddingService, PortError, PortResult, QuestionAnsweringService};

/// Separator placed between stuffed passages.
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    /// Passages handed to the model.
    pub k: usize,
    /// Nearest neighbours considered before re-ranking.
    pub fetch_k: usize,
    /// Relevance weight; the remainder rewards diversity.
    pub lambda: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: 6,
            fetch_k: 20,
            lambda: 0.7,
        }
    }
}

/// A question-answering pipeline bound to one immutable index snapshot.
/// Rebuilt whenever the owning user's index changes.
pub struct RetrievalQa {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingService>,
    answerer: Arc<dyn QuestionAnsweringService>,
    params: SearchParams,
}

impl RetrievalQa {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingService>,
        answerer: Arc<dyn QuestionAnsweringService>,
        params: SearchParams,
    ) -> Self {
        Self {
            index,
            embedder,
            answerer,
            params,
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Retrieves passages for `question` without calling the model.
    pub async fn retrieve(&self, question: &str) -> PortResult<Vec<ScoredChunk>> {
        let query = self.embedder.embed_query(question).await?;
        let hits = self.index.max_marginal_relevance_search(
            &query,
            self.params.k,
            self.params.fetch_k,
            self.params.lambda,
        )?;
        Ok(hits)
    }

    /// Answers `question` as given; surrounding whitespace only matters for the blank check.
    pub async fn answer(&self, question: &str) -> PortResult<ChatAnswer> {
        if question.trim().is_empty() {
            return Err(PortError::Validation("Missing or empty 'query' field.".to_string()));
        }

        let hits = self.retrieve(question).await?;
        let context = stuff_context(&hits);
        let response = self.answerer.answer_question(question, &context).await?;

        Ok(ChatAnswer {
            response,
            sources: distinct_sources(&hits),
        })
    }
}

pub fn stuff_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

/// Distinct source filenames, sorted.
pub fn distinct_sources(hits: &[ScoredChunk]) -> Vec<String> {
    hits.iter()
        .map(|hit| {
            let source = hit.chunk.metadata.source.as_str();
            if source.is_empty() { "Unknown" } else { source }.to_string()
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
