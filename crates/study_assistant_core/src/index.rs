//! crates/study_assistant_core/src/index.rs
//!
//! A flat (exhaustive) similarity index over chunk embeddings, owned by one user.
//!
//! Every entry keeps its embedding next to the chunk text and metadata under an
//! opaque internal id. Search is a linear cosine-similarity scan, which is exact
//! and fast enough for a single user's study material.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::Chunk;
use crate::ports::PortError;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IndexError {
    #[error("embedding has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("got {embeddings} embeddings for {chunks} chunks")]
    LengthMismatch { chunks: usize, embeddings: usize },
    #[error("cannot build an index from zero chunks")]
    Empty,
}

impl From<IndexError> for PortError {
    fn from(e: IndexError) -> Self {
        PortError::Unexpected(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
}

/// A search hit with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Builds a new index from chunks and their embeddings.
    pub fn from_chunks(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dimension = embeddings.first().map(Vec::len).ok_or(IndexError::Empty)?;
        let mut index = Self {
            dimension,
            entries: Vec::new(),
        };
        index.add(chunks, embeddings)?;
        Ok(index)
    }

    /// Appends chunks, returning their new internal ids.
    /// Nothing is inserted if any embedding is malformed.
    pub fn add(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Vec<String>, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let id = Uuid::new_v4().to_string();
            ids.push(id.clone());
            self.entries.push(IndexEntry { id, embedding, chunk });
        }
        Ok(ids)
    }

    /// Removes the given ids and returns how many entries were dropped.
    pub fn delete(&mut self, ids: &[String]) -> usize {
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = self.entries.len();
        self.entries.retain(|entry| !doomed.contains(entry.id.as_str()));
        before - self.entries.len()
    }

    /// Ids of every chunk tagged with `document_id`. Linear in the index size.
    pub fn ids_for_document(&self, document_id: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.chunk.metadata.document_id == document_id)
            .map(|entry| entry.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` entries most similar to `query`, best first.
    pub fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        Ok(self
            .nearest(query, k)?
            .into_iter()
            .map(|(i, score)| self.scored(i, score))
            .collect())
    }

    /// Fetches the `fetch_k` nearest entries, then greedily picks `k` of them,
    /// trading similarity to the query against similarity to what was already
    /// picked. `lambda` of 1 is pure relevance, 0 is pure diversity.
    pub fn max_marginal_relevance_search(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let candidates = self.nearest(query, fetch_k.max(k))?;
        let embeddings: Vec<&[f32]> = candidates
            .iter()
            .map(|(i, _)| self.entries[*i].embedding.as_slice())
            .collect();

        Ok(maximal_marginal_relevance(query, &embeddings, lambda, k)
            .into_iter()
            .map(|pos| {
                let (i, score) = candidates[pos];
                self.scored(i, score)
            })
            .collect())
    }

    fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query, &entry.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    fn scored(&self, i: usize, score: f32) -> ScoredChunk {
        let entry = &self.entries[i];
        ScoredChunk {
            id: entry.id.clone(),
            chunk: entry.chunk.clone(),
            score,
        }
    }
}

/// Cosine similarity; zero vectors are treated as orthogonal to everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Returns positions into `embeddings`, in selection order.
pub fn maximal_marginal_relevance(query: &[f32], embeddings: &[&[f32]], lambda: f32, k: usize) -> Vec<usize> {
    let k = k.min(embeddings.len());
    if k == 0 {
        return Vec::new();
    }

    let to_query: Vec<f32> = embeddings.iter().map(|e| cosine_similarity(query, e)).collect();
    let first = to_query
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut selected = vec![first];

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (i, query_score) in to_query.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(embeddings[i], embeddings[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let score = lambda * query_score - (1.0 - lambda) * redundancy;
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((i, score));
            }
        }
        match best {
            Some((i, _)) => selected.push(i),
            None => break,
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkMetadata;

    fn chunk(doc: &str, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata::for_page(doc, 1),
        }
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::from_chunks(
            vec![
                chunk("a.pdf", "alpha"),
                chunk("a.pdf", "alpha twin"),
                chunk("b.pdf", "beta"),
                chunk("c.pdf", "gamma"),
            ],
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.99, 0.05, 0.0],
                vec![0.7, 0.7, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn from_chunks_rejects_empty_and_mismatched_input() {
        assert_eq!(VectorIndex::from_chunks(vec![], vec![]), Err(IndexError::Empty));
        assert_eq!(
            VectorIndex::from_chunks(vec![chunk("a.pdf", "x")], vec![vec![1.0], vec![2.0]]),
            Err(IndexError::LengthMismatch { chunks: 1, embeddings: 2 })
        );
    }

    #[test]
    fn add_rejects_wrong_dimension_without_partial_insert() {
        let mut index = sample_index();
        let err = index
            .add(
                vec![chunk("d.pdf", "ok"), chunk("d.pdf", "bad")],
                vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0]],
            )
            .unwrap_err();
        assert_eq!(err, IndexError::DimensionMismatch { expected: 3, actual: 2 });
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn similarity_search_orders_by_cosine() {
        let index = sample_index();
        let hits = index.similarity_search(&[1.0, 0.0, 0.0], 2).unwrap();
        let texts: Vec<_> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "alpha twin"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn mmr_prefers_diverse_results() {
        let index = sample_index();
        let hits = index
            .max_marginal_relevance_search(&[1.0, 0.0, 0.0], 2, 3, 0.3)
            .unwrap();
        let texts: Vec<_> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        // The near-duplicate "alpha twin" loses to the more distinct "beta".
        assert_eq!(texts, vec!["alpha", "beta"]);
    }

    #[test]
    fn mmr_with_full_relevance_matches_plain_search() {
        let index = sample_index();
        let query = [1.0, 0.1, 0.0];
        let mmr = index.max_marginal_relevance_search(&query, 3, 4, 1.0).unwrap();
        let plain = index.similarity_search(&query, 3).unwrap();
        assert_eq!(mmr, plain);
    }

    #[test]
    fn mmr_returns_at_most_available_candidates() {
        let index = sample_index();
        let hits = index.max_marginal_relevance_search(&[0.0, 1.0, 0.0], 6, 20, 0.7).unwrap();
        assert_eq!(hits.len(), 4);
        assert!(maximal_marginal_relevance(&[1.0], &[], 0.7, 6).is_empty());
    }

    #[test]
    fn query_dimension_is_checked() {
        let index = sample_index();
        assert!(index.similarity_search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn delete_by_document_id() {
        let mut index = sample_index();
        let ids = index.ids_for_document("a.pdf");
        assert_eq!(ids.len(), 2);

        assert_eq!(index.delete(&ids), 2);
        assert_eq!(index.len(), 2);
        assert!(index.ids_for_document("a.pdf").is_empty());
        assert!(index.entries.iter().all(|e| e.chunk.metadata.source != "a.pdf"));
    }

    #[test]
    fn bulk_delete_ignores_unknown_and_repeated_ids() {
        let chunks: Vec<Chunk> = (0..2000)
            .map(|i| chunk(if i % 2 == 0 { "even.pdf" } else { "odd.pdf" }, &format!("c{i}")))
            .collect();
        let embeddings = (0..2000).map(|i| vec![1.0, i as f32]).collect();
        let mut index = VectorIndex::from_chunks(chunks, embeddings).unwrap();

        let mut ids = index.ids_for_document("even.pdf");
        ids.extend(ids.clone());
        ids.push("no-such-id".to_string());

        assert_eq!(index.delete(&ids), 1000);
        assert_eq!(index.len(), 1000);
        assert!(index.ids_for_document("even.pdf").is_empty());
        assert_eq!(index.ids_for_document("odd.pdf").len(), 1000);
    }

    #[test]
    fn snapshot_survives_serialization() {
        let index = sample_index();
        let json = serde_json::to_string(&index).unwrap();
        let restored: VectorIndex = serde_json::from_str(&json).unwrap();

        let query = [0.6, 0.8, 0.0];
        assert_eq!(
            index.max_marginal_relevance_search(&query, 3, 4, 0.7).unwrap(),
            restored.max_marginal_relevance_search(&query, 3, 4, 0.7).unwrap()
        );
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
