//! services/api/src/adapters/embeddings.rs
//!
//! This module contains the adapter for the embedding model.
//! It implements the `EmbeddingService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig, error::OpenAIError, types::CreateEmbeddingRequestArgs, Client,
};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use study_assistant_core::ports::{EmbeddingService, PortError, PortResult};
use tracing::debug;

/// Inputs sent per embeddings request.
const BATCH_SIZE: usize = 256;
/// Batches in flight at once for a single document.
const MAX_CONCURRENT_BATCHES: usize = 4;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `EmbeddingService` using an OpenAI-compatible embeddings API.
#[derive(Clone)]
pub struct OpenAiEmbeddingAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbeddingAdapter {
    /// Creates a new `OpenAiEmbeddingAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    async fn embed_batch(&self, inputs: Vec<String>) -> PortResult<Vec<Vec<f32>>> {
        let expected = inputs.len();
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(inputs)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // The API tags each vector with its input position; don't rely on response order.
        let mut data = response.data;
        data.sort_by_key(|embedding| embedding.index);
        if data.len() != expected {
            return Err(PortError::Unexpected(format!(
                "Embedding API returned {} vectors for {} inputs",
                data.len(),
                expected
            )));
        }
        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }
}

//=========================================================================================
// `EmbeddingService` Trait Implementation
//=========================================================================================

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingAdapter {
    async fn embed_documents(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
        debug!("Embedding {} texts with {}", texts.len(), self.model);
        // `buffered` keeps batch order, so vectors line up with `texts`.
        let batches: Vec<Vec<String>> = texts.chunks(BATCH_SIZE).map(<[String]>::to_vec).collect();
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| self.embed_batch(batch))
            .buffered(MAX_CONCURRENT_BATCHES)
            .try_collect()
            .await?;
        Ok(batches.into_iter().flatten().collect())
    }

    async fn embed_query(&self, text: &str) -> PortResult<Vec<f32>> {
        self.embed_batch(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| PortError::Unexpected("Embedding API returned no vector".to_string()))
    }
}
