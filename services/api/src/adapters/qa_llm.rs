//! services/api/src/adapters/qa_llm.rs
//!
//! This module contains the adapter for the main Question-Answering LLM.
//! It implements the `QuestionAnsweringService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use study_assistant_core::ports::{PortError, PortResult, QuestionAnsweringService};
use tracing::debug;

/// System prompt of the "stuff" chain; `{context}` is replaced by the retrieved passages.
const SYSTEM_TEMPLATE: &str = "Use the following pieces of context to answer the user's question. \n\
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
----------------\n\
{context}";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `QuestionAnsweringService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiQaAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiQaAdapter {
    /// Creates a new `OpenAiQaAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

pub fn system_prompt(context: &str) -> String {
    SYSTEM_TEMPLATE.replace("{context}", context)
}

//=========================================================================================
// `QuestionAnsweringService` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuestionAnsweringService for OpenAiQaAdapter {
    /// Answers a question from the stuffed context, with deterministic decoding.
    async fn answer_question(&self, question: &str, context: &str) -> PortResult<String> {
        debug!("QUESTION: {}", question);
        debug!("CONTEXT ({} chars)", context.chars().count());

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt(context))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(question)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.0)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // Extract the text content from the first choice in the response.
        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(content.trim().to_string())
            } else {
                Err(PortError::Unexpected(
                    "QA LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "QA LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}
