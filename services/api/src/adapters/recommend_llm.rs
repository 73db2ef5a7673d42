//! services/api/src/adapters/recommend_llm.rs
//!
//! This module contains the adapter for the recommendation LLM.
//! It implements the `RecommendationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use library_core::ports::{PortError, PortResult, RecommendationService};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `RecommendationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiRecommendAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiRecommendAdapter {
    /// Creates a new `OpenAiRecommendAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `RecommendationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecommendationService for OpenAiRecommendAdapter {
    /// Passes the assembled reading-history prompt through to the model and
    /// returns its free-text suggestions untouched.
    async fn recommend(&self, prompt: &str) -> PortResult<String> {
        let messages = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(500u32)
            .temperature(0.7)
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
                Ok(content)
            } else {
                Err(PortError::Unexpected(
                    "Recommendation LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Recommendation LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}
