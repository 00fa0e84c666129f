//! Model implementations for Parley.
//!
//! This crate provides concrete implementations of the `Model` trait.
//!
//! # Supported Providers
//!
//! - **Mock**: echoes the conversation, for smoke runs
//! - **Scripted**: replays prepared responses, for tests
//! - **OpenAI / DeepSeek / OpenAI-compatible**: Chat Completions over HTTP,
//!   with native tool calling

pub mod environment;
pub mod factory;
pub mod openai;
pub mod retry;
pub mod scripted;

use async_trait::async_trait;
use parley_abstraction::{ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage};
use tracing::debug;

pub use environment::Environment;
pub use factory::{ModelConfig, ModelFactory, ModelPlatform};
pub use openai::OpenAICompatibleModel;
pub use retry::{RetryPolicy, RetryingModel};
pub use scripted::ScriptedModel;

/// A mock implementation of the `Model` trait for smoke runs.
///
/// Replies with a digest of the last message it received and never calls tools.
#[derive(Debug, Default)]
pub struct MockModel {
    id: String,
}

impl MockModel {
    /// Creates a new `MockModel` with the given ID.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self { id }
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.id,
            message_count = messages.len(),
            parameters = ?parameters,
            "MockModel generating chat completion"
        );

        let last = messages.last().map_or("", |m| m.content.as_str());
        let response_content = format!("Mock response from {}: {}", self.id, last);

        let prompt_tokens = messages.iter().map(|m| count_tokens(&m.content)).sum::<u32>();
        let completion_tokens = count_tokens(&response_content);

        Ok(ModelResponse {
            content: response_content,
            model_id: Some(self.id.clone()),
            usage: Some(ModelUsage::new(prompt_tokens, completion_tokens)),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Count tokens in a string (simplified: word count).
#[allow(clippy::cast_possible_truncation)]
fn count_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
