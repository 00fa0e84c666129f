//! Model abstraction layer for Parley.
//!
//! This module defines the core traits and types for talking to chat models,
//! including the wire-neutral shapes used for native tool calling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::AddAssign;
use thiserror::Error;

/// Represents an error that can occur when interacting with an AI model.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// An error occurred during the API request (e.g., network issues, timeouts).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The model returned an error (e.g., invalid input, malformed reply).
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// The provider answered with a server-side failure (5xx).
    #[error("Provider unavailable ({status}): {message}")]
    ServiceUnavailable {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Body or reason reported by the provider.
        message: String,
    },

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The model provider or model identifier is not supported.
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// A credential required by the provider was not found.
    #[error("Missing credential '{variable}' for platform '{platform}'")]
    MissingCredential {
        /// Platform that needs the credential (e.g., "deepseek").
        platform: String,
        /// Environment variable the credential is read from.
        variable: String,
    },

    /// Provider quota exceeded or rate limit hit.
    #[error("Provider '{provider}' quota exceeded{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExceeded {
        /// The provider name (e.g., "openai", "deepseek").
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

impl ModelError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, rate limits and 5xx answers are transient.
    /// Configuration and decoding problems are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestError(_) | Self::ServiceUnavailable { .. } | Self::QuotaExceeded { .. }
        )
    }

    /// Whether this error stems from configuration rather than a call.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnsupportedModelProvider(_) | Self::MissingCredential { .. })
    }
}

/// A tool call requested by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned identifier for this call.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as a JSON value (usually an object).
    pub arguments: Value,
}

/// A tool as advertised to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Function name.
    pub name: String,
    /// Human readable description.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// Represents a message in a conversation with a chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender ("system", "user", "assistant", "tool").
    pub role: String,
    /// The text content of the message.
    pub content: String,
    /// Attached images as `data:` or `http(s)` URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// Tool calls carried by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// For role "tool": the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    /// Creates a tool observation answering `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::with_role("tool", content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// Attaches tool calls (assistant messages only).
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Attaches an image URL.
    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.images.push(url.into());
        self
    }
}

/// Parameters for controlling the model's generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// What sampling temperature to use, between 0 and 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling probability mass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// The maximum number of tokens to generate in the chat completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sequences where the API will stop generating further tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl ModelParameters {
    /// Parameters with only a temperature set.
    pub fn with_temperature(temperature: f32) -> Self {
        Self { temperature: Some(temperature), ..Self::default() }
    }

    /// Sets the completion token cap.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// The response from a chat completion model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated text content (may be empty when only tools were called).
    pub content: String,

    /// Optional: The ID of the model used to generate the response.
    pub model_id: Option<String>,

    /// Optional: Usage statistics for the request.
    pub usage: Option<ModelUsage>,

    /// Tool calls requested by the model.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Provider finish reason ("stop", "length", "tool_calls", ...).
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl ModelResponse {
    /// A plain text response without usage information.
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Self::default() }
    }

    /// Whether the model asked for tools.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Usage statistics for a model request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,

    /// Number of tokens in the completion.
    pub completion_tokens: u32,

    /// Total number of tokens used.
    pub total_tokens: u32,
}

impl ModelUsage {
    /// Builds a usage record, deriving the total.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

impl AddAssign for ModelUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(rhs.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(rhs.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(rhs.total_tokens);
    }
}

/// A trait for interacting with different AI models.
///
/// All models must be `Send + Sync` so that one client can be shared by
/// several toolkits.
#[async_trait]
pub trait Model: Send + Sync {
    /// Generates a text completion based on the given prompt.
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails.
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        self.generate_chat_completion(&[ChatMessage::user(prompt)], parameters).await
    }

    /// Generates a chat completion based on the given conversation history.
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails.
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError>;

    /// Generates a chat completion while advertising `tools` to the model.
    ///
    /// Models without native function calling ignore the tools.
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails.
    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        let _ = tools;
        self.generate_chat_completion(messages, parameters).await
    }

    /// Whether the model understands native tool calls.
    fn supports_tools(&self) -> bool {
        false
    }

    /// Returns the ID of the model.
    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulates() {
        let mut total = ModelUsage::default();
        total += ModelUsage::new(10, 5);
        total += ModelUsage::new(3, 2);
        assert_eq!(total, ModelUsage { prompt_tokens: 13, completion_tokens: 7, total_tokens: 20 });
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ModelError::RequestError("timeout".into()).is_retryable());
        assert!(
            ModelError::QuotaExceeded { provider: "openai".into(), message: None }.is_retryable()
        );
        assert!(
            ModelError::ServiceUnavailable { status: 503, message: "busy".into() }.is_retryable()
        );
        assert!(!ModelError::SerializationError("bad json".into()).is_retryable());
        assert!(!ModelError::UnsupportedModelProvider("x".into()).is_retryable());
    }

    #[test]
    fn test_quota_display() {
        let err = ModelError::QuotaExceeded {
            provider: "deepseek".into(),
            message: Some("slow down".into()),
        };
        assert_eq!(err.to_string(), "Provider 'deepseek' quota exceeded: slow down");
    }

    #[test]
    fn test_tool_message_serialization_skips_empty_fields() {
        let value = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(value, serde_json::json!({"role": "user", "content": "hi"}));

        let value = serde_json::to_value(ChatMessage::tool("call_1", "ok")).unwrap();
        assert_eq!(value["tool_call_id"], "call_1");
    }
}
