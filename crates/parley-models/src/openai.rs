//! OpenAI-compatible chat model implementation.
//!
//! One client covers every provider that speaks the Chat Completions wire
//! format: OpenAI itself, DeepSeek, and gateways such as DashScope's
//! compatible mode used for Qwen models. Native function calling is
//! supported through `generate_with_tools`.
//!
//! ```no_run
//! use parley_models::OpenAICompatibleModel;
//! use parley_abstraction::{ChatMessage, Model};
//!
//! # async fn example() -> Result<(), parley_abstraction::ModelError> {
//! let model = OpenAICompatibleModel::new(
//!     "deepseek",
//!     "deepseek-chat",
//!     "https://api.deepseek.com/v1",
//!     Some("sk-...".to_string()),
//! );
//! let response = model.generate_chat_completion(&[ChatMessage::user("Say hello")], None).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use parley_abstraction::{
    ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage, ToolCallRequest,
    ToolSpec,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// Chat model reachable over an OpenAI-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleModel {
    /// Provider label used in logs and quota errors (e.g., "deepseek").
    provider: String,
    /// The model identifier (e.g., "deepseek-chat", "qwen-max").
    model_id: String,
    /// Base URL ending before `/chat/completions`.
    base_url: String,
    /// Optional bearer token.
    api_key: Option<String>,
    /// Generation parameters bound at construction.
    defaults: ModelParameters,
    /// HTTP client for requests.
    client: Client,
}

impl OpenAICompatibleModel {
    /// Creates a new client for `model_id` served at `base_url`.
    pub fn new(
        provider: impl Into<String>,
        model_id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            defaults: ModelParameters::default(),
            client: Client::new(),
        }
    }

    /// Binds generation parameters used when a call passes none.
    #[must_use]
    pub fn with_defaults(mut self, defaults: ModelParameters) -> Self {
        self.defaults = defaults;
        self
    }

    /// Replaces the HTTP client with one that enforces a request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ModelError> {
        self.client = Client::builder().timeout(timeout).build().map_err(|e| {
            ModelError::RequestError(format!("Failed to create HTTP client: {}", e))
        })?;
        Ok(self)
    }

    /// Provider label.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generation parameters bound at construction.
    pub fn defaults(&self) -> &ModelParameters {
        &self.defaults
    }

    /// Overlays per-call parameters on the bound defaults.
    fn effective_parameters(&self, overrides: Option<ModelParameters>) -> ModelParameters {
        let Some(overrides) = overrides else {
            return self.defaults.clone();
        };
        ModelParameters {
            temperature: overrides.temperature.or(self.defaults.temperature),
            top_p: overrides.top_p.or(self.defaults.top_p),
            max_tokens: overrides.max_tokens.or(self.defaults.max_tokens),
            stop_sequences: overrides.stop_sequences.or_else(|| self.defaults.stop_sequences.clone()),
        }
    }

    fn to_wire_message(message: &ChatMessage) -> WireMessage {
        let content = if message.images.is_empty() {
            if message.content.is_empty() && !message.tool_calls.is_empty() {
                None
            } else {
                Some(WireContent::Text(message.content.clone()))
            }
        } else {
            let mut parts = vec![WirePart::Text { text: message.content.clone() }];
            parts.extend(
                message
                    .images
                    .iter()
                    .map(|url| WirePart::ImageUrl { image_url: WireImageUrl { url: url.clone() } }),
            );
            Some(WireContent::Parts(parts))
        };

        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        call_type: "function".to_string(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
            )
        };

        WireMessage {
            role: message.role.clone(),
            content,
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }

    fn to_wire_tools(tools: &[ToolSpec]) -> Vec<WireTool> {
        tools
            .iter()
            .map(|tool| WireTool {
                tool_type: "function",
                function: WireFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    }

    /// Parses tool calls from a provider reply.
    ///
    /// Arguments that are not valid JSON are passed through as a string so
    /// the tool can report the problem back to the model.
    fn parse_tool_calls(calls: &[WireToolCall]) -> Vec<ToolCallRequest> {
        calls
            .iter()
            .map(|call| {
                let arguments = serde_json::from_str::<Value>(&call.function.arguments)
                    .unwrap_or_else(|_| Value::String(call.function.arguments.clone()));
                ToolCallRequest { id: call.id.clone(), name: call.function.name.clone(), arguments }
            })
            .collect()
    }

    /// Maps a non-success HTTP status to a `ModelError`.
    fn map_status_error(&self, status: u16, error_text: String) -> ModelError {
        match status {
            401 | 403 => ModelError::UnsupportedModelProvider(format!(
                "Authentication failed ({}): {}",
                status, error_text
            )),
            402 | 429 => ModelError::QuotaExceeded {
                provider: self.provider.clone(),
                message: Some(error_text),
            },
            500..=599 => ModelError::ServiceUnavailable { status, message: error_text },
            _ => ModelError::ModelResponseError(format!("API error ({}): {}", status, error_text)),
        }
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let params = self.effective_parameters(parameters);

        let request_body = ChatCompletionRequest {
            model: &self.model_id,
            messages: messages.iter().map(Self::to_wire_message).collect(),
            tools: Self::to_wire_tools(tools),
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            stop: params.stop_sequences,
        };

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(ref api_key) = self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(
                provider = %self.provider,
                error = %e,
                url = %url,
                "Failed to send request to chat completions API"
            );
            ModelError::RequestError(format!("Network error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = %self.provider,
                status = %status,
                error = %error_text,
                "Chat completions API returned error status"
            );
            return Err(self.map_status_error(status.as_u16(), error_text));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!(provider = %self.provider, error = %e, "Failed to parse chat completions response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            ModelError::ModelResponseError("No choices in API response".to_string())
        })?;

        let content = match choice.message.content {
            Some(WireContent::Text(text)) => text,
            Some(WireContent::Parts(parts)) => parts
                .into_iter()
                .filter_map(|part| match part {
                    WirePart::Text { text } => Some(text),
                    WirePart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        };
        let tool_calls =
            choice.message.tool_calls.as_deref().map(Self::parse_tool_calls).unwrap_or_default();

        let usage = body.usage.map(|u| ModelUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ModelResponse {
            content,
            model_id: Some(self.model_id.clone()),
            usage,
            tool_calls,
            finish_reason: choice.finish_reason,
        })
    }
}

#[async_trait]
impl Model for OpenAICompatibleModel {
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            provider = %self.provider,
            model_id = %self.model_id,
            message_count = messages.len(),
            parameters = ?parameters,
            "Generating chat completion"
        );
        self.send(messages, &[], parameters).await
    }

    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            provider = %self.provider,
            model_id = %self.model_id,
            message_count = messages.len(),
            tool_count = tools.len(),
            "Generating chat completion with tools"
        );
        self.send(messages, tools, parameters).await
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// Chat Completions request/response structures

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_call_type")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)] // Matches API naming
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
