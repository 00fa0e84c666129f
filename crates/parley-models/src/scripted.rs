//! A model that replays a prepared script of responses.
//!
//! Used to drive societies deterministically in tests and offline runs.

use async_trait::async_trait;
use parley_abstraction::{
    ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage, ToolCallRequest,
    ToolSpec,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Replays queued responses in order, recording every request.
#[derive(Debug)]
pub struct ScriptedModel {
    id: String,
    script: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    fallback: Option<ModelResponse>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    advertised_tools: Mutex<Vec<Vec<String>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    /// Creates an empty script.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            advertised_tools: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Response returned once the script is exhausted.
    #[must_use]
    pub fn with_fallback(mut self, response: ModelResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Queues a full response.
    pub fn push(&self, response: ModelResponse) {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).push_back(Ok(response));
    }

    /// Queues a text reply with a small usage record.
    pub fn push_text(&self, content: impl Into<String>) {
        let content = content.into();
        let usage = ModelUsage::new(10, content.split_whitespace().count() as u32);
        self.push(ModelResponse {
            content,
            model_id: Some(self.id.clone()),
            usage: Some(usage),
            ..ModelResponse::default()
        });
    }

    /// Queues a reply that requests one tool call.
    pub fn push_tool_call(&self, name: impl Into<String>, arguments: serde_json::Value) {
        let index = self.script.lock().unwrap_or_else(PoisonError::into_inner).len();
        self.push(ModelResponse {
            content: String::new(),
            model_id: Some(self.id.clone()),
            usage: Some(ModelUsage::new(10, 5)),
            tool_calls: vec![ToolCallRequest {
                id: format!("call_{}", index),
                name: name.into(),
                arguments,
            }],
            finish_reason: Some("tool_calls".to_string()),
        });
    }

    /// Queues an error.
    pub fn push_error(&self, error: ModelError) {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).push_back(Err(error));
    }

    /// Number of calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Message lists received, one entry per call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Tool names advertised on each call.
    pub fn advertised_tools(&self) -> Vec<Vec<String>> {
        self.advertised_tools.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn next(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ModelResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(messages.to_vec());
        self.advertised_tools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tools.iter().map(|t| t.name.clone()).collect());

        let next = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match next {
            Some(result) => result,
            None => self.fallback.clone().ok_or_else(|| {
                ModelError::Other(format!("Script for '{}' is exhausted", self.id))
            }),
        }
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        _parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        self.next(messages, &[])
    }

    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        _parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        self.next(messages, tools)
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}
