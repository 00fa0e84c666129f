//! Retry with exponential backoff around any `Model`.

use async_trait::async_trait;
use parley_abstraction::{ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ToolSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Retry configuration for transient model errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay_ms: 500, backoff_multiplier: 2.0, max_delay_ms: 8000 }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay_ms = (self.initial_delay_ms as f64
            * self.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32))
        .min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ModelError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ModelError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        model_id = %label,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// A model wrapper applying a `RetryPolicy` to every call.
pub struct RetryingModel {
    inner: Arc<dyn Model>,
    policy: RetryPolicy,
}

impl RetryingModel {
    /// Wraps `inner` with `policy`.
    pub fn new(inner: Arc<dyn Model>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Model for RetryingModel {
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        self.policy
            .run(self.inner.model_id(), || {
                self.inner.generate_chat_completion(messages, parameters.clone())
            })
            .await
    }

    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        self.policy
            .run(self.inner.model_id(), || {
                self.inner.generate_with_tools(messages, tools, parameters.clone())
            })
            .await
    }

    fn supports_tools(&self) -> bool {
        self.inner.supports_tools()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedModel;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, initial_delay_ms: 1, backoff_multiplier: 2.0, max_delay_ms: 4 }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let scripted = Arc::new(ScriptedModel::new("flaky"));
        scripted.push_error(ModelError::RequestError("connection reset".into()));
        scripted.push_error(ModelError::ServiceUnavailable { status: 502, message: "bad gateway".into() });
        scripted.push_text("recovered");

        let model = RetryingModel::new(scripted.clone(), fast_policy(3));
        let response = model.generate_chat_completion(&[ChatMessage::user("hi")], None).await.unwrap();

        assert_eq!(response.content, "recovered");
        assert_eq!(scripted.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_last_error() {
        let scripted = Arc::new(ScriptedModel::new("down"));
        for _ in 0..3 {
            scripted.push_error(ModelError::RequestError("timeout".into()));
        }

        let model = RetryingModel::new(scripted.clone(), fast_policy(2));
        let err = model.generate_chat_completion(&[ChatMessage::user("hi")], None).await.unwrap_err();

        assert_eq!(err, ModelError::RequestError("timeout".into()));
        assert_eq!(scripted.call_count(), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let scripted = Arc::new(ScriptedModel::new("bad"));
        scripted.push_error(ModelError::SerializationError("garbage".into()));
        scripted.push_text("never reached");

        let model = RetryingModel::new(scripted.clone(), fast_policy(5));
        assert!(model.generate_chat_completion(&[ChatMessage::user("hi")], None).await.is_err());
        assert_eq!(scripted.call_count(), 1);
    }
}
