//! Model factory for creating model instances from configuration.
//!
//! Credentials are resolved against an explicit [`Environment`] snapshot
//! rather than the process globals. Creating a model never performs I/O.

use crate::{Environment, MockModel, OpenAICompatibleModel, RetryPolicy, RetryingModel};
use parley_abstraction::{Model, ModelError, ModelParameters};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Default endpoint of the OpenAI API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default endpoint of the DeepSeek API.
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
/// Model identifiers served by DeepSeek.
pub const DEEPSEEK_MODELS: &[&str] = &["deepseek-chat", "deepseek-reasoner"];

/// Model platform enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPlatform {
    /// Mock model for testing.
    Mock,
    /// OpenAI's hosted API.
    OpenAI,
    /// DeepSeek's hosted API.
    DeepSeek,
    /// Any OpenAI-compatible endpoint (DashScope, vLLM, LM Studio, ...).
    OpenAICompatible,
}

impl ModelPlatform {
    /// Lowercase platform label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::OpenAI => "openai",
            Self::DeepSeek => "deepseek",
            Self::OpenAICompatible => "openai-compatible",
        }
    }

    /// Environment variable holding the platform's default credential.
    pub fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            Self::Mock | Self::OpenAICompatible => None,
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
        }
    }
}

impl fmt::Display for ModelPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelPlatform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "openai" => Ok(Self::OpenAI),
            "deepseek" => Ok(Self::DeepSeek),
            "openai-compatible" | "openai_compatible" | "openai_compatible_model" | "universal" => {
                Ok(Self::OpenAICompatible)
            }
            _ => Err(()),
        }
    }
}

/// Model configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// The platform serving the model.
    pub platform: ModelPlatform,
    /// The model ID (e.g., "deepseek-chat", "qwen-max").
    pub model_id: String,
    /// Explicit API key. Wins over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable to read the API key from.
    pub api_key_env: Option<String>,
    /// Endpoint override (required for `OpenAICompatible`).
    pub base_url: Option<String>,
    /// Generation parameters bound to the client.
    pub parameters: ModelParameters,
}

impl ModelConfig {
    /// Creates a new `ModelConfig` with the given platform and model ID.
    pub fn new(platform: ModelPlatform, model_id: impl Into<String>) -> Self {
        Self {
            platform,
            model_id: model_id.into(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            parameters: ModelParameters::default(),
        }
    }

    /// Sets an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Reads the API key from the named variable.
    #[must_use]
    pub fn with_api_key_env(mut self, variable: impl Into<String>) -> Self {
        self.api_key_env = Some(variable.into());
        self
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Binds generation parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Factory for creating model instances.
#[derive(Debug, Clone)]
pub struct ModelFactory {
    environment: Environment,
    retry: Option<RetryPolicy>,
    timeout: Duration,
}

impl ModelFactory {
    /// Creates a factory resolving credentials from `environment`.
    pub fn new(environment: Environment) -> Self {
        Self { environment, retry: None, timeout: Duration::from_secs(180) }
    }

    /// Wraps every created model in a `RetryingModel`.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Per-request HTTP timeout for remote models.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The environment used for credential lookup.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Creates a model instance from the given configuration.
    ///
    /// # Errors
    /// Returns `UnsupportedModelProvider` for unknown model identifiers or a
    /// missing endpoint, and `MissingCredential` when no API key is found.
    pub fn create(&self, config: ModelConfig) -> Result<Arc<dyn Model>, ModelError> {
        debug!(
            platform = %config.platform,
            model_id = %config.model_id,
            "Creating model instance"
        );

        if config.model_id.trim().is_empty() {
            return Err(ModelError::UnsupportedModelProvider(format!(
                "Empty model identifier for platform '{}'",
                config.platform
            )));
        }

        let model: Arc<dyn Model> = match config.platform {
            ModelPlatform::Mock => return Ok(Arc::new(MockModel::new(config.model_id))),
            ModelPlatform::DeepSeek if !DEEPSEEK_MODELS.contains(&config.model_id.as_str()) => {
                error!(model_id = %config.model_id, "Unrecognized DeepSeek model");
                return Err(ModelError::UnsupportedModelProvider(format!(
                    "Unrecognized DeepSeek model '{}'; expected one of: {}",
                    config.model_id,
                    DEEPSEEK_MODELS.join(", ")
                )));
            }
            platform => {
                let base_url = match (platform, config.base_url.clone()) {
                    (_, Some(url)) => url,
                    (ModelPlatform::OpenAI, None) => OPENAI_BASE_URL.to_string(),
                    (ModelPlatform::DeepSeek, None) => DEEPSEEK_BASE_URL.to_string(),
                    (_, None) => {
                        return Err(ModelError::UnsupportedModelProvider(
                            "base_url is required for OpenAI-compatible models. Use ModelConfig::with_base_url() to set it."
                                .to_string(),
                        ));
                    }
                };
                let api_key = self.resolve_api_key(&config)?;
                let model = OpenAICompatibleModel::new(
                    platform.as_str(),
                    config.model_id,
                    base_url,
                    api_key,
                )
                .with_defaults(config.parameters)
                .with_timeout(self.timeout)?;
                Arc::new(model)
            }
        };

        Ok(match &self.retry {
            Some(policy) => Arc::new(RetryingModel::new(model, policy.clone())),
            None => model,
        })
    }

    /// Creates a model instance from a platform string and model ID.
    ///
    /// # Errors
    /// Returns a `ModelError` if the platform is unrecognized or creation fails.
    pub fn create_from_str(
        &self,
        platform: &str,
        model_id: impl Into<String>,
    ) -> Result<Arc<dyn Model>, ModelError> {
        let platform = ModelPlatform::from_str(platform).map_err(|()| {
            error!(platform = %platform, "Unrecognized model platform");
            ModelError::UnsupportedModelProvider(format!("Unrecognized model platform: {}", platform))
        })?;
        self.create(ModelConfig::new(platform, model_id))
    }

    fn resolve_api_key(&self, config: &ModelConfig) -> Result<Option<String>, ModelError> {
        if let Some(key) = &config.api_key {
            return Ok(Some(key.clone()));
        }
        let variable = config
            .api_key_env
            .as_deref()
            .or_else(|| config.platform.default_api_key_env());
        match variable {
            Some(variable) => self.environment.require(config.platform.as_str(), variable).map(Some),
            // Local OpenAI-compatible servers commonly run without auth.
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> ModelFactory {
        ModelFactory::new(
            Environment::empty()
                .with_var("DEEPSEEK_API_KEY", "sk-deepseek")
                .with_var("QWEN_API_KEY", "sk-qwen"),
        )
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!(ModelPlatform::from_str("mock"), Ok(ModelPlatform::Mock));
        assert_eq!(ModelPlatform::from_str("DeepSeek"), Ok(ModelPlatform::DeepSeek));
        assert_eq!(ModelPlatform::from_str("OPENAI"), Ok(ModelPlatform::OpenAI));
        assert_eq!(
            ModelPlatform::from_str("openai_compatible_model"),
            Ok(ModelPlatform::OpenAICompatible)
        );
        assert_eq!(ModelPlatform::from_str("unknown"), Err(()));
    }

    #[test]
    fn test_create_mock() {
        let model = factory().create(ModelConfig::new(ModelPlatform::Mock, "test-mock")).unwrap();
        assert_eq!(model.model_id(), "test-mock");
    }

    #[test]
    fn test_create_deepseek_reads_environment() {
        let model =
            factory().create(ModelConfig::new(ModelPlatform::DeepSeek, "deepseek-chat")).unwrap();
        assert_eq!(model.model_id(), "deepseek-chat");
        assert!(model.supports_tools());
    }

    #[test]
    fn test_unknown_deepseek_model_is_rejected() {
        let err = factory()
            .create(ModelConfig::new(ModelPlatform::DeepSeek, "deepseek-imaginary"))
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::UnsupportedModelProvider(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_credential() {
        let err = factory().create(ModelConfig::new(ModelPlatform::OpenAI, "gpt-4o")).err().unwrap();
        assert_eq!(
            err,
            ModelError::MissingCredential {
                platform: "openai".to_string(),
                variable: "OPENAI_API_KEY".to_string()
            }
        );
    }

    #[test]
    fn test_compatible_requires_base_url() {
        let err = factory()
            .create(
                ModelConfig::new(ModelPlatform::OpenAICompatible, "qwen-max")
                    .with_api_key_env("QWEN_API_KEY"),
            )
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::UnsupportedModelProvider(msg) if msg.contains("base_url")));
    }

    #[test]
    fn test_compatible_with_named_credential() {
        let model = factory()
            .create(
                ModelConfig::new(ModelPlatform::OpenAICompatible, "qwen-max")
                    .with_base_url("https://dashscope.aliyuncs.com/compatible-mode/v1")
                    .with_api_key_env("QWEN_API_KEY"),
            )
            .unwrap();
        assert_eq!(model.model_id(), "qwen-max");
    }

    #[test]
    fn test_retry_wrapper_preserves_identity() {
        let model = factory()
            .with_retry_policy(RetryPolicy::default())
            .create(ModelConfig::new(ModelPlatform::DeepSeek, "deepseek-chat"))
            .unwrap();
        assert_eq!(model.model_id(), "deepseek-chat");
        assert!(model.supports_tools());
    }

    #[test]
    fn test_create_from_str_invalid_platform() {
        assert!(factory().create_from_str("invalid", "x").is_err());
    }
}
