// Error types for society construction and sessions

use parley_abstraction::ModelError;
use thiserror::Error;

use crate::society::history::{TurnRecord, UsageLedger};

/// Result type for society operations
pub type Result<T> = std::result::Result<T, SocietyError>;

/// Society errors
#[derive(Debug, Error)]
pub enum SocietyError {
    /// Construction-time failure: missing credential, unknown model,
    /// invalid role or tool setup. Always fatal.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid tool arguments
    #[error("Invalid tool arguments for '{tool}': {reason}")]
    InvalidToolArguments {
        /// Tool name
        tool: String,
        /// Reason why arguments are invalid
        reason: String,
    },

    /// A tool ran but could not complete
    #[error("Tool '{tool}' failed: {reason}")]
    ToolInvocation {
        /// Tool name
        tool: String,
        /// Failure description
        reason: String,
    },

    /// Model error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A session aborted
    #[error(transparent)]
    Session(#[from] Box<SessionError>),
}

impl SocietyError {
    /// Maps a model construction failure. Credential and provider problems
    /// become `Configuration`; anything else stays a model error.
    pub fn from_construction(error: ModelError) -> Self {
        if error.is_configuration() {
            Self::Configuration(error.to_string())
        } else {
            Self::Model(error)
        }
    }

    /// Shorthand for a tool failure.
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ToolInvocation { tool: tool.into(), reason: reason.into() }
    }

    /// Shorthand for bad tool arguments.
    pub fn invalid_args(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidToolArguments { tool: tool.into(), reason: reason.into() }
    }

    /// Whether this error came from configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Fatal session failure.
///
/// Carries everything produced before the failure so callers can still
/// report partial progress.
#[derive(Debug, Error)]
#[error("Session aborted after {} turn(s): {reason}", history.len())]
pub struct SessionError {
    /// What went wrong
    pub reason: String,
    /// Role whose step failed, if any
    pub role: Option<String>,
    /// Underlying model error, if the failure came from a model
    #[source]
    pub model_error: Option<ModelError>,
    /// Turns completed before the failure
    pub history: Vec<TurnRecord>,
    /// Usage accumulated before the failure
    pub usage: UsageLedger,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_errors_map_to_configuration() {
        let err = SocietyError::from_construction(ModelError::MissingCredential {
            platform: "deepseek".to_string(),
            variable: "DEEPSEEK_API_KEY".to_string(),
        });
        assert!(err.is_configuration());
        assert!(err.to_string().contains("DEEPSEEK_API_KEY"));

        let err = SocietyError::from_construction(ModelError::RequestError("reset".to_string()));
        assert!(matches!(err, SocietyError::Model(_)));
    }

    #[test]
    fn test_session_error_display_counts_turns() {
        let err = SessionError {
            reason: "assistant model failed".to_string(),
            role: Some("assistant".to_string()),
            model_error: None,
            history: Vec::new(),
            usage: UsageLedger::default(),
        };
        assert_eq!(err.to_string(), "Session aborted after 0 turn(s): assistant model failed");
    }
}
