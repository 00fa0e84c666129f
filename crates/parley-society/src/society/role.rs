//! Role and task descriptions a session is built from.

use parley_abstraction::{Model, ModelParameters};
use std::sync::Arc;

use crate::toolkits::{ToolRegistry, Toolkit};

/// Default word limit for task specification.
pub const DEFAULT_TASK_SPECIFY_WORD_LIMIT: usize = 50;

/// One side of the conversation.
#[derive(Clone)]
pub struct RoleConfig {
    /// Role name, e.g. "user" or "assistant"
    pub name: String,
    /// Model answering for this role
    pub model: Arc<dyn Model>,
    /// Tools the role may call
    pub tools: ToolRegistry,
    /// Per-call parameters; `None` uses the model's bound defaults
    pub parameters: Option<ModelParameters>,
}

impl RoleConfig {
    /// A role without tools.
    pub fn new(name: impl Into<String>, model: Arc<dyn Model>) -> Self {
        Self { name: name.into(), model, tools: ToolRegistry::new(), parameters: None }
    }

    /// Replace the tool registry.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Append every tool of `toolkit`.
    #[must_use]
    pub fn with_toolkit(mut self, toolkit: &dyn Toolkit) -> Self {
        self.tools.add_toolkit(toolkit);
        self
    }

    /// Override generation parameters for this role.
    #[must_use]
    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

impl std::fmt::Debug for RoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleConfig")
            .field("name", &self.name)
            .field("model", &self.model.model_id())
            .field("tools", &self.tools.tool_names())
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// The task a session works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Natural-language task
    pub prompt: String,
    /// Rewrite the task into a more specific one before the first round
    pub with_task_specify: bool,
    /// Word budget for the rewritten task
    pub task_specify_word_limit: usize,
    /// Language every role must answer in
    pub output_language: Option<String>,
}

impl TaskSpec {
    /// A task used as-is, in whatever language the models choose.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            with_task_specify: false,
            task_specify_word_limit: DEFAULT_TASK_SPECIFY_WORD_LIMIT,
            output_language: None,
        }
    }

    /// Enable or disable task specification.
    #[must_use]
    pub fn with_task_specify(mut self, enabled: bool) -> Self {
        self.with_task_specify = enabled;
        self
    }

    /// Word budget for task specification.
    #[must_use]
    pub fn with_word_limit(mut self, words: usize) -> Self {
        self.task_specify_word_limit = words;
        self
    }

    /// Force every role to answer in `language`.
    #[must_use]
    pub fn with_output_language(mut self, language: impl Into<String>) -> Self {
        self.output_language = Some(language.into());
        self
    }
}
