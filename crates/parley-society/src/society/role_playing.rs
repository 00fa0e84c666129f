//! Two-role session: the initiator instructs, the responder executes.

use async_trait::async_trait;
use chrono::Utc;
use parley_abstraction::{ChatMessage, Model, ModelUsage};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::agent::ChatAgent;
use super::driver::{Society, StepError};
use super::history::{TurnRecord, UsageLedger};
use super::prompts::{self, COMPLETE_TASK_TOOL, KICKOFF_MESSAGE};
use super::role::{RoleConfig, TaskSpec};
use crate::config::SocietyConfig;
use crate::error::{Result, SocietyError};

/// Ledger entry charged for task specification.
pub const TASK_SPECIFIER_ROLE: &str = "task_specifier";

/// A configured two-role session, ready to be driven.
pub struct RolePlaying {
    task: TaskSpec,
    specified_task: Option<String>,
    user_role: String,
    assistant_role: String,
    user: ChatAgent,
    assistant: ChatAgent,
    tool_names: Vec<String>,
    models: BTreeMap<String, Arc<dyn Model>>,
    round_limit: usize,
    round: usize,
    pending: Option<ChatMessage>,
    ledger: UsageLedger,
    initialized: bool,
}

impl RolePlaying {
    /// Build a session from two roles.
    ///
    /// Fails with `Configuration` when the task is blank, the role names are
    /// blank or equal, a role's tool names collide, or the responder lists a
    /// tool named `complete_task`.
    pub fn new(task: TaskSpec, user: RoleConfig, assistant: RoleConfig, config: &SocietyConfig) -> Result<Self> {
        if task.prompt.trim().is_empty() {
            return Err(SocietyError::Configuration("Task must not be empty".to_string()));
        }
        if user.name.trim().is_empty() || assistant.name.trim().is_empty() {
            return Err(SocietyError::Configuration("Role names must not be empty".to_string()));
        }
        if user.name == assistant.name {
            return Err(SocietyError::Configuration(format!(
                "Role names must be distinct, both are '{}'",
                user.name
            )));
        }
        if task.with_task_specify && task.task_specify_word_limit == 0 {
            return Err(SocietyError::Configuration("Task specify word limit must be at least 1".to_string()));
        }
        config.validate()?;
        user.tools.validate()?;
        assistant.tools.validate()?;
        for role in [&user, &assistant] {
            if role.tools.find_tool(COMPLETE_TASK_TOOL).is_some() {
                return Err(SocietyError::Configuration(format!(
                    "Tool name '{}' is reserved (role '{}')",
                    COMPLETE_TASK_TOOL, role.name
                )));
            }
        }

        let tool_names = assistant.tools.tool_names().into_iter().map(str::to_string).collect();
        let models = BTreeMap::from([
            (user.name.clone(), user.model.clone()),
            (assistant.name.clone(), assistant.model.clone()),
        ]);

        let user_agent = ChatAgent::new(
            user.name.clone(),
            user.model,
            user.tools,
            user.parameters,
            config.max_tool_iterations,
        );
        let assistant_agent = ChatAgent::new(
            assistant.name.clone(),
            assistant.model,
            assistant.tools,
            assistant.parameters,
            config.max_tool_iterations,
        )
        .with_completion_tool();

        let mut session = Self {
            task,
            specified_task: None,
            user_role: user.name,
            assistant_role: assistant.name,
            user: user_agent,
            assistant: assistant_agent,
            tool_names,
            models,
            round_limit: config.round_limit,
            round: 0,
            pending: None,
            ledger: UsageLedger::new(),
            initialized: false,
        };
        session.apply_system_messages();
        Ok(session)
    }

    /// Register auxiliary models so they live as long as the session.
    #[must_use]
    pub fn with_models(mut self, models: impl IntoIterator<Item = (String, Arc<dyn Model>)>) -> Self {
        for (name, model) in models {
            self.models.entry(name).or_insert(model);
        }
        self
    }

    /// Role names as (initiator, responder).
    pub fn role_names(&self) -> (&str, &str) {
        (&self.user_role, &self.assistant_role)
    }

    /// Tool names available to the responder, excluding `complete_task`.
    pub fn assistant_tool_names(&self) -> &[String] {
        &self.tool_names
    }

    /// Models by logical role, auxiliaries included.
    pub fn models(&self) -> &BTreeMap<String, Arc<dyn Model>> {
        &self.models
    }

    /// The task as given.
    pub fn task(&self) -> &TaskSpec {
        &self.task
    }

    /// The task the roles work on: the specified one if available.
    pub fn effective_task(&self) -> &str {
        self.specified_task.as_deref().unwrap_or(&self.task.prompt)
    }

    fn apply_system_messages(&mut self) {
        let task = self.effective_task().to_string();
        let suffix = self
            .task
            .output_language
            .as_deref()
            .map(prompts::output_language_suffix)
            .unwrap_or_default();

        let user_prompt = prompts::user_system_prompt(&self.user_role, &self.assistant_role, &task);
        let assistant_prompt = prompts::assistant_system_prompt(&self.user_role, &self.assistant_role, &task);
        self.user.set_system_message(format!("{}{}", user_prompt, suffix));
        self.assistant.set_system_message(format!("{}{}", assistant_prompt, suffix));
    }

    async fn specify_task(&mut self) -> std::result::Result<(), StepError> {
        let prompt = prompts::task_specify_prompt(
            &self.task.prompt,
            &self.user_role,
            &self.assistant_role,
            self.task.task_specify_word_limit,
        );
        let mut messages = vec![ChatMessage::system("You can make a task more specific.")];
        if let Some(language) = &self.task.output_language {
            messages[0].content.push_str(&prompts::output_language_suffix(language));
        }
        messages.push(ChatMessage::user(prompt));

        let response = self
            .user
            .model()
            .generate_chat_completion(&messages, None)
            .await
            .map_err(|e| StepError::new(TASK_SPECIFIER_ROLE, e))?;
        self.ledger.record(TASK_SPECIFIER_ROLE, response.usage.unwrap_or_default());

        let specified = response.content.trim();
        if !specified.is_empty() {
            info!(task = %specified, "Specified task");
            self.specified_task = Some(specified.to_string());
        }
        Ok(())
    }
}

impl std::fmt::Debug for RolePlaying {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolePlaying")
            .field("task", &self.task)
            .field("user_role", &self.user_role)
            .field("assistant_role", &self.assistant_role)
            .field("tools", &self.tool_names)
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("round_limit", &self.round_limit)
            .field("round", &self.round)
            .finish()
    }
}

#[async_trait]
impl Society for RolePlaying {
    fn round_limit(&self) -> usize {
        self.round_limit
    }

    fn usage(&self) -> &UsageLedger {
        &self.ledger
    }

    async fn init(&mut self) -> std::result::Result<(), StepError> {
        if self.initialized {
            return Ok(());
        }
        if self.task.with_task_specify {
            self.specify_task().await?;
            self.apply_system_messages();
        }
        self.initialized = true;
        Ok(())
    }

    async fn step(&mut self) -> std::result::Result<TurnRecord, StepError> {
        self.init().await?;
        self.round += 1;
        debug!(round = self.round, "Starting round");

        let task = self.effective_task().to_string();
        let mut increments: BTreeMap<String, ModelUsage> = BTreeMap::new();

        let input = self.pending.take().unwrap_or_else(|| ChatMessage::user(KICKOFF_MESSAGE));
        let user_reply = self
            .user
            .step(input)
            .await
            .map_err(|e| StepError::new(self.user_role.clone(), e))?;
        self.ledger.record(&self.user_role, user_reply.usage);
        increments.insert(self.user_role.clone(), user_reply.usage);
        let instruction = user_reply.content;

        let assistant_reply = self
            .assistant
            .step(ChatMessage::user(prompts::wrap_instruction(&instruction, &task)))
            .await
            .map_err(|e| StepError::new(self.assistant_role.clone(), e))?;
        self.ledger.record(&self.assistant_role, assistant_reply.usage);
        increments.insert(self.assistant_role.clone(), assistant_reply.usage);

        let completed = assistant_reply.completion.is_some();
        let response = assistant_reply.content;
        self.pending = Some(ChatMessage::user(prompts::wrap_response(&response, &task)));

        Ok(TurnRecord {
            round: self.round,
            timestamp: Utc::now(),
            instruction,
            response,
            tool_invocations: assistant_reply.tool_invocations,
            usage: increments,
            cumulative_tokens: self.ledger.total_tokens(),
            completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkits::{FileWriteToolkit, Tool, ToolParameters, ToolRegistry, ToolResult, Toolkit};
    use parley_models::{MockModel, ScriptedModel};
    use serde_json::json;

    fn roles(user: Arc<dyn Model>, assistant: Arc<dyn Model>) -> (RoleConfig, RoleConfig) {
        (RoleConfig::new("user", user), RoleConfig::new("assistant", assistant))
    }

    fn mock() -> Arc<dyn Model> {
        Arc::new(MockModel::new("mock".to_string()))
    }

    #[test]
    fn test_construction_validates_roles_and_task() {
        let config = SocietyConfig::default();

        let (u, a) = roles(mock(), mock());
        assert!(RolePlaying::new(TaskSpec::new("   "), u, a, &config).unwrap_err().is_configuration());

        let err = RolePlaying::new(
            TaskSpec::new("task"),
            RoleConfig::new("same", mock()),
            RoleConfig::new("same", mock()),
            &config,
        )
        .unwrap_err();
        assert!(err.to_string().contains("distinct"));

        let err = RolePlaying::new(
            TaskSpec::new("task"),
            RoleConfig::new("", mock()),
            RoleConfig::new("assistant", mock()),
            &config,
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_reserved_tool_name_is_rejected() {
        struct Noop;
        #[async_trait]
        impl crate::toolkits::ToolHandler for Noop {
            async fn execute(&self, _: &crate::toolkits::ToolArguments) -> crate::error::Result<ToolResult> {
                Ok(ToolResult::success("ok"))
            }
        }

        let mut tools = ToolRegistry::new();
        tools.add_tools("custom", vec![Tool::new(COMPLETE_TASK_TOOL, "fake", ToolParameters::new(), Arc::new(Noop))]);
        let (u, a) = roles(mock(), mock());
        let err = RolePlaying::new(TaskSpec::new("task"), u, a.with_tools(tools), &SocietyConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_system_messages_carry_language() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = FileWriteToolkit::new(dir.path());
        let (u, a) = roles(mock(), mock());
        let session = RolePlaying::new(
            TaskSpec::new("Say hi").with_output_language("Chinese"),
            u,
            a.with_toolkit(&toolkit as &dyn Toolkit),
            &SocietyConfig::default(),
        )
        .unwrap();

        assert_eq!(session.role_names(), ("user", "assistant"));
        assert_eq!(session.assistant_tool_names(), ["write_to_file".to_string()]);
        assert_eq!(session.models().len(), 2);
        assert!(format!("{:?}", session).contains("write_to_file"));
    }

    #[tokio::test]
    async fn test_step_alternates_and_records_usage() {
        let user = Arc::new(ScriptedModel::new("user-model"));
        user.push_text("Instruction: say the answer");
        user.push_text("Instruction: call complete_task");
        let assistant = Arc::new(ScriptedModel::new("assistant-model"));
        assistant.push_text("Solution: the answer is 4. Next request.");
        assistant.push_tool_call(COMPLETE_TASK_TOOL, json!({"answer": "4"}));

        let (u, a) = roles(user.clone(), assistant.clone());
        let mut session = RolePlaying::new(
            TaskSpec::new("What is 2 + 2?").with_output_language("English"),
            u,
            a,
            &SocietyConfig::default(),
        )
        .unwrap();

        let first = session.step().await.unwrap();
        assert_eq!(first.round, 1);
        assert_eq!(first.instruction, "Instruction: say the answer");
        assert!(!first.completed);

        let second = session.step().await.unwrap();
        assert!(second.completed);
        assert_eq!(second.response, "4");
        assert!(second.cumulative_tokens >= first.cumulative_tokens);

        let user_requests = user.requests();
        assert_eq!(user_requests[0][1].content, KICKOFF_MESSAGE);
        assert!(user_requests[0][0].content.ends_with("you must output text in English."));
        // the initiator sees the responder's reply with the reminder
        let relayed = &user_requests[1][3].content;
        assert!(relayed.starts_with("Solution: the answer is 4."));
        assert!(relayed.contains("<task>What is 2 + 2?</task>"));

        let assistant_first = &assistant.requests()[0];
        assert!(assistant_first[1].content.contains("<auxiliary_information>"));
        assert_eq!(session.usage().roles().len(), 2);
    }

    #[tokio::test]
    async fn test_task_specification_is_charged_separately() {
        let user = Arc::new(ScriptedModel::new("user-model"));
        user.push_text("Count the stars of the CAMEL repository on GitHub");
        user.push_text("Instruction: start");
        let assistant = Arc::new(ScriptedModel::new("assistant-model"));
        assistant.push_text("Solution: started. Next request.");

        let (u, a) = roles(user.clone(), assistant);
        let mut session = RolePlaying::new(
            TaskSpec::new("Count stars").with_task_specify(true).with_word_limit(20),
            u,
            a,
            &SocietyConfig::default(),
        )
        .unwrap();

        session.step().await.unwrap();
        assert_eq!(session.effective_task(), "Count the stars of the CAMEL repository on GitHub");
        assert!(session.usage().get(TASK_SPECIFIER_ROLE).total_tokens > 0);

        let requests = user.requests();
        assert!(requests[0][1].content.contains("20 words or less"));
        assert!(requests[1][0].content.contains("<task>Count the stars of the CAMEL repository on GitHub</task>"));
    }
}
