// Single-role chat agent with a tool-calling loop
//
// input -> model decision -> tool execution -> observation -> repeat,
// until the model replies without tool calls, calls `complete_task`, or
// the iteration limit is hit.

use parley_abstraction::{ChatMessage, Model, ModelError, ModelParameters, ModelUsage, ToolCallRequest, ToolSpec};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::history::ToolInvocation;
use super::prompts::{COMPLETE_TASK_TOOL, complete_task_spec};
use crate::toolkits::{Tool, ToolArguments, ToolRegistry};

/// What one agent step produced.
#[derive(Debug, Clone, Default)]
pub(crate) struct AgentReply {
    /// Final message content
    pub content: String,
    /// Tools called during the step, in call order
    pub tool_invocations: Vec<ToolInvocation>,
    /// Tokens spent across every model call of the step
    pub usage: ModelUsage,
    /// Answer submitted through `complete_task`
    pub completion: Option<String>,
}

pub(crate) struct ChatAgent {
    role: String,
    model: Arc<dyn Model>,
    system_message: Option<ChatMessage>,
    memory: Vec<ChatMessage>,
    tools: ToolRegistry,
    parameters: Option<ModelParameters>,
    max_tool_iterations: usize,
    completion_enabled: bool,
}

impl ChatAgent {
    pub fn new(
        role: impl Into<String>,
        model: Arc<dyn Model>,
        tools: ToolRegistry,
        parameters: Option<ModelParameters>,
        max_tool_iterations: usize,
    ) -> Self {
        Self {
            role: role.into(),
            model,
            system_message: None,
            memory: Vec::new(),
            tools,
            parameters,
            max_tool_iterations,
            completion_enabled: false,
        }
    }

    /// Advertise the reserved completion tool to this agent.
    pub fn with_completion_tool(mut self) -> Self {
        self.completion_enabled = true;
        self
    }

    pub fn set_system_message(&mut self, content: impl Into<String>) {
        self.system_message = Some(ChatMessage::system(content));
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    #[cfg(test)]
    pub fn memory(&self) -> &[ChatMessage] {
        &self.memory
    }

    fn tool_specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.get_all_tools().iter().map(Tool::spec).collect();
        if self.completion_enabled {
            specs.push(complete_task_spec());
        }
        specs
    }

    fn context(&self) -> Vec<ChatMessage> {
        self.system_message.iter().chain(self.memory.iter()).cloned().collect()
    }

    /// Feed `input` to the agent and run until it produces a final reply.
    ///
    /// Tool failures become error observations the model can react to; only
    /// model failures are returned as errors.
    pub async fn step(&mut self, input: ChatMessage) -> Result<AgentReply, ModelError> {
        self.memory.push(input);
        let specs = self.tool_specs();
        let use_tools = !specs.is_empty() && self.model.supports_tools();
        let mut reply = AgentReply::default();
        let mut iterations = 0;

        loop {
            let messages = self.context();
            let response = if use_tools {
                self.model.generate_with_tools(&messages, &specs, self.parameters.clone()).await?
            } else {
                self.model.generate_chat_completion(&messages, self.parameters.clone()).await?
            };
            if let Some(usage) = response.usage {
                reply.usage += usage;
            }

            if !response.has_tool_calls() {
                self.memory.push(ChatMessage::assistant(response.content.clone()));
                reply.content = response.content;
                return Ok(reply);
            }

            if iterations >= self.max_tool_iterations {
                warn!(role = %self.role, iterations, "Tool iteration limit reached");
                let content = if response.content.trim().is_empty() {
                    format!(
                        "Stopped after {} tool iterations without a final reply.",
                        self.max_tool_iterations
                    )
                } else {
                    response.content
                };
                self.memory.push(ChatMessage::assistant(content.clone()));
                reply.content = content;
                return Ok(reply);
            }
            iterations += 1;

            self.memory
                .push(ChatMessage::assistant(response.content.clone()).with_tool_calls(response.tool_calls.clone()));

            // Sequential: later calls may depend on files written by earlier ones.
            for call in &response.tool_calls {
                let (invocation, completion) = self.run_tool(call).await;
                self.memory.push(ChatMessage::tool(call.id.clone(), invocation.output.clone()));
                reply.tool_invocations.push(invocation);
                if completion.is_some() && reply.completion.is_none() {
                    reply.completion = completion;
                }
            }

            if let Some(answer) = &reply.completion {
                reply.content = answer.clone();
                return Ok(reply);
            }
        }
    }

    async fn run_tool(&self, call: &ToolCallRequest) -> (ToolInvocation, Option<String>) {
        debug!(role = %self.role, tool = %call.name, "Executing tool");
        let mut invocation = ToolInvocation {
            tool: call.name.clone(),
            arguments: call.arguments.clone(),
            output: String::new(),
            succeeded: false,
        };

        if self.completion_enabled && call.name == COMPLETE_TASK_TOOL {
            return match completion_answer(&call.arguments) {
                Some(answer) => {
                    invocation.output = "Task marked as complete.".to_string();
                    invocation.succeeded = true;
                    (invocation, Some(answer))
                }
                None => {
                    invocation.output =
                        format!("Error: {} requires a non-empty 'answer' string", COMPLETE_TASK_TOOL);
                    (invocation, None)
                }
            };
        }

        let Some(tool) = self.tools.find_tool(&call.name) else {
            warn!(role = %self.role, tool = %call.name, "Model requested an unknown tool");
            invocation.output = format!(
                "Error: Tool '{}' not found. Available tools: {}",
                call.name,
                self.tools.tool_names().join(", ")
            );
            return (invocation, None);
        };

        match tool.execute(&ToolArguments::new(call.name.clone(), call.arguments.clone())).await {
            Ok(result) if result.success => {
                invocation.output = result.output;
                invocation.succeeded = true;
            }
            Ok(result) => {
                warn!(role = %self.role, tool = %call.name, "Tool reported a failure");
                invocation.output = format!("Error: {}", result.output);
            }
            Err(e) => {
                warn!(role = %self.role, tool = %call.name, error = %e, "Tool execution failed");
                invocation.output = format!("Error: {}", e);
            }
        }
        (invocation, None)
    }
}

fn completion_answer(arguments: &Value) -> Option<String> {
    arguments
        .get("answer")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}
