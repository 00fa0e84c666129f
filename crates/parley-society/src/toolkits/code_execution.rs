//! Code execution toolkit
//!
//! Runs Python or shell snippets in a subprocess with a hard timeout. The
//! "sandbox" is the child process itself: it inherits the working directory
//! and nothing else is isolated.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::text::truncate;
use super::{Tool, ToolArguments, ToolHandler, ToolParameters, ToolResult, Toolkit};
use crate::error::{Result, SocietyError};

const TOOL_NAME: &str = "execute_code";
const MAX_OUTPUT_CHARS: usize = 20_000;

/// Languages `execute_code` accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    Python,
    Shell,
}

impl Language {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => Some(Self::Python),
            "bash" | "sh" | "shell" => Some(Self::Shell),
            _ => None,
        }
    }

    fn command(self) -> (&'static str, &'static str) {
        match self {
            Self::Python => ("python3", "-c"),
            Self::Shell => ("sh", "-c"),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Shell => "bash",
        }
    }
}

/// Toolkit exposing `execute_code`
#[derive(Debug, Clone)]
pub struct CodeExecutionToolkit {
    sandbox: String,
    verbose: bool,
    timeout: Duration,
    working_dir: PathBuf,
}

impl CodeExecutionToolkit {
    /// Subprocess execution in the current directory with a 30 second limit.
    pub fn new() -> Self {
        Self {
            sandbox: "subprocess".to_string(),
            verbose: false,
            timeout: Duration::from_secs(30),
            working_dir: PathBuf::from("."),
        }
    }

    /// Select the sandbox kind. Only `subprocess` is available.
    pub fn with_sandbox(mut self, sandbox: impl Into<String>) -> Result<Self> {
        let sandbox = sandbox.into();
        if sandbox != "subprocess" {
            return Err(SocietyError::Configuration(format!(
                "Unsupported code execution sandbox '{}'; expected 'subprocess'",
                sandbox
            )));
        }
        self.sandbox = sandbox;
        Ok(self)
    }

    /// Log every snippet and its output at info level.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Per-snippet time limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory snippets run in.
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    /// The configured sandbox kind.
    pub fn sandbox(&self) -> &str {
        &self.sandbox
    }
}

impl Default for CodeExecutionToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl Toolkit for CodeExecutionToolkit {
    fn name(&self) -> &'static str {
        "code_execution"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![Tool::new(
            TOOL_NAME,
            "Execute a given code snippet and return its output. Use print statements to \
             surface the values you need; only stdout and stderr are returned.",
            ToolParameters::new()
                .add_property("code", "string", "The input code to execute", true)
                .add_enum_property(
                    "language",
                    &["python", "bash"],
                    "Language of the snippet (defaults to python)",
                    false,
                ),
            Arc::new(ExecuteCodeHandler { config: self.clone() }),
        )]
    }
}

struct ExecuteCodeHandler {
    config: CodeExecutionToolkit,
}

#[async_trait]
impl ToolHandler for ExecuteCodeHandler {
    async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
        let code = args.require_string("code")?;
        let language_arg = args.get_string("language").unwrap_or_else(|| "python".to_string());
        let language = Language::parse(&language_arg).ok_or_else(|| {
            SocietyError::invalid_args(TOOL_NAME, format!("Unsupported language '{}'", language_arg))
        })?;

        if self.config.verbose {
            info!(language = language.label(), "Executing code:\n{}", code);
        } else {
            debug!(language = language.label(), bytes = code.len(), "Executing code");
        }

        let (program, flag) = language.command();
        let mut cmd = Command::new(program);
        cmd.arg(flag).arg(&code).current_dir(&self.config.working_dir).kill_on_drop(true);

        let output = match timeout(self.config.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(program, error = %e, "Failed to spawn interpreter");
                return Ok(ToolResult::error(format!("Failed to run {}: {}", program, e)));
            }
            Err(_) => {
                warn!(timeout_secs = self.config.timeout.as_secs(), "Code execution timed out");
                return Ok(ToolResult::error(format!(
                    "Code execution timed out after {} seconds",
                    self.config.timeout.as_secs()
                ))
                .with_metadata("timed_out", "true"));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();

        let mut results = stdout.into_owned();
        if !stderr.trim().is_empty() {
            if !results.is_empty() && !results.ends_with('\n') {
                results.push('\n');
            }
            results.push_str("(stderr: ");
            results.push_str(stderr.trim_end());
            results.push(')');
        }
        let results = truncate(&results, MAX_OUTPUT_CHARS);

        if self.config.verbose {
            info!(exit_code, "Execution result:\n{}", results);
        }

        let output_text = format!(
            "Executed the code below (exit code: {}):\n```{}\n{}\n```\n> Executed Results:\n{}",
            exit_code,
            language.label(),
            code,
            results
        );

        Ok(ToolResult {
            success,
            output: output_text,
            metadata: std::collections::HashMap::from([
                ("exit_code".to_string(), exit_code.to_string()),
                ("language".to_string(), language.label().to_string()),
            ]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(toolkit: &CodeExecutionToolkit) -> Tool {
        toolkit.tools().remove(0)
    }

    #[test]
    fn test_tool_schema() {
        let tools = CodeExecutionToolkit::new().tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "execute_code");
        assert_eq!(tools[0].parameters.required, vec!["code".to_string()]);
    }

    #[test]
    fn test_only_subprocess_sandbox() {
        assert!(CodeExecutionToolkit::new().with_sandbox("subprocess").is_ok());
        assert!(CodeExecutionToolkit::new().with_sandbox("docker").unwrap_err().is_configuration());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_execution_captures_stdout() {
        let dir = tempfile::TempDir::new().unwrap();
        let toolkit = CodeExecutionToolkit::new().with_working_dir(dir.path());
        let result = tool(&toolkit)
            .execute(&ToolArguments::new(TOOL_NAME, json!({"code": "echo hello", "language": "bash"})))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("> Executed Results:\nhello"));
        assert_eq!(result.metadata.get("exit_code"), Some(&"0".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_script_reports_failure() {
        let toolkit = CodeExecutionToolkit::new();
        let result = tool(&toolkit)
            .execute(&ToolArguments::new(
                TOOL_NAME,
                json!({"code": "echo oops >&2; exit 3", "language": "sh"}),
            ))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.output.contains("(stderr: oops)"));
        assert_eq!(result.metadata.get("exit_code"), Some(&"3".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let toolkit = CodeExecutionToolkit::new().with_timeout(Duration::from_millis(200));
        let result = tool(&toolkit)
            .execute(&ToolArguments::new(TOOL_NAME, json!({"code": "sleep 5", "language": "bash"})))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_unknown_language_is_invalid() {
        let toolkit = CodeExecutionToolkit::new();
        let err = tool(&toolkit)
            .execute(&ToolArguments::new(TOOL_NAME, json!({"code": "1", "language": "cobol"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SocietyError::InvalidToolArguments { .. }));
    }
}
