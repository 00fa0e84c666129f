//! File writing toolkit
//!
//! Writes text files under a fixed output directory.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use super::{Tool, ToolArguments, ToolHandler, ToolParameters, ToolResult, Toolkit};
use crate::error::{Result, SocietyError};

const TOOL_NAME: &str = "write_to_file";

/// Toolkit exposing `write_to_file`
#[derive(Debug, Clone)]
pub struct FileWriteToolkit {
    output_dir: PathBuf,
}

impl FileWriteToolkit {
    /// Write into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    /// Directory all files land in.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Toolkit for FileWriteToolkit {
    fn name(&self) -> &'static str {
        "file_write"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![Tool::new(
            TOOL_NAME,
            "Write text content to a file in the output directory, creating parent \
             directories as needed and replacing any existing file.",
            ToolParameters::new()
                .add_property("content", "string", "The content to write", true)
                .add_property(
                    "filename",
                    "string",
                    "File name relative to the output directory, e.g. 'report.md'",
                    true,
                )
                .add_property("encoding", "string", "Text encoding; only utf-8 is supported", false),
            Arc::new(WriteFileHandler { output_dir: self.output_dir.clone() }),
        )]
    }
}

struct WriteFileHandler {
    output_dir: PathBuf,
}

/// Resolve `filename` inside `output_dir`, refusing anything that escapes it.
pub(crate) fn resolve_in_output_dir(output_dir: &Path, filename: &str, tool: &str) -> Result<PathBuf> {
    let relative = Path::new(filename);
    let relative = if relative.is_absolute() {
        relative.strip_prefix(output_dir).map_err(|_| {
            SocietyError::invalid_args(
                tool,
                format!("'{}' is outside the output directory {}", filename, output_dir.display()),
            )
        })?
    } else {
        relative
    };

    if relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
        return Err(SocietyError::invalid_args(
            tool,
            format!("'{}' must stay inside the output directory", filename),
        ));
    }
    Ok(output_dir.join(relative))
}

#[async_trait]
impl ToolHandler for WriteFileHandler {
    async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
        let filename = args.require_string("filename")?;
        let content = args.get_string("content").ok_or_else(|| {
            SocietyError::invalid_args(TOOL_NAME, "Missing required 'content' argument")
        })?;
        if let Some(encoding) = args.get_string("encoding") {
            let normalized = encoding.to_lowercase().replace('_', "-");
            if normalized != "utf-8" && normalized != "utf8" {
                return Err(SocietyError::invalid_args(
                    TOOL_NAME,
                    format!("Unsupported encoding '{}'; only utf-8 is supported", encoding),
                ));
            }
        }

        let resolved_path = resolve_in_output_dir(&self.output_dir, &filename, TOOL_NAME)?;

        if let Some(parent) = resolved_path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return Ok(ToolResult::error(format!(
                    "Failed to create parent directory for {}: {}",
                    resolved_path.display(),
                    e
                )));
            }
        }

        debug!(path = %resolved_path.display(), bytes = content.len(), "Writing file");
        match fs::write(&resolved_path, content.as_bytes()).await {
            Ok(()) => Ok(ToolResult::success(format!(
                "Content successfully written to file: {} ({} bytes)",
                resolved_path.display(),
                content.len()
            ))
            .with_metadata("file_path", resolved_path.display().to_string())),
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to write file {}: {}",
                resolved_path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_tool(dir: &Path) -> Tool {
        FileWriteToolkit::new(dir).tools().remove(0)
    }

    #[tokio::test]
    async fn test_write_creates_nested_file() {
        let temp_dir = TempDir::new().unwrap();
        let tool = write_tool(temp_dir.path());
        let args = ToolArguments::new(
            TOOL_NAME,
            json!({"content": "# Report\n", "filename": "notes/report.md"}),
        );

        let result = tool.execute(&args).await.unwrap();
        assert!(result.success);

        let content = tokio::fs::read_to_string(temp_dir.path().join("notes/report.md")).await.unwrap();
        assert_eq!(content, "# Report\n");
    }

    #[tokio::test]
    async fn test_write_rejects_escape() {
        let temp_dir = TempDir::new().unwrap();
        let tool = write_tool(temp_dir.path());

        for filename in ["../evil.txt", "/etc/passwd"] {
            let args = ToolArguments::new(TOOL_NAME, json!({"content": "x", "filename": filename}));
            let err = tool.execute(&args).await.unwrap_err();
            assert!(matches!(err, SocietyError::InvalidToolArguments { .. }), "{}", filename);
        }
    }

    #[tokio::test]
    async fn test_absolute_path_inside_output_dir_is_allowed() {
        let temp_dir = TempDir::new().unwrap();
        let tool = write_tool(temp_dir.path());
        let target = temp_dir.path().join("inside.txt");
        let args = ToolArguments::new(
            TOOL_NAME,
            json!({"content": "ok", "filename": target.display().to_string()}),
        );

        assert!(tool.execute(&args).await.unwrap().success);
        assert!(target.exists());
    }

    #[tokio::test]
    async fn test_unsupported_encoding() {
        let temp_dir = TempDir::new().unwrap();
        let tool = write_tool(temp_dir.path());
        let args = ToolArguments::new(
            TOOL_NAME,
            json!({"content": "x", "filename": "a.txt", "encoding": "latin-1"}),
        );
        assert!(tool.execute(&args).await.is_err());
    }
}
