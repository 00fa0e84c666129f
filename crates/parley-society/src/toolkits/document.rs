//! Document processing toolkit
//!
//! Turns a document (local file or URL) into text. Images go through the
//! toolkit's model; when a query is given, the model answers it from the
//! extracted text instead of returning the text itself.

use async_trait::async_trait;
use parley_abstraction::{ChatMessage, Model};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::http::{fetch_text, http_client};
use super::image_analysis::{ask_model_about_image, image_mime};
use super::office::{OfficeFormat, extract_text};
use super::text::{html_to_text, is_url, resolve_path, truncate};
use super::{Tool, ToolArguments, ToolHandler, ToolParameters, ToolResult, Toolkit};
use crate::error::{Result, SocietyError};

const TOOL_NAME: &str = "extract_document_content";
const MAX_DOCUMENT_CHARS: usize = 30_000;
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "tsv", "json", "jsonl", "xml", "yaml", "yml", "toml", "py",
    "rs", "js", "ts", "sh", "log", "ini", "cfg", "html", "htm",
];

/// Toolkit exposing `extract_document_content`
#[derive(Clone)]
pub struct DocumentProcessingToolkit {
    model: Arc<dyn Model>,
    client: Client,
    base_dir: PathBuf,
}

impl DocumentProcessingToolkit {
    /// Process documents with `model` as the reader of last resort.
    pub fn new(model: Arc<dyn Model>) -> Result<Self> {
        Ok(Self { model, client: http_client(Duration::from_secs(30))?, base_dir: PathBuf::from(".") })
    }

    /// Directory relative document paths are resolved against.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }
}

impl std::fmt::Debug for DocumentProcessingToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentProcessingToolkit")
            .field("model", &self.model.model_id())
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

impl Toolkit for DocumentProcessingToolkit {
    fn name(&self) -> &'static str {
        "document_processing"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![Tool::new(
            TOOL_NAME,
            "Extract the content of a document (text, markdown, HTML, docx, pptx, xlsx, image, \
             or an http(s) URL). If a query is given, answer it from the document instead.",
            ToolParameters::new()
                .add_property("document_path", "string", "Local path or URL of the document", true)
                .add_property("query", "string", "Optional question to answer from the document", false),
            Arc::new(ExtractDocumentHandler { toolkit: self.clone() }),
        )]
    }
}

struct ExtractDocumentHandler {
    toolkit: DocumentProcessingToolkit,
}

impl ExtractDocumentHandler {
    async fn read_local(&self, path: &Path, query: Option<&str>) -> Result<String> {
        if !path.exists() {
            return Err(SocietyError::tool(TOOL_NAME, format!("File not found: {}", path.display())));
        }

        if image_mime(path).is_some() {
            let question = query.unwrap_or("Please make a detailed caption about the image.");
            let location = path.display().to_string();
            return ask_model_about_image(self.toolkit.model.as_ref(), &location, question, None, TOOL_NAME)
                .await;
        }

        if let Some(format) = OfficeFormat::from_path(path) {
            let owned = path.to_path_buf();
            return tokio::task::spawn_blocking(move || extract_text(&owned, format))
                .await
                .map_err(|e| SocietyError::tool(TOOL_NAME, e.to_string()))?
                .map_err(|e| SocietyError::tool(TOOL_NAME, e));
        }

        let extension =
            path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).unwrap_or_default();
        if extension == "pdf" {
            return Err(SocietyError::tool(
                TOOL_NAME,
                "PDF extraction is not supported; convert the file to text first",
            ));
        }
        if !extension.is_empty() && !TEXT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(SocietyError::tool(
                TOOL_NAME,
                format!("Unsupported document type '.{}'", extension),
            ));
        }

        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(if extension == "html" || extension == "htm" { html_to_text(&text) } else { text.into_owned() })
    }

    async fn answer_query(&self, content: &str, query: &str) -> Result<String> {
        let messages = vec![
            ChatMessage::system(
                "You answer questions strictly from the provided document. If the document does \
                 not contain the answer, say so.",
            ),
            ChatMessage::user(format!(
                "Question: {}\n\nDocument:\n{}",
                query,
                truncate(content, MAX_DOCUMENT_CHARS)
            )),
        ];
        let response = self.toolkit.model.generate_chat_completion(&messages, None).await?;
        Ok(response.content)
    }
}

#[async_trait]
impl ToolHandler for ExtractDocumentHandler {
    async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
        let document_path = args.require_string("document_path")?;
        let query = args.get_string("query").filter(|q| !q.trim().is_empty());
        debug!(document = %document_path, has_query = query.is_some(), "Extracting document");

        let path = resolve_path(&self.toolkit.base_dir, &document_path);
        let is_image = !is_url(&document_path) && image_mime(&path).is_some();

        let content = if is_url(&document_path) {
            fetch_text(&self.toolkit.client, &document_path, TOOL_NAME).await?.0
        } else {
            self.read_local(&path, query.as_deref()).await?
        };

        // Images were already answered against the query by the model.
        let output = match query {
            Some(query) if !is_image => self.answer_query(&content, &query).await?,
            _ => truncate(&content, MAX_DOCUMENT_CHARS),
        };
        Ok(ToolResult::success(output).with_metadata("document_path", document_path))
    }
}
