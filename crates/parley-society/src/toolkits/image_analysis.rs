//! Image analysis toolkit
//!
//! Delegates to a vision-capable model. Local images are inlined as base64
//! data URLs; remote images are passed by URL.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use mime_guess::{Mime, mime};
use parley_abstraction::{ChatMessage, Model};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::text::is_url;
use super::{Tool, ToolArguments, ToolHandler, ToolParameters, ToolResult, Toolkit};
use crate::error::{Result, SocietyError};

const DEFAULT_SYSTEM_PROMPT: &str = "You are an image analysis expert. Describe what you see \
    precisely and do not invent details that are not visible.";
const CAPTION_PROMPT: &str = "Please describe the contents of this image in detail.";

/// Mime type of `path` when its extension names an image format.
pub(crate) fn image_mime(path: &Path) -> Option<Mime> {
    mime_guess::from_path(path).first().filter(|guess| guess.type_() == mime::IMAGE)
}

/// URL a model can load: remote URLs unchanged, local files as data URLs.
pub(crate) async fn image_url(location: &str, tool: &str) -> Result<String> {
    if is_url(location) || location.starts_with("data:") {
        return Ok(location.to_string());
    }
    let path = Path::new(location);
    let mime = image_mime(path).ok_or_else(|| {
        SocietyError::invalid_args(tool, format!("'{}' is not a supported image file", location))
    })?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SocietyError::tool(tool, format!("Failed to read image {}: {}", location, e)))?;
    Ok(format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes)))
}

/// Ask `model` about one image.
pub(crate) async fn ask_model_about_image(
    model: &dyn Model,
    image_location: &str,
    question: &str,
    system_prompt: Option<&str>,
    tool: &str,
) -> Result<String> {
    let url = image_url(image_location, tool).await?;
    let messages = vec![
        ChatMessage::system(system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT)),
        ChatMessage::user(question).with_image(url),
    ];
    debug!(model_id = %model.model_id(), image = %image_location, "Asking vision model");
    let response = model.generate_chat_completion(&messages, None).await?;
    Ok(response.content)
}

/// Toolkit exposing `image_to_text` and `ask_question_about_image`
#[derive(Clone)]
pub struct ImageAnalysisToolkit {
    model: Arc<dyn Model>,
}

impl ImageAnalysisToolkit {
    /// Analyse images with `model`.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

impl std::fmt::Debug for ImageAnalysisToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAnalysisToolkit").field("model", &self.model.model_id()).finish()
    }
}

impl Toolkit for ImageAnalysisToolkit {
    fn name(&self) -> &'static str {
        "image_analysis"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new(
                "image_to_text",
                "Generate a detailed textual description of an image.",
                ToolParameters::new()
                    .add_property("image_path", "string", "Local path or URL of the image", true)
                    .add_property("sys_prompt", "string", "Optional system prompt for the analysis", false),
                Arc::new(ImageHandler { model: Arc::clone(&self.model), mode: Mode::Caption }),
            ),
            Tool::new(
                "ask_question_about_image",
                "Answer a question about the content of an image.",
                ToolParameters::new()
                    .add_property("image_path", "string", "Local path or URL of the image", true)
                    .add_property("question", "string", "The question to answer", true)
                    .add_property("sys_prompt", "string", "Optional system prompt for the analysis", false),
                Arc::new(ImageHandler { model: Arc::clone(&self.model), mode: Mode::Question }),
            ),
        ]
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Caption,
    Question,
}

struct ImageHandler {
    model: Arc<dyn Model>,
    mode: Mode,
}

#[async_trait]
impl ToolHandler for ImageHandler {
    async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
        let image_path = args.require_string("image_path")?;
        let sys_prompt = args.get_string("sys_prompt");
        let question = match self.mode {
            Mode::Caption => CAPTION_PROMPT.to_string(),
            Mode::Question => args.require_string("question")?,
        };

        let answer = ask_model_about_image(
            self.model.as_ref(),
            &image_path,
            &question,
            sys_prompt.as_deref(),
            &args.tool,
        )
        .await?;
        Ok(ToolResult::success(answer).with_metadata("image_path", image_path))
    }
}
