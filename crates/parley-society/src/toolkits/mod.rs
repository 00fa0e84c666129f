//! Toolkits exposed to society roles.
//!
//! Each toolkit bundles related tools behind the [`Toolkit`] trait. Toolkits
//! that need their own reasoning (documents, images, web browsing) hold a
//! model client of their own.

pub mod code_execution;
pub mod document;
pub mod excel;
pub mod file_write;
pub(crate) mod http;
pub mod image_analysis;
pub(crate) mod office;
pub mod registry;
pub mod search;
pub(crate) mod text;
pub mod tool;
pub mod web;

pub use code_execution::CodeExecutionToolkit;
pub use document::DocumentProcessingToolkit;
pub use excel::ExcelToolkit;
pub use file_write::FileWriteToolkit;
pub use image_analysis::ImageAnalysisToolkit;
pub use registry::ToolRegistry;
pub use search::{SearchEngine, SearchToolkit};
pub use tool::{Tool, ToolArguments, ToolHandler, ToolParameters, ToolPropertySchema, ToolResult};
pub use web::WebToolkit;

/// A named group of tools.
pub trait Toolkit: Send + Sync {
    /// Short name used in logs and registry groups.
    fn name(&self) -> &'static str;

    /// The tools this toolkit provides.
    fn tools(&self) -> Vec<Tool>;
}
