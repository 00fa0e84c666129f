//! Society constructors for the shipped presets.
//!
//! Each preset builds its models through a [`ModelFactory`], assembles the
//! responder's toolkits and returns a ready [`RolePlaying`] session.
//! Construction never touches the network.

use parley_abstraction::{Model, ModelParameters};
use parley_models::{ModelConfig, ModelFactory, ModelPlatform};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::SocietyConfig;
use crate::error::{Result, SocietyError};
use crate::society::{RoleConfig, RolePlaying, TaskSpec};
use crate::toolkits::{
    CodeExecutionToolkit, DocumentProcessingToolkit, ExcelToolkit, FileWriteToolkit, ImageAnalysisToolkit,
    SearchEngine, SearchToolkit, ToolRegistry, Toolkit, WebToolkit,
};

/// Endpoint of DashScope's OpenAI-compatible API.
pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Default task of the `deepseek` preset.
pub const DEEPSEEK_DEFAULT_TASK: &str = "请分析GitHub上CAMEL-AI项目的最新统计数据。找出该项目的星标数量、\
贡献者数量和最近的活跃度。然后，创建一个简单的Excel表格来展示这些数据，\
并生成一个柱状图来可视化这些指标。最后，总结CAMEL项目的受欢迎程度和发展趋势。";

/// Default task of the `openai-compatible` preset.
pub const OPENAI_COMPATIBLE_DEFAULT_TASK: &str = "Navigate to Amazon.com and identify one product that is \
attractive to coders. Please provide me with the product name and price. No need to verify your answer.";

/// Default task of the `mock` preset.
pub const MOCK_DEFAULT_TASK: &str = "Summarize what a role-playing agent society is.";

const USER_ROLE: &str = "user";
const ASSISTANT_ROLE: &str = "assistant";

/// Shipped society configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Every role on `deepseek-chat`, answers in Chinese
    #[default]
    DeepSeek,
    /// Qwen models behind DashScope's OpenAI-compatible endpoint
    OpenAICompatible,
    /// Offline echo models; needs no credentials
    Mock,
}

impl Preset {
    /// All presets, in display order.
    pub const ALL: [Preset; 3] = [Preset::DeepSeek, Preset::OpenAICompatible, Preset::Mock];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek",
            Self::OpenAICompatible => "openai-compatible",
            Self::Mock => "mock",
        }
    }

    /// Task run when the caller gives none.
    pub fn default_task(self) -> &'static str {
        match self {
            Self::DeepSeek => DEEPSEEK_DEFAULT_TASK,
            Self::OpenAICompatible => OPENAI_COMPATIBLE_DEFAULT_TASK,
            Self::Mock => MOCK_DEFAULT_TASK,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = SocietyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "deepseek" => Ok(Self::DeepSeek),
            "openai-compatible" | "openai_compatible" | "qwen" => Ok(Self::OpenAICompatible),
            "mock" | "offline" => Ok(Self::Mock),
            other => Err(SocietyError::Configuration(format!(
                "Unknown preset '{}'; expected one of: deepseek, openai-compatible, mock",
                other
            ))),
        }
    }
}

/// Build the session for `preset` working on `task`.
///
/// # Errors
/// `Configuration` when the task is blank, a credential is missing, or a
/// model identifier is not recognised.
pub fn construct_society(
    preset: Preset,
    task: &str,
    factory: &ModelFactory,
    config: &SocietyConfig,
) -> Result<RolePlaying> {
    if task.trim().is_empty() {
        return Err(SocietyError::Configuration("Task must not be empty".to_string()));
    }
    config.validate()?;
    info!(preset = %preset, "Constructing society");

    let society = match preset {
        Preset::DeepSeek => deepseek_society(task, factory, config)?,
        Preset::OpenAICompatible => openai_compatible_society(task, factory, config)?,
        Preset::Mock => mock_society(task, factory, config)?,
    };
    debug!(tools = ?society.assistant_tool_names(), "Society ready");
    Ok(society)
}

type ModelTable = Vec<(String, Arc<dyn Model>)>;

fn build_models(factory: &ModelFactory, specs: &[(&str, ModelConfig)]) -> Result<ModelTable> {
    specs
        .iter()
        .map(|(role, model_config)| {
            factory
                .create(model_config.clone())
                .map(|model| (role.to_string(), model))
                .map_err(SocietyError::from_construction)
        })
        .collect()
}

fn model(table: &ModelTable, role: &str) -> Result<Arc<dyn Model>> {
    table
        .iter()
        .find(|(name, _)| name == role)
        .map(|(_, model)| model.clone())
        .ok_or_else(|| SocietyError::Configuration(format!("No model configured for role '{}'", role)))
}

fn code_execution(config: &SocietyConfig) -> Result<CodeExecutionToolkit> {
    Ok(CodeExecutionToolkit::new()
        .with_sandbox("subprocess")?
        .with_verbose(true)
        .with_timeout(config.code_execution_timeout())
        .with_working_dir(&config.output_dir))
}

fn assemble(
    task: TaskSpec,
    table: ModelTable,
    toolkits: &[&dyn Toolkit],
    config: &SocietyConfig,
) -> Result<RolePlaying> {
    let user = RoleConfig::new(USER_ROLE, model(&table, USER_ROLE)?);
    let assistant = RoleConfig::new(ASSISTANT_ROLE, model(&table, ASSISTANT_ROLE)?)
        .with_tools(ToolRegistry::from_toolkits(toolkits));
    Ok(RolePlaying::new(task, user, assistant, config)?.with_models(table))
}

fn deepseek_society(task: &str, factory: &ModelFactory, config: &SocietyConfig) -> Result<RolePlaying> {
    let deepseek = || {
        ModelConfig::new(ModelPlatform::DeepSeek, "deepseek-chat")
            .with_parameters(ModelParameters::with_temperature(0.0))
    };
    let table = build_models(
        factory,
        &[
            ("user", deepseek()),
            ("assistant", deepseek()),
            ("web", deepseek()),
            ("planning", deepseek()),
            ("video", deepseek()),
            ("image", deepseek()),
            ("document", deepseek()),
        ],
    )?;

    let code = code_execution(config)?;
    let search = SearchToolkit::new(factory.environment())?
        .with_engines(&[SearchEngine::DuckDuckGo, SearchEngine::Wikipedia]);
    let excel = ExcelToolkit::new(&config.output_dir);
    let documents = DocumentProcessingToolkit::new(model(&table, "document")?)?.with_base_dir(&config.output_dir);
    let files = FileWriteToolkit::new(&config.output_dir);

    assemble(
        TaskSpec::new(task).with_output_language("Chinese"),
        table,
        &[&code, &search, &excel, &documents, &files],
        config,
    )
}

fn openai_compatible_society(task: &str, factory: &ModelFactory, config: &SocietyConfig) -> Result<RolePlaying> {
    let qwen = |model_id: &str| {
        ModelConfig::new(ModelPlatform::OpenAICompatible, model_id)
            .with_base_url(DASHSCOPE_BASE_URL)
            .with_api_key_env("QWEN_API_KEY")
            .with_parameters(ModelParameters::with_temperature(0.4).max_tokens(4096))
    };
    let table = build_models(
        factory,
        &[
            ("user", qwen("qwen-max")),
            ("assistant", qwen("qwen-max")),
            ("web", qwen("qwen-vl-max")),
            ("planning", qwen("qwen-max")),
            ("image", qwen("qwen-vl-max")),
        ],
    )?;

    let web = WebToolkit::new(model(&table, "web")?, model(&table, "planning")?, config.web_max_steps)?;
    let code = code_execution(config)?;
    let images = ImageAnalysisToolkit::new(model(&table, "image")?);
    let search = SearchToolkit::new(factory.environment())?.with_engines(&[
        SearchEngine::DuckDuckGo,
        SearchEngine::Google,
        SearchEngine::Wikipedia,
    ]);
    let excel = ExcelToolkit::new(&config.output_dir);
    let files = FileWriteToolkit::new(&config.output_dir);

    assemble(TaskSpec::new(task), table, &[&web, &code, &images, &search, &excel, &files], config)
}

fn mock_society(task: &str, factory: &ModelFactory, config: &SocietyConfig) -> Result<RolePlaying> {
    let table = build_models(
        factory,
        &[
            ("user", ModelConfig::new(ModelPlatform::Mock, "mock-user")),
            ("assistant", ModelConfig::new(ModelPlatform::Mock, "mock-assistant")),
        ],
    )?;

    let excel = ExcelToolkit::new(&config.output_dir);
    let files = FileWriteToolkit::new(&config.output_dir);
    assemble(TaskSpec::new(task), table, &[&excel, &files], config)
}
