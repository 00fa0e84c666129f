//! Two-role agent societies for Parley.
//!
//! A society pairs an initiator ("user") that plans and instructs with a
//! responder ("assistant") that executes using tools. This crate provides:
//!
//! - toolkits the responder can call (code execution, search, spreadsheets,
//!   documents, images, file writing, web browsing)
//! - the role-playing session and the driver that runs it to completion
//! - preset society constructors and runtime configuration
//!
//! ```no_run
//! # async fn run() -> parley_society::Result<()> {
//! use parley_models::{Environment, ModelFactory};
//! use parley_society::{Preset, SocietyConfig, construct_society, run_society};
//!
//! let config = SocietyConfig::default();
//! let factory = ModelFactory::new(Environment::from_process()).with_retry_policy(config.retry.clone());
//! let society = construct_society(Preset::Mock, "Say hello", &factory, &config)?;
//! let outcome = run_society(society).await?;
//! println!("{}", outcome.answer);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod presets;
pub mod society;
pub mod toolkits;

pub use config::{SocietyConfig, SocietyConfigFile};
pub use error::{Result, SessionError, SocietyError};
pub use presets::{Preset, construct_society};
pub use society::{
    COMPLETE_TASK_TOOL, NO_ANSWER_SENTINEL, RoleConfig, RolePlaying, Society, SocietyOutcome, StepError, TaskSpec,
    ToolInvocation, TurnRecord, UsageLedger, run_society,
};
pub use toolkits::{Tool, ToolHandler, ToolRegistry, ToolResult, Toolkit};
