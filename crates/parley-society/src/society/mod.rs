//! Role-playing sessions and the driver that runs them.

pub(crate) mod agent;
pub mod driver;
pub mod history;
pub mod prompts;
pub mod role;
pub mod role_playing;

pub use driver::{NO_ANSWER_SENTINEL, Society, SocietyOutcome, StepError, run_society};
pub use history::{ToolInvocation, TurnRecord, UsageLedger};
pub use prompts::COMPLETE_TASK_TOOL;
pub use role::{DEFAULT_TASK_SPECIFY_WORD_LIMIT, RoleConfig, TaskSpec};
pub use role_playing::{RolePlaying, TASK_SPECIFIER_ROLE};
