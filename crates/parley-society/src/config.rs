//! Runtime configuration.
//!
//! Settings come from, in increasing precedence:
//! 1. Defaults
//! 2. Global config file (`~/.parley/config.toml`)
//! 3. Local config file (`./.parleyrc`)
//! 4. CLI flags (applied by the binary)

use parley_models::{Environment, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SocietyError};

/// Resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocietyConfig {
    /// Preset to run when none is given on the command line
    pub preset: Option<String>,
    /// Maximum initiator → responder rounds
    pub round_limit: usize,
    /// Maximum tool-calling iterations within one responder reply
    pub max_tool_iterations: usize,
    /// Directory the file-writing and spreadsheet tools write into
    pub output_dir: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    /// Retry policy for model calls
    pub retry: RetryPolicy,
    /// Timeout for a single code execution
    pub code_execution_timeout_secs: u64,
    /// Page visits allowed per `browse_url` call
    pub web_max_steps: usize,
    /// HTTP timeout for model requests
    pub request_timeout_secs: u64,
}

impl Default for SocietyConfig {
    fn default() -> Self {
        Self {
            preset: None,
            round_limit: 15,
            max_tool_iterations: 10,
            output_dir: PathBuf::from("./"),
            log_level: None,
            retry: RetryPolicy::default(),
            code_execution_timeout_secs: 30,
            web_max_steps: 10,
            request_timeout_secs: 180,
        }
    }
}

/// On-disk form; every field is optional so files can override selectively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocietyConfigFile {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub round_limit: Option<usize>,
    #[serde(default)]
    pub max_tool_iterations: Option<usize>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub code_execution_timeout_secs: Option<u64>,
    #[serde(default)]
    pub web_max_steps: Option<usize>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl SocietyConfigFile {
    /// Load a TOML config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| SocietyError::Configuration(format!("{}: {}", path.display(), e)))
    }
}

impl SocietyConfig {
    /// Global config path, under `HOME` as seen by `environment`.
    pub fn default_global_path(environment: &Environment) -> PathBuf {
        environment
            .get("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".parley")
            .join("config.toml")
    }

    /// Local config path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".parleyrc")
    }

    /// Defaults overlaid with the global then the local config file.
    ///
    /// Missing files are skipped; unreadable or malformed ones are errors.
    pub fn discover(environment: &Environment) -> Result<Self> {
        Self::discover_from(&[Self::default_global_path(environment), Self::default_local_path()])
    }

    /// Defaults overlaid with each existing file in `paths`, in order.
    pub fn discover_from(paths: &[PathBuf]) -> Result<Self> {
        let mut config = Self::default();
        for path in paths {
            if !path.exists() {
                continue;
            }
            debug!(path = %path.display(), "Loading config file");
            config.merge(&SocietyConfigFile::load_from_file(path)?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply every value set in `file`.
    pub fn merge(&mut self, file: &SocietyConfigFile) {
        if let Some(ref preset) = file.preset {
            self.preset = Some(preset.clone());
        }
        if let Some(round_limit) = file.round_limit {
            self.round_limit = round_limit;
        }
        if let Some(max_tool_iterations) = file.max_tool_iterations {
            self.max_tool_iterations = max_tool_iterations;
        }
        if let Some(ref output_dir) = file.output_dir {
            self.output_dir = output_dir.clone();
        }
        if let Some(ref log_level) = file.log_level {
            self.log_level = Some(log_level.clone());
        }
        if let Some(ref retry) = file.retry {
            self.retry = retry.clone();
        }
        if let Some(secs) = file.code_execution_timeout_secs {
            self.code_execution_timeout_secs = secs;
        }
        if let Some(steps) = file.web_max_steps {
            self.web_max_steps = steps;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
    }

    /// Reject values no session can run with.
    pub fn validate(&self) -> Result<()> {
        if self.round_limit == 0 {
            return Err(SocietyError::Configuration("round_limit must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SocietyError::Configuration("retry.max_attempts must be at least 1".to_string()));
        }
        if self.web_max_steps == 0 {
            return Err(SocietyError::Configuration("web_max_steps must be at least 1".to_string()));
        }
        if self.code_execution_timeout_secs == 0 {
            return Err(SocietyError::Configuration(
                "code_execution_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn code_execution_timeout(&self) -> Duration {
        Duration::from_secs(self.code_execution_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
