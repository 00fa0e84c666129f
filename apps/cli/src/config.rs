//! CLI configuration loading and merging.

use parley_models::Environment;
use parley_society::{SocietyConfig, SocietyConfigFile};
use std::path::PathBuf;

/// Load and merge configuration.
///
/// Configuration precedence:
/// 1. CLI arguments
/// 2. Local config file (./.parleyrc)
/// 3. Global config file (~/.parley/config.toml)
/// 4. Defaults
pub fn load_config(environment: &Environment, overrides: &SocietyConfigFile) -> anyhow::Result<SocietyConfig> {
    let mut config = SocietyConfig::discover(environment)?;
    config.merge(overrides);
    config.validate()?;
    Ok(config)
}

/// Flag values as a config overlay.
pub fn overrides(
    preset: Option<String>,
    log_level: Option<String>,
    round_limit: Option<usize>,
    output_dir: Option<PathBuf>,
) -> SocietyConfigFile {
    SocietyConfigFile { preset, log_level, round_limit, output_dir, ..SocietyConfigFile::default() }
}
