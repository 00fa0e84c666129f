//! Immutable snapshot of the variables model clients read credentials from.
//!
//! The snapshot is taken once at startup (process environment plus an
//! optional dotenv file) and passed explicitly to the factory, so nothing
//! below the entry point reads globals.

use parley_abstraction::ModelError;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Key/value view of the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// An empty environment. Useful in tests.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Captures the current process environment.
    #[allow(clippy::disallowed_methods)] // the one place env vars are read
    pub fn from_process() -> Self {
        Self { vars: std::env::vars().collect() }
    }

    /// Captures the process environment, then fills gaps from a dotenv file.
    ///
    /// Variables already present in the process win over the file, matching
    /// the usual dotenv precedence. Without `env_file`, `./.env` is read if
    /// present; an explicit `env_file` must exist.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ModelError> {
        let mut environment = Self::from_process();
        let iter = match env_file {
            Some(path) if !path.exists() => {
                return Err(ModelError::Other(format!("Environment file not found: {}", path.display())));
            }
            Some(path) => Some(dotenv::from_path_iter(path)),
            None => Path::new(".env").exists().then(|| dotenv::from_path_iter(".env")),
        };

        if let Some(iter) = iter {
            let iter = iter.map_err(|e| {
                ModelError::Other(format!("Failed to read environment file: {}", e))
            })?;
            let mut loaded = 0usize;
            for item in iter {
                let (key, value) = item.map_err(|e| {
                    ModelError::Other(format!("Invalid line in environment file: {}", e))
                })?;
                if !environment.vars.contains_key(&key) {
                    environment.vars.insert(key, value);
                    loaded += 1;
                }
            }
            debug!(loaded, "Loaded variables from environment file");
        }

        Ok(environment)
    }

    /// Adds or replaces a variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Looks up a variable, treating empty values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    /// Looks up a credential, failing with `MissingCredential` if absent.
    pub fn require(&self, platform: &str, key: &str) -> Result<String, ModelError> {
        self.get(key).map(str::to_string).ok_or_else(|| ModelError::MissingCredential {
            platform: platform.to_string(),
            variable: key.to_string(),
        })
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self { vars: iter.into_iter().collect() }
    }
}
