//! Tool registry for a role
//!
//! Groups tools by the toolkit that produced them and offers lookup by name.

use std::collections::HashSet;

use super::{Tool, Toolkit};
use crate::error::{Result, SocietyError};

/// Tools available to one role, grouped by toolkit
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    /// (group name, tools) in registration order
    groups: Vec<(String, Vec<Tool>)>,
    /// All tools combined (for quick access)
    all_tools: Vec<Tool>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from toolkits, in order
    pub fn from_toolkits(toolkits: &[&dyn Toolkit]) -> Self {
        let mut registry = Self::new();
        for toolkit in toolkits {
            registry.add_toolkit(*toolkit);
        }
        registry
    }

    /// Register every tool of `toolkit` under its name
    pub fn add_toolkit(&mut self, toolkit: &dyn Toolkit) {
        self.add_tools(toolkit.name(), toolkit.tools());
    }

    /// Register tools under `group`
    pub fn add_tools(&mut self, group: impl Into<String>, tools: Vec<Tool>) {
        self.all_tools.extend(tools.iter().cloned());
        self.groups.push((group.into(), tools));
    }

    /// Get all tools
    pub fn get_all_tools(&self) -> &[Tool] {
        &self.all_tools
    }

    /// Find a tool by name
    pub fn find_tool(&self, name: &str) -> Option<&Tool> {
        self.all_tools.iter().find(|t| t.name == name)
    }

    /// Tools registered under `group`
    pub fn group(&self, group: &str) -> &[Tool] {
        self.groups.iter().find(|(name, _)| name == group).map_or(&[], |(_, tools)| tools.as_slice())
    }

    /// Group names in registration order
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Tool names in registration order
    pub fn tool_names(&self) -> Vec<&str> {
        self.all_tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Get total tool count
    pub fn total_count(&self) -> usize {
        self.all_tools.len()
    }

    /// Whether no tools are registered
    pub fn is_empty(&self) -> bool {
        self.all_tools.is_empty()
    }

    /// Check that every tool has a usable, unique name
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for tool in &self.all_tools {
            if tool.name.trim().is_empty() {
                return Err(SocietyError::Configuration("Tool with empty name registered".to_string()));
            }
            if !tool.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                return Err(SocietyError::Configuration(format!(
                    "Tool name '{}' may only contain letters, digits, '_' and '-'",
                    tool.name
                )));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(SocietyError::Configuration(format!(
                    "Tool '{}' is registered more than once",
                    tool.name
                )));
            }
        }
        Ok(())
    }
}
