//! Conversation history and token accounting.

use chrono::{DateTime, Utc};
use parley_abstraction::ModelUsage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One tool call made while the responder produced its reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Tool name as requested by the model
    pub tool: String,
    /// Arguments as sent by the model
    pub arguments: Value,
    /// Observation returned to the model
    pub output: String,
    /// False when the tool failed or was unknown; `output` then holds the
    /// error observation
    pub succeeded: bool,
}

/// One initiator → responder exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// 1-based round number
    pub round: usize,
    /// When the round finished
    pub timestamp: DateTime<Utc>,
    /// Instruction produced by the initiator
    pub instruction: String,
    /// Response produced by the responder
    pub response: String,
    /// Tools the responder called, in call order
    pub tool_invocations: Vec<ToolInvocation>,
    /// Tokens spent by each role during this round
    pub usage: BTreeMap<String, ModelUsage>,
    /// Ledger totals after this round
    pub cumulative_tokens: u64,
    /// Whether the responder signalled completion in this round
    pub completed: bool,
}

impl TurnRecord {
    /// Tokens spent in this round across roles.
    pub fn total_tokens(&self) -> u64 {
        self.usage.values().map(|u| u64::from(u.total_tokens)).sum()
    }

    /// Whether any tool call failed in this round.
    pub fn has_tool_errors(&self) -> bool {
        self.tool_invocations.iter().any(|t| !t.succeeded)
    }
}

/// Token usage per role. Only ever grows during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLedger {
    roles: BTreeMap<String, ModelUsage>,
}

impl UsageLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `usage` to `role`'s running total.
    pub fn record(&mut self, role: &str, usage: ModelUsage) {
        *self.roles.entry(role.to_string()).or_default() += usage;
    }

    /// Running total for `role`.
    pub fn get(&self, role: &str) -> ModelUsage {
        self.roles.get(role).copied().unwrap_or_default()
    }

    /// Totals by role.
    pub fn roles(&self) -> &BTreeMap<String, ModelUsage> {
        &self.roles
    }

    /// Total tokens across roles.
    pub fn total_tokens(&self) -> u64 {
        self.roles.values().map(|u| u64::from(u.total_tokens)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_accumulates_per_role() {
        let mut ledger = UsageLedger::new();
        ledger.record("user", ModelUsage::new(10, 5));
        ledger.record("assistant", ModelUsage::new(20, 7));
        ledger.record("user", ModelUsage::new(1, 1));

        assert_eq!(ledger.get("user"), ModelUsage::new(11, 6));
        assert_eq!(ledger.get("assistant").total_tokens, 27);
        assert_eq!(ledger.get("nobody"), ModelUsage::default());
        assert_eq!(ledger.total_tokens(), 44);
    }

    #[test]
    fn test_turn_record_serializes() {
        let turn = TurnRecord {
            round: 1,
            timestamp: Utc::now(),
            instruction: "Instruction: search".to_string(),
            response: "Done".to_string(),
            tool_invocations: vec![ToolInvocation {
                tool: "search_wiki".to_string(),
                arguments: serde_json::json!({"entity": "CAMEL"}),
                output: "Error: offline".to_string(),
                succeeded: false,
            }],
            usage: BTreeMap::from([("assistant".to_string(), ModelUsage::new(3, 4))]),
            cumulative_tokens: 7,
            completed: false,
        };

        assert!(turn.has_tool_errors());
        assert_eq!(turn.total_tokens(), 7);
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["tool_invocations"][0]["tool"], "search_wiki");
        assert_eq!(value["usage"]["assistant"]["total_tokens"], 7);
    }
}
