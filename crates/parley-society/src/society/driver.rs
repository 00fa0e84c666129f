//! Session driver
//!
//! Runs a [`Society`] round by round until the responder signals completion
//! or the round limit is reached, and returns the final answer with the full
//! history and token usage.

use async_trait::async_trait;
use parley_abstraction::ModelError;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::history::{TurnRecord, UsageLedger};
use crate::error::SessionError;

/// Answer reported when the round limit is exhausted without completion.
pub const NO_ANSWER_SENTINEL: &str = "No answer produced within the round limit.";

/// A role's model failed while producing its part of a round.
#[derive(Debug, thiserror::Error)]
#[error("{role} failed: {error}")]
pub struct StepError {
    /// Role whose model call failed
    pub role: String,
    /// The failure
    #[source]
    pub error: ModelError,
}

impl StepError {
    pub fn new(role: impl Into<String>, error: ModelError) -> Self {
        Self { role: role.into(), error }
    }
}

/// Something the driver can run round by round.
#[async_trait]
pub trait Society: Send {
    /// Maximum number of rounds.
    fn round_limit(&self) -> usize;

    /// Usage recorded so far.
    fn usage(&self) -> &UsageLedger;

    /// Called once before the first round.
    async fn init(&mut self) -> Result<(), StepError> {
        Ok(())
    }

    /// Run one initiator → responder round.
    async fn step(&mut self) -> Result<TurnRecord, StepError>;
}

/// Result of a finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocietyOutcome {
    /// Final answer, or [`NO_ANSWER_SENTINEL`]
    pub answer: String,
    /// Whether the responder signalled completion
    pub completed: bool,
    /// Every round, in order
    pub history: Vec<TurnRecord>,
    /// Tokens per role
    pub usage: UsageLedger,
}

/// Drive `society` to completion.
///
/// A model failure aborts the session; the returned [`SessionError`] carries
/// the rounds completed so far and the usage recorded before the failure.
pub async fn run_society<S: Society>(mut society: S) -> Result<SocietyOutcome, Box<SessionError>> {
    let round_limit = society.round_limit();
    let mut history: Vec<TurnRecord> = Vec::with_capacity(round_limit);

    if let Err(e) = society.init().await {
        return Err(abort(e, history, society.usage()));
    }

    let mut answer = None;
    for _ in 0..round_limit {
        let turn = match society.step().await {
            Ok(turn) => turn,
            Err(e) => return Err(abort(e, history, society.usage())),
        };

        info!(
            round = turn.round,
            tools = turn.tool_invocations.len(),
            tokens = turn.cumulative_tokens,
            completed = turn.completed,
            "Round finished"
        );
        if turn.has_tool_errors() {
            warn!(round = turn.round, "Some tool calls failed this round");
        }

        let completed = turn.completed;
        if completed {
            answer = Some(turn.response.clone());
        }
        history.push(turn);
        if completed {
            break;
        }
    }

    let completed = answer.is_some();
    if !completed {
        warn!(round_limit, "Round limit reached without completion");
    }

    Ok(SocietyOutcome {
        answer: answer.unwrap_or_else(|| NO_ANSWER_SENTINEL.to_string()),
        completed,
        history,
        usage: society.usage().clone(),
    })
}

fn abort(e: StepError, history: Vec<TurnRecord>, usage: &UsageLedger) -> Box<SessionError> {
    error!(role = %e.role, rounds = history.len(), error = %e.error, "Session aborted");
    Box::new(SessionError {
        reason: e.to_string(),
        role: Some(e.role),
        model_error: Some(e.error),
        history,
        usage: usage.clone(),
    })
}
