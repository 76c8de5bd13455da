//! Orchestrator types
//!
//! - `RunOutcome` / `RunResult`: what a caller gets back from a run
//! - `LoopExit` / `StepControl`: internal drive-loop control flow

use crate::models::DiagnosticReport;
use crate::session::SessionStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The session concluded with a report
    Completed(DiagnosticReport),
    /// The session is paused on a question for the operator
    WaitingUser {
        /// The pending question
        question: String,
    },
}

/// Result of `start`, `run`, `resume` or `cancel`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Session id
    pub session_id: Uuid,
    /// Status after the run
    pub status: SessionStatus,
    /// Outcome
    pub outcome: RunOutcome,
}

impl RunResult {
    /// The report, when completed
    #[must_use]
    pub fn report(&self) -> Option<&DiagnosticReport> {
        match &self.outcome {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::WaitingUser { .. } => None,
        }
    }

    /// The pending question, when paused
    #[must_use]
    pub fn question(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Completed(_) => None,
            RunOutcome::WaitingUser { question } => Some(question),
        }
    }
}

/// Why the drive loop stopped
#[derive(Debug)]
pub(crate) enum LoopExit {
    Paused(String),
    Concluded(DiagnosticReport),
}

/// What to do after one tool invocation
#[derive(Debug)]
pub(crate) enum StepControl {
    Continue,
    Pause(String),
}

/// Metadata value marking a cancelled report
pub(crate) const INTERRUPT_CANCELLED: &str = "cancelled";
/// Metadata value marking a step-limited report
pub(crate) const INTERRUPT_STEP_LIMIT: &str = "step_limit";
