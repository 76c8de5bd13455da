//! Policies - whatever decides the next diagnostic action
//!
//! The orchestrator asks a [`Policy`] for a [`Decision`] on every loop
//! iteration. [`RulePolicy`] walks the deterministic plan; [`LlmPolicy`]
//! lets a model pick tools through function calling.

mod llm;
mod rule;

pub use llm::{LlmPolicy, LlmPolicyConfig};
pub use rule::RulePolicy;

use crate::error::{Error, Result};
use crate::models::DiagnosticReport;
use crate::session::DiagnosticSession;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which policy drives a session; stored with the session so a restored
/// session is rebound to the same kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Deterministic plan
    #[default]
    Rule,
    /// LLM agent
    Llm,
}

impl PolicyKind {
    /// Lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Llm => "llm",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rule" => Ok(Self::Rule),
            "llm" => Ok(Self::Llm),
            other => Err(Error::Serialization(format!("unknown policy: {other}"))),
        }
    }
}

/// A request to run one tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Identifier echoed in the transcript
    pub call_id: String,
    /// Display name of the resulting step
    pub step_name: String,
    /// Registered tool name
    pub tool: String,
    /// Tool arguments
    pub arguments: Value,
    /// Step number the plan assigns, if any
    pub planned_step: Option<u32>,
    /// Invocation timeout
    pub timeout: Duration,
}

/// What a policy wants next
#[derive(Debug, Clone)]
pub enum Decision {
    /// Run these tools, in order
    Invoke(Vec<ToolInvocation>),
    /// Stop with this report
    Conclude(DiagnosticReport),
}

/// Decides the next action for a session
#[async_trait::async_trait]
pub trait Policy: Send + Sync {
    /// Kind, for persistence
    fn kind(&self) -> PolicyKind;

    /// Next action given the session so far. Long waits inside should end
    /// early when `cancel` fires.
    async fn decide(
        &self,
        session: &DiagnosticSession,
        cancel: &CancellationToken,
    ) -> Result<Decision>;
}
