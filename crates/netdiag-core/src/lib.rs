//! netdiag Core - Diagnostic orchestration engine
//!
//! This crate turns raw probe output into a root-cause report:
//! - Parsers: raw command output to structured signals
//! - Planner: the deterministic fault-isolation step graph
//! - Analyzer: fault-signature matching with an optional dynamic hook
//! - Policy: deterministic and LLM-driven decision makers
//! - Orchestrator: the resumable, cancellable drive loop
//! - Memory: session persistence (SQLite, in-memory)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analyzer;
pub mod error;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod parsers;
pub mod planner;
pub mod policy;
pub mod session;
pub mod session_manager;
pub mod utils;

pub use analyzer::{AnalysisHook, Analyzer, AnalyzerConfig, LlmAnalyst};
pub use error::{Error, Result};
pub use memory::{MemoryStore, SessionStore, SqliteStore, StoredMessage};
pub use models::{
    ConfidenceLevel, DiagnosticReport, DiagnosticTask, FaultType, Protocol, StepResult,
};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, RunOutcome, RunResult, DEFAULT_STALE_EXECUTION_SECS,
};
pub use parsers::Signal;
pub use planner::{PlanStep, Planner, StepKind};
pub use policy::{Decision, LlmPolicy, LlmPolicyConfig, Policy, PolicyKind, RulePolicy, ToolInvocation};
pub use session::{ContextEntry, DiagnosticSession, SessionStatus};
pub use session_manager::SessionManager;
pub use utils::{retry_with_backoff, retry_with_scaled_backoff, RetryConfig, RetryError};
