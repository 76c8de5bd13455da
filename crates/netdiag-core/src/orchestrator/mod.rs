//! Orchestrator - the diagnostic drive loop
//!
//! Ties together the policies, the tool runner, the analyzer and session
//! persistence.
//!
//! # Module Structure
//!
//! - `config`: `OrchestratorConfig`
//! - `types`: run outcomes and internal loop control
//! - `core`: `Orchestrator` struct and builder methods
//! - `process`: open, run, resume, cancel and the drive loop
//! - `tool_execution`: turning one tool invocation into a step
//! - `helpers`: persistence, transcript and report helpers

mod config;
mod core;
mod helpers;
mod process;
mod tool_execution;
mod types;


pub use config::{OrchestratorConfig, DEFAULT_STALE_EXECUTION_SECS};
pub use core::Orchestrator;
pub use types::{RunOutcome, RunResult};
