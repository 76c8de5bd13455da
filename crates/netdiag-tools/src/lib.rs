//! netdiag Tools - uniform tool-invocation protocol
//!
//! This crate provides the tool layer between a diagnosis policy and the
//! outside world:
//! - Registry: static tool registration with schemas validated at startup
//! - Runner: tool execution with per-invocation timeouts
//! - Probe: the closed set of diagnostic probes and their command text
//! - Executor / Inventory: collaborator seams for running commands and
//!   looking up hosts and topology
//! - Builtins: the diagnostic tools offered to policies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtins;
pub mod command;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod probe;
pub mod registry;
pub mod runner;

pub use builtins::register_diagnostic_tools;
pub use command::{CommandResult, EXIT_NOT_RUN};
pub use error::{Error, Result};
pub use executor::{Executor, LocalExecutor, ReplayExecutor, ReplayRule};
pub use inventory::{HostInfo, Inventory, PathDevice, StaticInventory};
pub use probe::{
    validate_address, Chain, Probe, ProbeKind, MAX_HOPS, MAX_PING_COUNT, MAX_PROBE_TIMEOUT_SECS,
};
pub use registry::{Tool, ToolDefinition, ToolOutcome, ToolRegistry, ToolResult};
pub use runner::{ExecutionOptions, ExecutionResult, RunnerConfig, ToolRunner};
