//! Data model shared by the planner, analyzer and orchestrator

mod report;
mod step;
mod task;

pub use report::{ConfidenceLevel, DiagnosticReport};
pub use step::StepResult;
pub use task::{DiagnosticTask, FaultType, Protocol};
