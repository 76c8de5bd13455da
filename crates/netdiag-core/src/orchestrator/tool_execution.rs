//! Orchestrator tool execution
//!
//! Runs one [`ToolInvocation`], interprets its output into signals and
//! appends the resulting step to the session.

use crate::error::Result;
use crate::models::{DiagnosticTask, StepResult};
use crate::parsers::{identify_failed_hop, parse_command, parse_host_check, parse_probe, Signal};
use crate::policy::ToolInvocation;
use crate::session::DiagnosticSession;
use netdiag_llm::MessageRole;
use netdiag_tools::{CommandResult, ExecutionOptions, Probe, ProbeKind, ToolOutcome, ToolResult};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::core::Orchestrator;
use super::types::StepControl;

fn argument<'a>(arguments: &'a Value, key: &str) -> &'a str {
    arguments.get(key).and_then(Value::as_str).unwrap_or_default()
}

impl Orchestrator {
    /// Execute one invocation and record its step
    pub(crate) async fn execute_invocation(
        &self,
        session: &mut DiagnosticSession,
        call: &ToolInvocation,
    ) -> Result<StepControl> {
        let last = session.last_step_number();
        let number = call.planned_step.filter(|n| *n > last).unwrap_or(last + 1);

        info!(
            session_id = %session.id,
            step = number,
            tool = %call.tool,
            "Executing tool"
        );

        let execution = self
            .runner
            .execute_with_options(
                &call.tool,
                call.arguments.clone(),
                ExecutionOptions::with_timeout(call.timeout),
            )
            .await;

        let (step, result_value) = match execution {
            Ok(execution) => match execution.outcome {
                ToolOutcome::NeedsInput { question } => {
                    self.record_message(
                        session.id,
                        MessageRole::Assistant,
                        format!("{} ({})", call.step_name, call.tool),
                        json!({ "tool": call.tool, "arguments": call.arguments, "result": { "question": question } }),
                    )
                    .await;
                    return Ok(StepControl::Pause(question));
                }
                ToolOutcome::Completed(result) => {
                    let step = self
                        .completed_step(&session.task, number, call, &result)
                        .await
                        .with_metadata("elapsed_ms", json!(execution.elapsed.as_millis() as u64));
                    let value = if result.output.is_null() {
                        json!({ "success": result.success, "error": result.error })
                    } else {
                        result.output
                    };
                    (step, value)
                }
            },
            Err(netdiag_tools::Error::Timeout(ms)) => {
                warn!(session_id = %session.id, step = number, tool = %call.tool, timeout_ms = ms, "Tool timed out");
                let step = self.timed_out_step(number, call, ms);
                (step, json!({ "success": false, "error": format!("timed out after {ms}ms") }))
            }
            Err(e) => {
                warn!(session_id = %session.id, step = number, tool = %call.tool, error = %e, "Tool could not run");
                let step = StepResult::new(number, call.step_name.clone(), call.tool.clone(), false)
                    .with_metadata("error", json!(e.to_string()));
                (step, json!({ "success": false, "error": e.to_string() }))
            }
        };

        let step = step
            .with_metadata("arguments", call.arguments.clone())
            .with_metadata("call_id", json!(call.call_id));
        let next = self.planner.next_step_number(&session.task, &step);
        let step = step.with_next_step(next);

        debug!(
            session_id = %session.id,
            step = number,
            success = step.success,
            signals = ?step.signals.iter().map(Signal::kind).collect::<Vec<_>>(),
            "Step recorded"
        );

        session.push_step(step)?;
        self.persist(session).await;
        self.record_message(
            session.id,
            MessageRole::Assistant,
            format!("{} ({})", call.step_name, call.tool),
            json!({ "tool": call.tool, "arguments": call.arguments, "result": result_value }),
        )
        .await;

        Ok(StepControl::Continue)
    }

    /// Step for a tool that ran to completion
    async fn completed_step(
        &self,
        task: &DiagnosticTask,
        number: u32,
        call: &ToolInvocation,
        result: &ToolResult,
    ) -> StepResult {
        let mut step =
            StepResult::new(number, call.step_name.clone(), call.tool.clone(), result.success);
        if let Some(error) = &result.error {
            step = step.with_metadata("error", json!(error));
        }

        if let Some(kind) = ProbeKind::from_tool_name(&call.tool) {
            let command = self.command_result(call, result);
            match Probe::from_arguments(kind, &call.arguments) {
                Ok(probe) => {
                    let signal = parse_probe(&probe, &command);
                    let failed_hop = match &signal {
                        Signal::Traceroute(trace) => self.failed_hop(task, trace).await,
                        _ => None,
                    };
                    step = step.with_signal(signal);
                    if let Some(hop) = failed_hop {
                        step = step.with_signal(hop);
                    }
                }
                Err(e) => {
                    warn!(tool = %call.tool, error = %e, "Probe arguments not interpretable");
                }
            }
            return step.with_command(command);
        }

        match call.tool.as_str() {
            "query_cmdb" => step.with_signal(Signal::HostCheck(parse_host_check(&result.output))),
            "execute_command" => {
                let command = self.command_result(call, result);
                let signal = parse_command(&command.command, &command, task.port);
                let step = match signal {
                    Some(signal) => step.with_signal(signal),
                    None => step,
                };
                step.with_command(command)
            }
            _ => step.with_metadata("output", result.output.clone()),
        }
    }

    /// The `CommandResult` a command-running tool returned, or a not-run
    /// stand-in when its output is missing
    fn command_result(&self, call: &ToolInvocation, result: &ToolResult) -> CommandResult {
        serde_json::from_value(result.output.clone()).unwrap_or_else(|_| {
            CommandResult::not_run(
                argument(&call.arguments, "host"),
                argument(&call.arguments, "command"),
                result.error.clone().unwrap_or_else(|| "no output".to_string()),
            )
        })
    }

    /// Failed step for an invocation that overran its timeout. Probe
    /// timeouts are still parsed so the signal graph sees them.
    fn timed_out_step(&self, number: u32, call: &ToolInvocation, timeout_ms: u64) -> StepResult {
        let message = format!("timed out after {timeout_ms}ms");
        let step = StepResult::new(number, call.step_name.clone(), call.tool.clone(), false)
            .with_metadata("error", json!(message));

        let probe = ProbeKind::from_tool_name(&call.tool)
            .and_then(|kind| Probe::from_arguments(kind, &call.arguments).ok());
        match probe {
            Some(probe) => {
                let command = CommandResult::not_run(
                    argument(&call.arguments, "host"),
                    probe.command(),
                    format!("probe {message}"),
                );
                step.with_signal(parse_probe(&probe, &command))
                    .with_command(command)
            }
            None => step,
        }
    }

    /// Failing device on the path, when an inventory knows the topology
    async fn failed_hop(
        &self,
        task: &DiagnosticTask,
        trace: &crate::parsers::TraceRoute,
    ) -> Option<Signal> {
        let inventory = self.inventory.as_ref()?;
        match inventory.topology_path(&task.source, &task.target).await {
            Ok(Some(path)) => Some(Signal::FailedHop(identify_failed_hop(trace, &path))),
            Ok(None) => {
                debug!(source = %task.source, target = %task.target, "No topology path known");
                None
            }
            Err(e) => {
                warn!(error = %e, "Topology lookup failed");
                None
            }
        }
    }
}
