//! Terminal rendering of results and sessions

use anyhow::Result;
use netdiag_core::memory::StoredMessage;
use netdiag_core::{ContextEntry, DiagnosticSession, RunOutcome, RunResult};
use std::fmt::Write;

/// Print a run result as JSON or as a human-readable summary
pub fn print_result(result: &RunResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print!("{}", run_summary(result));
    }
    Ok(())
}

pub fn run_summary(result: &RunResult) -> String {
    let mut out = String::new();
    match &result.outcome {
        RunOutcome::Completed(report) => {
            out.push_str(&report.summary());
        }
        RunOutcome::WaitingUser { question } => {
            let _ = writeln!(out, "Session {} is waiting for input:", result.session_id);
            let _ = writeln!(out, "  {question}");
            let _ = writeln!(
                out,
                "Answer with: netdiag resume {} --answer \"...\"",
                result.session_id
            );
        }
    }
    out
}

pub fn session_details(session: &DiagnosticSession) -> String {
    let mut out = String::new();
    let task = &session.task;
    let _ = writeln!(out, "Session {}", session.id);
    let _ = writeln!(out, "Status:  {}", session.status);
    let _ = writeln!(out, "Policy:  {}", session.policy);
    let _ = writeln!(
        out,
        "Task:    {} -> {}{} ({}, {})",
        task.source,
        task.target,
        task.port.map(|p| format!(":{p}")).unwrap_or_default(),
        task.protocol,
        task.fault_type
    );
    let _ = writeln!(out, "Updated: {}", session.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));

    if !session.context.is_empty() {
        let _ = writeln!(out, "History:");
    }
    for entry in &session.context {
        match entry {
            ContextEntry::Step(step) => {
                let _ = writeln!(
                    out,
                    "  [{}] {} ({}) {}",
                    step.step_number,
                    step.step_name,
                    step.action,
                    if step.success { "ok" } else { "failed" }
                );
            }
            ContextEntry::UserAnswer { answer, .. } => {
                let _ = writeln!(out, "  operator: {answer}");
            }
        }
    }

    if let Some(question) = &session.pending_question {
        let _ = writeln!(out, "Pending question: {question}");
    }
    if let Some(report) = &session.report {
        out.push('\n');
        out.push_str(&report.summary());
    }
    out
}

pub fn transcript(messages: &[StoredMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        let _ = writeln!(
            out,
            "{} {:>9}: {}",
            message.timestamp.format("%H:%M:%S"),
            message.role.as_str(),
            message.content
        );
    }
    out
}

pub fn session_table(sessions: &[DiagnosticSession]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<36}  {:<12}  {:<6}  {:<19}  TASK",
        "ID", "STATUS", "POLICY", "UPDATED"
    );
    for session in sessions {
        let _ = writeln!(
            out,
            "{:<36}  {:<12}  {:<6}  {:<19}  {} -> {}",
            session.id,
            session.status.as_str(),
            session.policy.as_str(),
            session.updated_at.format("%Y-%m-%d %H:%M:%S"),
            session.task.source,
            session.task.target
        );
    }
    out
}
