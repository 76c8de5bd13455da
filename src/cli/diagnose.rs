//! `netdiag diagnose`

use super::output;
use super::CollaboratorArgs;
use crate::app::{self, AppConfig};
use anyhow::{Context, Result};
use clap::Args;
use netdiag_core::{DiagnosticTask, FaultType, Orchestrator, PolicyKind, Protocol, RunResult};
use std::future::Future;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Arguments of `netdiag diagnose`
#[derive(Args, Debug)]
pub struct DiagnoseArgs {
    /// Host the connection originates from
    #[arg(long)]
    pub source: String,
    /// Host the connection is meant to reach
    #[arg(long)]
    pub target: String,
    /// Destination port
    #[arg(long)]
    pub port: Option<u16>,
    /// Protocol (tcp, udp, icmp)
    #[arg(long, default_value = "tcp")]
    pub protocol: String,
    /// Fault category (port_unreachable, connectivity, slow, dns)
    #[arg(long, default_value = "port_unreachable")]
    pub fault: String,
    /// Free-text description of the symptom
    #[arg(long)]
    pub description: Option<String>,
    #[command(flatten)]
    pub collaborators: CollaboratorArgs,
    /// Let the LLM agent choose the steps
    #[arg(long)]
    pub dynamic: bool,
    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl DiagnoseArgs {
    /// Task described by the arguments
    pub fn task(&self) -> Result<DiagnosticTask> {
        let fault: FaultType = self.fault.parse()?;
        let protocol: Protocol = self.protocol.parse()?;

        let mut task = DiagnosticTask::new(&self.source, &self.target, fault).with_protocol(protocol);
        if let Some(port) = self.port {
            task = task.with_port(port);
        }
        if let Some(description) = &self.description {
            task = task.with_description(description);
        }
        task.validate()?;
        Ok(task)
    }

    fn policy(&self) -> PolicyKind {
        if self.dynamic {
            PolicyKind::Llm
        } else {
            PolicyKind::Rule
        }
    }
}

pub async fn run(args: DiagnoseArgs, config: &AppConfig) -> Result<()> {
    let task = args.task()?;
    let store = app::open_store(config).await?;
    let orchestrator = Arc::new(
        app::build_orchestrator(config, store, &args.collaborators.clone().into()).await?,
    );

    let session = orchestrator
        .open(task, args.policy())
        .await
        .context("Failed to start diagnosis")?;
    if !args.json {
        println!("Session {}", session.id);
    }

    let id = session.id;
    let driver = orchestrator.clone();
    let result = drive_interruptibly(&orchestrator, id, async move { driver.run(id).await }).await?;
    output::print_result(&result, args.json)
}

/// Await `run`, cancelling the session on Ctrl-C. The cancelled run still
/// yields its partial report.
pub(crate) async fn drive_interruptibly<F>(
    orchestrator: &Arc<Orchestrator>,
    session_id: Uuid,
    run: F,
) -> Result<RunResult>
where
    F: Future<Output = netdiag_core::Result<RunResult>> + Send + 'static,
{
    let mut handle = tokio::spawn(run);

    tokio::select! {
        joined = &mut handle => {
            return Ok(joined.context("Diagnosis task failed")??);
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(session_id = %session_id, "Interrupted, cancelling session");
            match orchestrator.cancel(session_id).await {
                // The run had not claimed the session yet and will only find it settled
                Ok(Some(result)) => {
                    handle.abort();
                    return Ok(result);
                }
                Ok(None) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "Cancellation not applied"),
            }
        }
    }

    Ok(handle.await.context("Diagnosis task failed")??)
}
