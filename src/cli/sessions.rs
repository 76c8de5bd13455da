//! Session commands: `resume`, `cancel`, `show`, `list`, `cleanup`

use super::diagnose::drive_interruptibly;
use super::output;
use crate::app::{self, AppConfig, Collaborators};
use anyhow::{bail, Context, Result};
use netdiag_core::SessionStatus;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub async fn resume(
    config: &AppConfig,
    session_id: Uuid,
    answer: String,
    collaborators: Collaborators,
    json: bool,
) -> Result<()> {
    let store = app::open_store(config).await?;
    let orchestrator = Arc::new(app::build_orchestrator(config, store, &collaborators).await?);

    let driver = orchestrator.clone();
    let result = drive_interruptibly(&orchestrator, session_id, async move {
        driver.resume(session_id, answer).await
    })
    .await
    .with_context(|| format!("Failed to resume session {session_id}"))?;
    output::print_result(&result, json)
}

pub async fn cancel(config: &AppConfig, session_id: Uuid, json: bool) -> Result<()> {
    let store = app::open_store(config).await?;
    let orchestrator = app::build_orchestrator(config, store, &Collaborators::default()).await?;

    match orchestrator
        .cancel(session_id)
        .await
        .with_context(|| format!("Failed to cancel session {session_id}"))?
    {
        Some(result) => output::print_result(&result, json),
        None => {
            println!("Cancellation requested for session {session_id}");
            Ok(())
        }
    }
}

pub async fn show(config: &AppConfig, session_id: Uuid, messages: bool, json: bool) -> Result<()> {
    let store = app::open_store(config).await?;
    let sessions = app::session_manager(config, store);

    let Some(session) = sessions.get(session_id).await? else {
        bail!("Session {session_id} not found");
    };
    let transcript = if messages {
        sessions.messages(session_id).await?
    } else {
        Vec::new()
    };

    if json {
        let mut value = serde_json::to_value(&session)?;
        if messages {
            value["messages"] = serde_json::to_value(&transcript)?;
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print!("{}", output::session_details(&session));
    if messages {
        println!();
        print!("{}", output::transcript(&transcript));
    }
    Ok(())
}

pub async fn list(config: &AppConfig, status: Option<&str>, json: bool) -> Result<()> {
    let status = status.map(str::parse::<SessionStatus>).transpose()?;
    let store = app::open_store(config).await?;
    let sessions = app::session_manager(config, store).list(status).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    print!("{}", output::session_table(&sessions));
    Ok(())
}

pub async fn cleanup(config: &AppConfig) -> Result<()> {
    let store = app::open_store(config).await?;
    let removed = app::session_manager(config, store).cleanup_expired().await?;

    info!(removed = removed.len(), ttl_days = config.database.session_ttl_days, "Expired sessions removed");
    println!(
        "Removed {} session(s) older than {} days",
        removed.len(),
        config.database.session_ttl_days
    );
    Ok(())
}
