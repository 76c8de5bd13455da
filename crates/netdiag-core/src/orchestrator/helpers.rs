//! Orchestrator helper methods
//!
//! - Session loading, persistence and locking
//! - Execution claims and cancellation checkpoints
//! - Transcript messages
//! - Reports for interrupted and failed runs

use crate::error::{Error, Result};
use crate::models::DiagnosticReport;
use crate::policy::{Policy, PolicyKind};
use crate::session::DiagnosticSession;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use netdiag_llm::MessageRole;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::core::Orchestrator;

/// A session's slot in `active_executions`, released on drop
pub(crate) struct ExecutionClaim {
    executions: Arc<DashMap<Uuid, CancellationToken>>,
    session_id: Uuid,
    pub(crate) token: CancellationToken,
}

impl Drop for ExecutionClaim {
    fn drop(&mut self) {
        self.executions.remove(&self.session_id);
    }
}

impl Orchestrator {
    /// Load a session from the store or fail with `SessionNotFound`
    pub(crate) async fn load_session(&self, id: Uuid) -> Result<DiagnosticSession> {
        self.sessions
            .reload(id)
            .await?
            .ok_or(Error::SessionNotFound(id))
    }

    /// Write `session` through the manager. A store failure is logged and the
    /// session carries on from the cached copy.
    pub(crate) async fn persist(&self, session: &DiagnosticSession) {
        if let Err(e) = self.sessions.save(session).await {
            warn!(
                session_id = %session.id,
                status = %session.status,
                error = %e,
                "Failed to persist session, restart recovery is not guaranteed"
            );
        }
    }

    /// Append to the transcript, logging failures
    pub(crate) async fn record_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: impl Into<String>,
        metadata: Value,
    ) {
        if let Err(e) = self
            .sessions
            .append_message(session_id, role, content, metadata)
            .await
        {
            warn!(session_id = %session_id, error = %e, "Failed to record message");
        }
    }

    /// Per-session writer lock
    pub(crate) fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the writer lock of `id` once no caller holds or awaits it.
    /// Callers must have dropped their own handle first.
    pub(crate) fn release_lock(&self, id: Uuid) {
        self.session_locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Register `id` as driven by this process. The token is visible to
    /// `cancel` before the session lock is taken.
    pub(crate) fn claim_execution(&self, id: Uuid) -> Result<ExecutionClaim> {
        let token = match self.active_executions.entry(id) {
            Entry::Occupied(_) => {
                return Err(Error::InvalidState(format!("session {id} is already running")));
            }
            Entry::Vacant(slot) => slot.insert(CancellationToken::new()).clone(),
        };
        Ok(ExecutionClaim {
            executions: self.active_executions.clone(),
            session_id: id,
            token,
        })
    }

    /// Cancellation checkpoint. Besides the in-process token, the store is
    /// consulted so a `cancel` issued by another process is honoured. A
    /// request found in the store also fires the token.
    pub(crate) async fn cancellation_requested(
        &self,
        session: &mut DiagnosticSession,
        token: &CancellationToken,
    ) -> bool {
        if token.is_cancelled() {
            return true;
        }
        match self.sessions.cancel_requested(session.id).await {
            Ok(true) => {
                info!(session_id = %session.id, "Cancellation requested by another process");
                session.cancel_requested = true;
                token.cancel();
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Could not read cancellation flag");
                false
            }
        }
    }

    /// Policy bound to `kind`
    pub(crate) fn policy_for(&self, kind: PolicyKind) -> Result<Arc<dyn Policy>> {
        match kind {
            PolicyKind::Rule => Ok(self.rule_policy.clone() as Arc<dyn Policy>),
            PolicyKind::Llm => self
                .llm_policy
                .clone()
                .map(|p| p as Arc<dyn Policy>)
                .ok_or_else(|| {
                    Error::Configuration(
                        "dynamic policy requested but no LLM provider is configured".to_string(),
                    )
                }),
        }
    }

    /// Partial report for a run stopped by cancellation or the step limit
    pub(crate) fn interrupted_report(
        &self,
        session: &DiagnosticSession,
        reason: &str,
    ) -> DiagnosticReport {
        let mut report = self
            .analyzer
            .rule_based(&session.task, &session.step_results());
        report.confidence = report.confidence.min(self.config.interrupted_confidence);
        report.need_human = true;
        report.with_metadata("interrupted", json!(reason))
    }

    /// Rule-based report used when the policy fails without a configuration
    /// problem
    pub(crate) fn fallback_report(&self, session: &DiagnosticSession, error: &Error) -> DiagnosticReport {
        self.analyzer
            .rule_based(&session.task, &session.step_results())
            .with_metadata("policy_error", json!(error.to_string()))
    }
}
