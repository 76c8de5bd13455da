//! Orchestrator main execution loop
//!
//! `open` / `start` create sessions, `run` and `resume` drive them, and
//! `cancel` stops them. The drive loop asks the session's policy for the
//! next action, runs the requested tools, and stops on a conclusion, a
//! pause for operator input, cancellation or the step limit.

use crate::error::{Error, Result};
use crate::models::DiagnosticTask;
use crate::policy::{Decision, PolicyKind};
use crate::session::{DiagnosticSession, SessionStatus};
use netdiag_llm::MessageRole;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::core::Orchestrator;
use super::types::{
    LoopExit, RunOutcome, RunResult, StepControl, INTERRUPT_CANCELLED, INTERRUPT_STEP_LIMIT,
};

impl Orchestrator {
    /// Create and persist an `active` session without driving it.
    ///
    /// Requesting the dynamic policy without a configured provider records
    /// the session in `error` status and fails with a configuration error.
    #[tracing::instrument(skip(self, task), fields(source = %task.source, target = %task.target))]
    pub async fn open(&self, task: DiagnosticTask, policy: PolicyKind) -> Result<DiagnosticSession> {
        task.validate()?;
        let mut session = DiagnosticSession::new(task, policy);

        if let Err(e) = self.policy_for(policy) {
            error!(session_id = %session.id, policy = %policy, error = %e, "Session cannot be driven");
            session.transition_to(SessionStatus::Error)?;
            self.persist(&session).await;
            return Err(e);
        }

        self.persist(&session).await;
        self.record_message(
            session.id,
            MessageRole::User,
            session.task.description.clone(),
            json!({ "task": session.task }),
        )
        .await;

        info!(
            session_id = %session.id,
            policy = %policy,
            fault = %session.task.fault_type,
            "Session opened"
        );
        Ok(session)
    }

    /// Open a session and drive it until it concludes or pauses
    pub async fn start(&self, task: DiagnosticTask, policy: PolicyKind) -> Result<RunResult> {
        let session = self.open(task, policy).await?;
        self.run(session.id).await
    }

    /// Drive an `active` session
    pub async fn run(&self, session_id: Uuid) -> Result<RunResult> {
        let claim = self.claim_execution(session_id)?;
        let result = self.run_locked(session_id, &claim.token).await;
        drop(claim);
        self.release_lock(session_id);
        result
    }

    async fn run_locked(&self, session_id: Uuid, token: &CancellationToken) -> Result<RunResult> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let session = self.load_session(session_id).await?;
        if session.status != SessionStatus::Active {
            return Err(Error::InvalidState(format!(
                "session {} is {}, expected active",
                session_id, session.status
            )));
        }
        self.drive(session, token).await
    }

    /// Answer the pending question of a `waiting_user` session and keep
    /// driving it
    pub async fn resume(&self, session_id: Uuid, answer: impl Into<String>) -> Result<RunResult> {
        let claim = self.claim_execution(session_id)?;
        let result = self.resume_locked(session_id, answer.into(), &claim.token).await;
        drop(claim);
        self.release_lock(session_id);
        result
    }

    async fn resume_locked(
        &self,
        session_id: Uuid,
        answer: String,
        token: &CancellationToken,
    ) -> Result<RunResult> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id).await?;
        if session.status != SessionStatus::WaitingUser {
            return Err(Error::InvalidState(format!(
                "session {} is {}, expected waiting_user",
                session_id, session.status
            )));
        }

        session.push_answer(answer.clone());
        session.transition_to(SessionStatus::Active)?;
        self.persist(&session).await;
        self.record_message(session_id, MessageRole::User, answer, json!({})).await;

        info!(session_id = %session_id, steps = session.step_count(), "Session resumed");
        self.drive(session, token).await
    }

    /// Cancel a session.
    ///
    /// A session driven by this process is signalled and concludes with a
    /// partial report at its next checkpoint. A session another process is
    /// driving gets a cancellation flag in the store, which that process
    /// reads at its next checkpoint. Both cases return `Ok(None)`; the
    /// running call yields the result. An idle `active` or `waiting_user`
    /// session is concluded here.
    pub async fn cancel(&self, session_id: Uuid) -> Result<Option<RunResult>> {
        if let Some(token) = self.active_executions.get(&session_id) {
            token.cancel();
            info!(session_id = %session_id, "Cancellation requested");
            return Ok(None);
        }

        let result = self.cancel_locked(session_id).await;
        self.release_lock(session_id);
        result
    }

    async fn cancel_locked(&self, session_id: Uuid) -> Result<Option<RunResult>> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id).await?;
        match session.status {
            SessionStatus::WaitingUser => session.transition_to(SessionStatus::Active)?,
            SessionStatus::Active
                if session.executing
                    && !session.execution_is_stale(self.config.stale_execution_after) =>
            {
                if self.sessions.request_cancel(session_id).await? {
                    info!(session_id = %session_id, "Cancellation flagged for the running process");
                    return Ok(None);
                }
                // The other process settled the session in the meantime
                let current = self.load_session(session_id).await?;
                return Err(Error::InvalidState(format!(
                    "session {} is already {}",
                    session_id, current.status
                )));
            }
            SessionStatus::Active => {}
            SessionStatus::Completed | SessionStatus::Error => {
                return Err(Error::InvalidState(format!(
                    "session {} is already {}",
                    session_id, session.status
                )));
            }
        }

        session.cancel_requested = true;
        session.executing = false;
        let report = self.interrupted_report(&session, INTERRUPT_CANCELLED);
        info!(session_id = %session_id, steps = session.step_count(), "Idle session cancelled");
        Ok(Some(self.conclude(&mut session, report).await?))
    }

    /// Run the loop under `token`, marking the session as executing, and
    /// settle it according to how it stopped
    #[tracing::instrument(skip(self, session, token), fields(session_id = %session.id, policy = %session.policy))]
    async fn drive(&self, mut session: DiagnosticSession, token: &CancellationToken) -> Result<RunResult> {
        session.executing = true;
        session.touch();
        self.persist(&session).await;

        let exit = self.drive_loop(&mut session, token).await;
        session.executing = false;

        match exit {
            Ok(LoopExit::Concluded(report)) => self.conclude(&mut session, report).await,
            Ok(LoopExit::Paused(question)) => {
                session.pending_question = Some(question.clone());
                session.transition_to(SessionStatus::WaitingUser)?;
                self.persist(&session).await;
                self.record_message(
                    session.id,
                    MessageRole::Assistant,
                    question.clone(),
                    json!({ "pending_question": true }),
                )
                .await;
                info!(session_id = %session.id, steps = session.step_count(), "Session waiting for operator");
                Ok(RunResult {
                    session_id: session.id,
                    status: session.status,
                    outcome: RunOutcome::WaitingUser { question },
                })
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Session failed");
                if let Err(te) = session.transition_to(SessionStatus::Error) {
                    warn!(session_id = %session.id, error = %te, "Could not mark session as failed");
                } else {
                    self.persist(&session).await;
                }
                Err(e)
            }
        }
    }

    async fn drive_loop(
        &self,
        session: &mut DiagnosticSession,
        token: &CancellationToken,
    ) -> Result<LoopExit> {
        let policy = self.policy_for(session.policy)?;

        loop {
            if self.cancellation_requested(session, token).await {
                info!(session_id = %session.id, steps = session.step_count(), "Session cancelled");
                return Ok(LoopExit::Concluded(
                    self.interrupted_report(session, INTERRUPT_CANCELLED),
                ));
            }
            if session.step_count() >= self.config.max_steps {
                warn!(
                    session_id = %session.id,
                    max_steps = self.config.max_steps,
                    "Step limit reached without a conclusion"
                );
                return Ok(LoopExit::Concluded(
                    self.interrupted_report(session, INTERRUPT_STEP_LIMIT),
                ));
            }

            let decision = match policy.decide(session, token).await {
                Ok(decision) => decision,
                Err(_) if token.is_cancelled() => continue,
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    warn!(
                        session_id = %session.id,
                        error = %e,
                        "Policy failed, concluding with rule-based analysis"
                    );
                    return Ok(LoopExit::Concluded(self.fallback_report(session, &e)));
                }
            };
            if self.cancellation_requested(session, token).await {
                continue;
            }

            let invocations = match decision {
                Decision::Conclude(report) => return Ok(LoopExit::Concluded(report)),
                Decision::Invoke(invocations) if invocations.is_empty() => {
                    debug!(session_id = %session.id, "Policy requested nothing, analyzing");
                    let steps = session.step_results();
                    return Ok(LoopExit::Concluded(
                        self.analyzer.analyze(&session.task, &steps).await,
                    ));
                }
                Decision::Invoke(invocations) => invocations,
            };

            // Each pass re-checks before the next tool; the loop head checks
            // after the last one.
            for (index, invocation) in invocations.iter().enumerate() {
                if session.step_count() >= self.config.max_steps {
                    break;
                }
                if index > 0 && self.cancellation_requested(session, token).await {
                    break;
                }
                if let StepControl::Pause(question) =
                    self.execute_invocation(session, invocation).await?
                {
                    return Ok(LoopExit::Paused(question));
                }
            }
        }
    }

    async fn conclude(
        &self,
        session: &mut DiagnosticSession,
        report: crate::models::DiagnosticReport,
    ) -> Result<RunResult> {
        session.complete(report.clone())?;
        self.persist(session).await;
        self.record_message(
            session.id,
            MessageRole::Assistant,
            report.root_cause.clone(),
            json!({
                "confidence": report.confidence,
                "need_human": report.need_human,
                "steps": report.executed_steps.len(),
            }),
        )
        .await;

        info!(
            session_id = %session.id,
            steps = report.executed_steps.len(),
            confidence = report.confidence,
            need_human = report.need_human,
            "Session completed"
        );
        Ok(RunResult {
            session_id: session.id,
            status: session.status,
            outcome: RunOutcome::Completed(report),
        })
    }
}
