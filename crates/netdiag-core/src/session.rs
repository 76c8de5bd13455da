//! Diagnostic session - the mutable, persistable record of one diagnosis

use crate::error::{Error, Result};
use crate::models::{DiagnosticReport, DiagnosticTask, StepResult};
use crate::policy::PolicyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Drive loop may run
    Active,
    /// Paused on a question to the operator
    WaitingUser,
    /// Concluded with a report
    Completed,
    /// Ended by a configuration or internal failure
    Error,
}

impl SessionStatus {
    /// snake_case name, as stored
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::WaitingUser => "waiting_user",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Whether moving to `next` is allowed
    #[must_use]
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (_, Self::Error)
                | (Self::Active, Self::WaitingUser | Self::Completed)
                | (Self::WaitingUser, Self::Active)
        )
    }

    /// Whether no further transition except to `error` is possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "waiting_user" => Ok(Self::WaitingUser),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(Error::Serialization(format!("unknown session status: {other}"))),
        }
    }
}

/// One entry of the session context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextEntry {
    /// An executed step
    Step(StepResult),
    /// An operator's answer to a pending question
    UserAnswer {
        /// Number of the last step before the answer
        after_step: u32,
        /// Question that was asked
        question: Option<String>,
        /// The answer
        answer: String,
        /// When it was given
        at: DateTime<Utc>,
    },
}

/// A diagnosis in progress or concluded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSession {
    /// Session id
    pub id: Uuid,
    /// What is being diagnosed
    pub task: DiagnosticTask,
    /// Append-only history of steps and answers
    pub context: Vec<ContextEntry>,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Question awaiting an answer, while `waiting_user`
    pub pending_question: Option<String>,
    /// Policy driving this session
    pub policy: PolicyKind,
    /// Final report, once completed
    pub report: Option<DiagnosticReport>,
    /// Cancellation was requested while another process drove the session.
    /// Once set it stays set.
    #[serde(default)]
    pub cancel_requested: bool,
    /// A drive loop currently owns the session
    #[serde(default)]
    pub executing: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl DiagnosticSession {
    /// Create an active session with an empty context
    #[must_use]
    pub fn new(task: DiagnosticTask, policy: PolicyKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task,
            context: Vec::new(),
            status: SessionStatus::Active,
            pending_question: None,
            policy,
            report: None,
            cancel_requested: false,
            executing: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Executed steps, in order
    pub fn steps(&self) -> impl Iterator<Item = &StepResult> {
        self.context.iter().filter_map(|entry| match entry {
            ContextEntry::Step(step) => Some(step),
            ContextEntry::UserAnswer { .. } => None,
        })
    }

    /// Owned copy of the executed steps
    #[must_use]
    pub fn step_results(&self) -> Vec<StepResult> {
        self.steps().cloned().collect()
    }

    /// Number of executed steps
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps().count()
    }

    /// Most recent step
    #[must_use]
    pub fn last_step(&self) -> Option<&StepResult> {
        self.steps().last()
    }

    /// Number of the most recent step, 0 before the first
    #[must_use]
    pub fn last_step_number(&self) -> u32 {
        self.last_step().map_or(0, |s| s.step_number)
    }

    /// Append a step; its number must exceed every earlier one
    pub fn push_step(&mut self, step: StepResult) -> Result<()> {
        let last = self.last_step_number();
        if step.step_number <= last {
            return Err(Error::InvalidState(format!(
                "step {} does not follow step {last}",
                step.step_number
            )));
        }
        self.context.push(ContextEntry::Step(step));
        self.touch();
        Ok(())
    }

    /// Record the operator's answer to the pending question
    pub fn push_answer(&mut self, answer: impl Into<String>) {
        self.context.push(ContextEntry::UserAnswer {
            after_step: self.last_step_number(),
            question: self.pending_question.take(),
            answer: answer.into(),
            at: Utc::now(),
        });
        self.touch();
    }

    /// Change status along the allowed graph
    pub fn transition_to(&mut self, next: SessionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next != SessionStatus::WaitingUser {
            self.pending_question = None;
        }
        self.touch();
        Ok(())
    }

    /// Conclude with `report`
    pub fn complete(&mut self, report: DiagnosticReport) -> Result<()> {
        self.transition_to(SessionStatus::Completed)?;
        self.report = Some(report);
        Ok(())
    }

    /// Whether an `executing` marker is older than `stale_after`, meaning the
    /// process that set it is gone
    #[must_use]
    pub fn execution_is_stale(&self, stale_after: std::time::Duration) -> bool {
        self.executing
            && (Utc::now() - self.updated_at)
                .to_std()
                .is_ok_and(|age| age > stale_after)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FaultType;

    fn session() -> DiagnosticSession {
        DiagnosticSession::new(
            DiagnosticTask::new("10.0.1.10", "10.0.2.20", FaultType::PortUnreachable).with_port(80),
            PolicyKind::Rule,
        )
    }

    #[test]
    fn test_transition_graph() {
        use SessionStatus::*;
        assert!(Active.can_transition_to(WaitingUser));
        assert!(Active.can_transition_to(Completed));
        assert!(WaitingUser.can_transition_to(Active));
        assert!(Completed.can_transition_to(Error));
        assert!(!Completed.can_transition_to(Active));
        assert!(!WaitingUser.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut s = session();
        s.complete(DiagnosticReport::new(s.task.task_id, "x", 0.9, false, vec![]))
            .unwrap();
        let err = s.transition_to(SessionStatus::WaitingUser).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(s.status, SessionStatus::Completed);
    }

    #[test]
    fn test_step_numbers_strictly_increase() {
        let mut s = session();
        s.push_step(StepResult::new(1, "a", "query_cmdb", true)).unwrap();
        s.push_step(StepResult::new(4, "b", "ping_test", true)).unwrap();
        assert!(s.push_step(StepResult::new(4, "c", "ping_test", true)).is_err());
        assert!(s.push_step(StepResult::new(2, "d", "ping_test", true)).is_err());
        assert_eq!(s.last_step_number(), 4);
        assert_eq!(s.step_count(), 2);
    }

    #[test]
    fn test_answer_consumes_pending_question() {
        let mut s = session();
        s.push_step(StepResult::new(1, "a", "query_cmdb", true)).unwrap();
        s.pending_question = Some("Was the firewall changed?".into());
        s.transition_to(SessionStatus::WaitingUser).unwrap();
        s.push_answer("yes, yesterday");
        s.transition_to(SessionStatus::Active).unwrap();

        assert!(s.pending_question.is_none());
        match s.context.last().unwrap() {
            ContextEntry::UserAnswer {
                after_step,
                question,
                answer,
                ..
            } => {
                assert_eq!(*after_step, 1);
                assert_eq!(question.as_deref(), Some("Was the firewall changed?"));
                assert_eq!(answer, "yes, yesterday");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.step_count(), 1);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::WaitingUser).unwrap(),
            "\"waiting_user\""
        );
        assert_eq!("waiting_user".parse::<SessionStatus>().unwrap(), SessionStatus::WaitingUser);
        assert!("paused".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_stale_execution_marker() {
        let ten_minutes = std::time::Duration::from_secs(600);
        let mut s = session();
        assert!(!s.execution_is_stale(ten_minutes));

        s.executing = true;
        assert!(!s.execution_is_stale(ten_minutes));
        s.updated_at = Utc::now() - chrono::Duration::minutes(11);
        assert!(s.execution_is_stale(ten_minutes));
    }

    #[test]
    fn test_flags_default_when_missing() {
        let mut value = serde_json::to_value(session()).unwrap();
        let fields = value.as_object_mut().unwrap();
        fields.remove("cancel_requested");
        fields.remove("executing");
        let back: DiagnosticSession = serde_json::from_value(value).unwrap();
        assert!(!back.cancel_requested);
        assert!(!back.executing);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut s = session();
        s.push_step(StepResult::new(1, "a", "query_cmdb", true)).unwrap();
        s.push_answer("ok");
        let json = serde_json::to_string(&s).unwrap();
        let back: DiagnosticSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
