//! Error types for netdiag-core

use crate::session::SessionStatus;
use thiserror::Error;
use uuid::Uuid;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// No session with this id in cache or store
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    /// Status change outside the allowed graph
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: SessionStatus,
        /// Requested status
        to: SessionStatus,
    },

    /// Operation not allowed in the session's current state
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// Task descriptor rejected
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// Missing or invalid settings, e.g. dynamic-policy credentials
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Policy failed to decide
    #[error("policy error: {0}")]
    Policy(String),

    /// Durable store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// LLM provider error
    #[error("llm error: {0}")]
    Llm(#[from] netdiag_llm::Error),

    /// Tool error
    #[error("tool error: {0}")]
    Tool(#[from] netdiag_tools::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error should end a session in `error` status
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration(_) => true,
            Self::Llm(e) => e.is_fatal(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(Error::Configuration("missing api key".into()).is_configuration());
        assert!(Error::Llm(netdiag_llm::Error::Auth("bad key".into())).is_configuration());
        assert!(!Error::Llm(netdiag_llm::Error::Timeout(1000)).is_configuration());
        assert!(!Error::Storage("disk full".into()).is_configuration());
    }

    #[test]
    fn test_transition_message() {
        let err = Error::InvalidTransition {
            from: SessionStatus::Completed,
            to: SessionStatus::Active,
        };
        assert_eq!(err.to_string(), "invalid status transition: completed -> active");
    }
}
