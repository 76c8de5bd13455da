//! Memory - durable session storage
//!
//! - SQLite store (default, survives restarts)
//! - In-memory store (tests and one-shot runs)
//!
//! Both keep the session record and an append-only message transcript.
//! Stores are the authority; [`SessionManager`](crate::SessionManager) only
//! caches in front of them.

mod memory_store;
mod sqlite_store;

pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

use crate::error::Result;
use crate::session::{DiagnosticSession, SessionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netdiag_llm::MessageRole;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Owning session
    pub session_id: Uuid,
    /// Author
    pub role: MessageRole,
    /// Text
    pub content: String,
    /// Structured detail, e.g. `{tool, arguments, result}` for tool calls
    pub metadata: Value,
    /// When it was recorded
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    /// Create a message with empty metadata
    #[must_use]
    pub fn new(session_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role,
            content: content.into(),
            metadata: Value::Object(serde_json::Map::new()),
            timestamp: Utc::now(),
        }
    }

    /// Attach metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Session store trait for abstracting storage backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session record
    async fn save(&self, session: &DiagnosticSession) -> Result<()>;

    /// Load a session by id
    async fn load(&self, id: Uuid) -> Result<Option<DiagnosticSession>>;

    /// Delete a session and its transcript
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Sessions, most recently updated first, optionally filtered by status
    async fn list(&self, status: Option<SessionStatus>) -> Result<Vec<DiagnosticSession>>;

    /// Append to a session's transcript
    async fn append_message(&self, message: &StoredMessage) -> Result<()>;

    /// Transcript of a session, oldest first
    async fn messages(&self, id: Uuid) -> Result<Vec<StoredMessage>>;

    /// Remove sessions not updated within `ttl`; returns their ids
    async fn cleanup_expired(&self, ttl: chrono::Duration) -> Result<Vec<Uuid>>;

    /// Flag an `active` session for cancellation. Returns `false` when no
    /// such session exists. A later `save` never clears the flag.
    async fn request_cancel(&self, id: Uuid) -> Result<bool>;

    /// Whether cancellation was requested for a session
    async fn cancel_requested(&self, id: Uuid) -> Result<bool>;
}
