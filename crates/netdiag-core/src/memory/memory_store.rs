//! In-memory session storage
//!
//! Data is lost when the process exits. Used by tests and by one-shot runs
//! that do not need resume.

use super::{SessionStore, StoredMessage};
use crate::error::Result;
use crate::session::{DiagnosticSession, SessionStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Volatile session store
#[derive(Default, Clone)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<Uuid, DiagnosticSession>>>,
    messages: Arc<RwLock<HashMap<Uuid, Vec<StoredMessage>>>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is stored
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, session: &DiagnosticSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let cancel_requested = sessions
            .get(&session.id)
            .is_some_and(|stored| stored.cancel_requested);
        let mut record = session.clone();
        record.cancel_requested |= cancel_requested;
        sessions.insert(session.id, record);
        debug!(session_id = %session.id, status = %session.status, "Session saved to memory");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<DiagnosticSession>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.messages.write().await.remove(&id);
        Ok(self.sessions.write().await.remove(&id).is_some())
    }

    async fn list(&self, status: Option<SessionStatus>) -> Result<Vec<DiagnosticSession>> {
        let mut sessions: Vec<DiagnosticSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn append_message(&self, message: &StoredMessage) -> Result<()> {
        self.messages
            .write()
            .await
            .entry(message.session_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn messages(&self, id: Uuid) -> Result<Vec<StoredMessage>> {
        Ok(self
            .messages
            .read()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn cleanup_expired(&self, ttl: chrono::Duration) -> Result<Vec<Uuid>> {
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.sessions.write().await;
        let expired: Vec<Uuid> = sessions
            .values()
            .filter(|s| s.updated_at < cutoff)
            .map(|s| s.id)
            .collect();

        let mut messages = self.messages.write().await;
        for id in &expired {
            sessions.remove(id);
            messages.remove(id);
        }
        if !expired.is_empty() {
            info!(removed = expired.len(), "Cleaned up expired sessions");
        }
        Ok(expired)
    }

    async fn request_cancel(&self, id: Uuid) -> Result<bool> {
        match self.sessions.write().await.get_mut(&id) {
            Some(session) if session.status == SessionStatus::Active => {
                session.cancel_requested = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_requested(&self, id: Uuid) -> Result<bool> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&id)
            .is_some_and(|s| s.cancel_requested))
    }
}
