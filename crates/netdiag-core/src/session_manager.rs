//! Session manager
//!
//! A `DashMap` cache in front of a [`SessionStore`]. The store is
//! authoritative: every write goes through to it and a cache miss falls back
//! to it.

use crate::error::Result;
use crate::memory::{SessionStore, StoredMessage};
use crate::session::{DiagnosticSession, SessionStatus};
use dashmap::DashMap;
use netdiag_llm::MessageRole;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default session retention
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 30;

/// Caches sessions over a durable store
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cache: DashMap<Uuid, DiagnosticSession>,
    ttl: chrono::Duration,
}

impl SessionManager {
    /// Create a manager over `store`
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            ttl: chrono::Duration::days(DEFAULT_SESSION_TTL_DAYS),
        }
    }

    /// Set the retention used by [`cleanup_expired`](Self::cleanup_expired)
    #[must_use]
    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Cache and persist `session`. The cache is updated even when the store
    /// write fails, so the current process keeps the latest state.
    pub async fn save(&self, session: &DiagnosticSession) -> Result<()> {
        self.cache.insert(session.id, session.clone());
        self.store.save(session).await
    }

    /// Load a session, from cache or store
    pub async fn get(&self, id: Uuid) -> Result<Option<DiagnosticSession>> {
        if let Some(cached) = self.cache.get(&id) {
            return Ok(Some(cached.clone()));
        }
        let loaded = self.store.load(id).await?;
        if let Some(session) = &loaded {
            debug!(session_id = %id, "Session restored from store");
            self.cache.insert(id, session.clone());
        }
        Ok(loaded)
    }

    /// Load a session from the store, refreshing the cache. Another process
    /// may have written it since it was cached. When the store cannot be
    /// read the cached copy is used.
    pub async fn reload(&self, id: Uuid) -> Result<Option<DiagnosticSession>> {
        match self.store.load(id).await {
            Ok(Some(session)) => {
                self.cache.insert(id, session.clone());
                Ok(Some(session))
            }
            Ok(None) => {
                self.cache.remove(&id);
                Ok(None)
            }
            Err(e) => match self.cache.get(&id) {
                Some(cached) => {
                    warn!(session_id = %id, error = %e, "Store unreadable, using cached session");
                    Ok(Some(cached.clone()))
                }
                None => Err(e),
            },
        }
    }

    /// Flag an active session for cancellation in the store
    pub async fn request_cancel(&self, id: Uuid) -> Result<bool> {
        self.store.request_cancel(id).await
    }

    /// Whether the store holds a cancellation request for a session
    pub async fn cancel_requested(&self, id: Uuid) -> Result<bool> {
        self.store.cancel_requested(id).await
    }

    /// Stored sessions, most recently updated first
    pub async fn list(&self, status: Option<SessionStatus>) -> Result<Vec<DiagnosticSession>> {
        self.store.list(status).await
    }

    /// Delete a session from cache and store
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let cached = self.cache.remove(&id).is_some();
        Ok(self.store.delete(id).await? || cached)
    }

    /// Append a transcript message
    pub async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: impl Into<String>,
        metadata: Value,
    ) -> Result<()> {
        let message = StoredMessage::new(session_id, role, content).with_metadata(metadata);
        self.store.append_message(&message).await
    }

    /// Transcript of a session
    pub async fn messages(&self, session_id: Uuid) -> Result<Vec<StoredMessage>> {
        self.store.messages(session_id).await
    }

    /// Purge sessions older than the retention from store and cache
    pub async fn cleanup_expired(&self) -> Result<Vec<Uuid>> {
        let removed = self.store.cleanup_expired(self.ttl).await?;
        for id in &removed {
            self.cache.remove(id);
        }
        Ok(removed)
    }

    /// Drop every cached entry; the store is untouched
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of cached sessions
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{DiagnosticTask, FaultType};
    use crate::policy::PolicyKind;
    use serde_json::json;

    fn session() -> DiagnosticSession {
        DiagnosticSession::new(
            DiagnosticTask::new("10.0.1.10", "10.0.2.20", FaultType::Connectivity),
            PolicyKind::Rule,
        )
    }

    #[tokio::test]
    async fn test_cache_miss_falls_back_to_store() {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store.clone());
        let s = session();
        manager.save(&s).await.unwrap();

        manager.clear_cache();
        assert_eq!(manager.cached_count(), 0);

        let loaded = manager.get(s.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, s.id);
        assert_eq!(manager.cached_count(), 1);
        assert!(manager.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reload_sees_writes_from_another_manager() {
        let store = Arc::new(MemoryStore::new());
        let ours = SessionManager::new(store.clone());
        let theirs = SessionManager::new(store);
        let mut s = session();
        ours.save(&s).await.unwrap();

        s.transition_to(SessionStatus::WaitingUser).unwrap();
        theirs.save(&s).await.unwrap();

        assert_eq!(ours.get(s.id).await.unwrap().unwrap().status, SessionStatus::Active);
        assert_eq!(
            ours.reload(s.id).await.unwrap().unwrap().status,
            SessionStatus::WaitingUser
        );
        assert_eq!(ours.get(s.id).await.unwrap().unwrap().status, SessionStatus::WaitingUser);

        theirs.delete(s.id).await.unwrap();
        assert!(ours.reload(s.id).await.unwrap().is_none());
        assert_eq!(ours.cached_count(), 0);
    }

    #[tokio::test]
    async fn test_transcript_and_delete() {
        let manager = SessionManager::new(Arc::new(MemoryStore::new()));
        let s = session();
        manager.save(&s).await.unwrap();
        manager
            .append_message(s.id, MessageRole::User, "nginx", json!({}))
            .await
            .unwrap();
        assert_eq!(manager.messages(s.id).await.unwrap()[0].content, "nginx");

        assert!(manager.delete(s.id).await.unwrap());
        assert!(manager.get(s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_evicts_cache() {
        let manager = SessionManager::new(Arc::new(MemoryStore::new()))
            .with_ttl(chrono::Duration::days(1));
        let mut stale = session();
        stale.updated_at = chrono::Utc::now() - chrono::Duration::days(2);
        manager.save(&stale).await.unwrap();
        manager.save(&session()).await.unwrap();

        let removed = manager.cleanup_expired().await.unwrap();
        assert_eq!(removed, vec![stale.id]);
        assert_eq!(manager.cached_count(), 1);
        assert_eq!(manager.list(None).await.unwrap().len(), 1);
    }
}
