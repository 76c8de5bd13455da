//! SQLite session storage backend
//!
//! The default store. Each session is one row keyed by its id; writes are
//! per-row upserts so sessions never contend on a shared lock, and WAL
//! journaling keeps readers off the writers' path.
//!
//! # Usage
//!
//! ```no_run
//! use netdiag_core::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Default location: ~/.netdiag/sessions.db
//! let store = SqliteStore::new_default().await?;
//!
//! // Or specify a custom path
//! let store = SqliteStore::new("/path/to/sessions.db").await?;
//! # Ok(())
//! # }
//! ```

use super::{SessionStore, StoredMessage};
use crate::error::{Error, Result};
use crate::session::{DiagnosticSession, SessionStatus};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

type SessionRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    bool,
    bool,
    String,
    String,
);

const SESSION_COLUMNS: &str = "session_id, task_data, context, status, pending_question, \
                               policy, report, cancel_requested, executing, created_at, updated_at";

/// Columns added after the first schema, with their definitions
const ADDED_SESSION_COLUMNS: [(&str, &str); 2] = [
    ("cancel_requested", "INTEGER NOT NULL DEFAULT 0"),
    ("executing", "INTEGER NOT NULL DEFAULT 0"),
];

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("Invalid timestamp '{}': {}", raw, e)))
}

/// SQLite session store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store at the specified path
    ///
    /// # Errors
    ///
    /// Returns error if database creation or schema setup fails.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Storage(format!("Invalid SQLite path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("Failed to connect to SQLite: {}", e)))?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %path.display(), "SQLite session store initialized");
        Ok(store)
    }

    /// Create a store at the default location (~/.netdiag/sessions.db)
    pub async fn new_default() -> Result<Self> {
        let path = Self::default_path()?;
        Self::new(&path).await
    }

    /// Get the default database path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Configuration("Could not determine home directory".to_string()))?;
        Ok(home.join(".netdiag").join("sessions.db"))
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                task_data TEXT NOT NULL,
                context TEXT NOT NULL,
                status TEXT NOT NULL,
                pending_question TEXT,
                policy TEXT NOT NULL DEFAULT 'rule',
                report TEXT,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                executing INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create sessions table: {}", e)))?;
        for (column, definition) in ADDED_SESSION_COLUMNS {
            self.add_column_if_missing("sessions", column, definition).await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create messages table: {}", e)))?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at)",
            "CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create index: {}", e)))?;
        }

        debug!("SQLite session schema initialized");
        Ok(())
    }

    async fn add_column_if_missing(&self, table: &str, column: &str, definition: &str) -> Result<()> {
        let columns: Vec<(String,)> =
            sqlx::query_as(&format!("SELECT name FROM pragma_table_info('{table}')"))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to inspect {}: {}", table, e)))?;
        if columns.iter().any(|(name,)| name == column) {
            return Ok(());
        }

        sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to add {}.{}: {}", table, column, e)))?;
        info!(table = table, column = column, "Added missing column");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Health check failed: {}", e)))?;
        Ok(true)
    }

    fn hydrate(row: SessionRow) -> Result<DiagnosticSession> {
        let (
            id,
            task,
            context,
            status,
            pending_question,
            policy,
            report,
            cancel_requested,
            executing,
            created,
            updated,
        ) = row;
        let report = report
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| Error::Serialization(format!("Failed to deserialize report: {}", e)))?;

        Ok(DiagnosticSession {
            id: Uuid::parse_str(&id)
                .map_err(|e| Error::Serialization(format!("Invalid session id '{}': {}", id, e)))?,
            task: serde_json::from_str(&task)
                .map_err(|e| Error::Serialization(format!("Failed to deserialize task: {}", e)))?,
            context: serde_json::from_str(&context).map_err(|e| {
                Error::Serialization(format!("Failed to deserialize context: {}", e))
            })?,
            status: status.parse()?,
            pending_question,
            policy: policy.parse()?,
            report,
            cancel_requested,
            executing,
            created_at: parse_timestamp(&created)?,
            updated_at: parse_timestamp(&updated)?,
        })
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn save(&self, session: &DiagnosticSession) -> Result<()> {
        let task = serde_json::to_string(&session.task)?;
        let context = serde_json::to_string(&session.context)?;
        let report = session
            .report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, task_data, context, status, pending_question,
                                  policy, report, cancel_requested, executing,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                task_data = excluded.task_data,
                context = excluded.context,
                status = excluded.status,
                pending_question = excluded.pending_question,
                policy = excluded.policy,
                report = excluded.report,
                cancel_requested = MAX(sessions.cancel_requested, excluded.cancel_requested),
                executing = excluded.executing,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session.id.to_string())
        .bind(&task)
        .bind(&context)
        .bind(session.status.as_str())
        .bind(&session.pending_question)
        .bind(session.policy.as_str())
        .bind(&report)
        .bind(session.cancel_requested)
        .bind(session.executing)
        .bind(timestamp(session.created_at))
        .bind(timestamp(session.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to save session: {}", e)))?;

        debug!(session_id = %session.id, status = %session.status, "Session saved to SQLite");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<DiagnosticSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to load session: {}", e)))?;

        let session = row.map(Self::hydrate).transpose()?;
        if session.is_some() {
            debug!(session_id = %id, "Session loaded from SQLite");
        }
        Ok(session)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete messages: {}", e)))?;
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete session: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Storage(format!("Failed to commit delete: {}", e)))?;

        let deleted = result.rows_affected() > 0;
        debug!(session_id = %id, deleted = deleted, "Session deleted from SQLite");
        Ok(deleted)
    }

    async fn list(&self, status: Option<SessionStatus>) -> Result<Vec<DiagnosticSession>> {
        let rows: Vec<SessionRow> = match status {
            Some(status) => sqlx::query_as(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = ? ORDER BY updated_at DESC"
            ))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY updated_at DESC"
            ))
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| Error::Storage(format!("Failed to list sessions: {}", e)))?;

        rows.into_iter().map(Self::hydrate).collect()
    }

    async fn append_message(&self, message: &StoredMessage) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (session_id, role, content, metadata, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(message.session_id.to_string())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(serde_json::to_string(&message.metadata)?)
        .bind(timestamp(message.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to append message: {}", e)))?;
        Ok(())
    }

    async fn messages(&self, id: Uuid) -> Result<Vec<StoredMessage>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT role, content, metadata, timestamp FROM messages WHERE session_id = ? ORDER BY id",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to load messages: {}", e)))?;

        rows.into_iter()
            .map(|(role, content, metadata, at)| -> Result<StoredMessage> {
                Ok(StoredMessage {
                    session_id: id,
                    role: serde_json::from_value(serde_json::Value::String(role))?,
                    content,
                    metadata: serde_json::from_str(&metadata)?,
                    timestamp: parse_timestamp(&at)?,
                })
            })
            .collect()
    }

    async fn cleanup_expired(&self, ttl: chrono::Duration) -> Result<Vec<Uuid>> {
        let cutoff = timestamp(Utc::now() - ttl);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {}", e)))?;

        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT session_id FROM sessions WHERE updated_at < ?")
                .bind(&cutoff)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| Error::Storage(format!("Failed to find expired sessions: {}", e)))?;

        sqlx::query(
            "DELETE FROM messages WHERE session_id IN (SELECT session_id FROM sessions WHERE updated_at < ?)",
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Storage(format!("Failed to cleanup messages: {}", e)))?;
        sqlx::query("DELETE FROM sessions WHERE updated_at < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Storage(format!("Failed to cleanup sessions: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Storage(format!("Failed to commit cleanup: {}", e)))?;

        let removed: Vec<Uuid> = rows
            .into_iter()
            .filter_map(|(id,)| Uuid::parse_str(&id).ok())
            .collect();
        if !removed.is_empty() {
            info!(removed = removed.len(), "Cleaned up expired sessions");
        }
        Ok(removed)
    }

    async fn request_cancel(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET cancel_requested = 1 WHERE session_id = ? AND status = ?",
        )
        .bind(id.to_string())
        .bind(SessionStatus::Active.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to request cancellation: {}", e)))?;

        let flagged = result.rows_affected() > 0;
        debug!(session_id = %id, flagged = flagged, "Cancellation flag written");
        Ok(flagged)
    }

    async fn cancel_requested(&self, id: Uuid) -> Result<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT cancel_requested FROM sessions WHERE session_id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to read cancellation flag: {}", e)))?;
        Ok(row.is_some_and(|(flag,)| flag))
    }
}
