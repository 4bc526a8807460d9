//! The session store facade.
//!
//! [`SessionStore`] is the contract the orchestrator consumes: point reads,
//! the atomic working-state transitions, and the append-only message and
//! file-access surfaces. [`SqliteSessionStore`] implements it over the
//! connection pool and repositories.

use tracing::instrument;

use crate::connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
use crate::errors::Result;
use crate::migrations::run_migrations;
pub use crate::repositories::file_access::NewFileAccess;
pub use crate::repositories::message::{ListMessagesOptions, NewMessage};
pub use crate::repositories::session::{ListSessionsOptions, NewSession};
use crate::repositories::{FileAccessRepo, MessageRepo, SessionRepo};
use crate::row_types::{FileAccessRow, JobStatus, MessageRow, SessionRow};

/// Session state store consumed by the orchestrator.
///
/// `begin_job` / `rollback_job` / `finish_job` are atomic conditional
/// updates — never read-then-write — so concurrent submissions and stale
/// terminal events resolve correctly at the store.
pub trait SessionStore: Send + Sync {
    /// Create a new idle session.
    fn create_session(&self, opts: &NewSession<'_>) -> Result<SessionRow>;

    /// Fetch a session.
    fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>>;

    /// List sessions, most recently accessed first.
    fn list_sessions(&self, opts: &ListSessionsOptions<'_>) -> Result<Vec<SessionRow>>;

    /// Refresh a session's last-accessed timestamp.
    fn touch_session(&self, session_id: &str) -> Result<bool>;

    /// Delete a session; messages and file accesses cascade.
    fn delete_session(&self, session_id: &str) -> Result<bool>;

    /// Atomic admission (`idle → working`). `false` when the session is
    /// already working.
    fn begin_job(&self, session_id: &str, job_id: &str) -> Result<bool>;

    /// Compensating rollback after a failed enqueue.
    fn rollback_job(&self, session_id: &str, job_id: &str) -> Result<bool>;

    /// Terminal reconciliation (`working → idle`), conditional on the job
    /// still being current. `false` for stale terminals.
    fn finish_job(
        &self,
        session_id: &str,
        job_id: &str,
        status: JobStatus,
        token_delta: i64,
    ) -> Result<bool>;

    /// Append an exchange turn.
    fn append_message(&self, message: &NewMessage<'_>) -> Result<MessageRow>;

    /// List a session's messages in creation order.
    fn list_messages(
        &self,
        session_id: &str,
        opts: &ListMessagesOptions,
    ) -> Result<Vec<MessageRow>>;

    /// Record a file access audit entry.
    fn record_file_access(&self, access: &NewFileAccess<'_>) -> Result<FileAccessRow>;

    /// List a session's file accesses in creation order.
    fn list_file_accesses(&self, session_id: &str) -> Result<Vec<FileAccessRow>>;
}

/// SQLite-backed [`SessionStore`].
pub struct SqliteSessionStore {
    pool: ConnectionPool,
}

impl SqliteSessionStore {
    /// Open a file-backed store and run pending migrations.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = new_file(path, config)?;
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self { pool })
    }

    /// Open an in-memory store (tests, ephemeral deployments).
    pub fn open_in_memory() -> Result<Self> {
        let pool = new_in_memory(&ConnectionConfig::default())?;
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self { pool })
    }

    /// The underlying pool (for embedders that share the database).
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl SessionStore for SqliteSessionStore {
    fn create_session(&self, opts: &NewSession<'_>) -> Result<SessionRow> {
        let conn = self.pool.get()?;
        SessionRepo::create(&conn, opts)
    }

    fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let conn = self.pool.get()?;
        SessionRepo::get(&conn, session_id)
    }

    fn list_sessions(&self, opts: &ListSessionsOptions<'_>) -> Result<Vec<SessionRow>> {
        let conn = self.pool.get()?;
        SessionRepo::list(&conn, opts)
    }

    fn touch_session(&self, session_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        SessionRepo::touch(&conn, session_id)
    }

    fn delete_session(&self, session_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        SessionRepo::delete(&conn, session_id)
    }

    #[instrument(skip(self))]
    fn begin_job(&self, session_id: &str, job_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        SessionRepo::begin_job(&conn, session_id, job_id)
    }

    #[instrument(skip(self))]
    fn rollback_job(&self, session_id: &str, job_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        SessionRepo::rollback_job(&conn, session_id, job_id)
    }

    #[instrument(skip(self))]
    fn finish_job(
        &self,
        session_id: &str,
        job_id: &str,
        status: JobStatus,
        token_delta: i64,
    ) -> Result<bool> {
        let conn = self.pool.get()?;
        SessionRepo::finish_job(&conn, session_id, job_id, status, token_delta)
    }

    fn append_message(&self, message: &NewMessage<'_>) -> Result<MessageRow> {
        let conn = self.pool.get()?;
        MessageRepo::append(&conn, message)
    }

    fn list_messages(
        &self,
        session_id: &str,
        opts: &ListMessagesOptions,
    ) -> Result<Vec<MessageRow>> {
        let conn = self.pool.get()?;
        MessageRepo::list(&conn, session_id, opts)
    }

    fn record_file_access(&self, access: &NewFileAccess<'_>) -> Result<FileAccessRow> {
        let conn = self.pool.get()?;
        FileAccessRepo::record(&conn, access)
    }

    fn list_file_accesses(&self, session_id: &str) -> Result<Vec<FileAccessRow>> {
        let conn = self.pool.get()?;
        FileAccessRepo::list(&conn, session_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
