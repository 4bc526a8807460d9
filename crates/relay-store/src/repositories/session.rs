//! Session repository — lifecycle, working-state machine, counters.
//!
//! The working-state transitions (`begin_job`, `rollback_job`,
//! `finish_job`) are single conditional `UPDATE`s: the database row is the
//! point of serialization, so two racing submissions can never both win
//! admission, and a stale terminal event can never clobber a newer job.

use relay_core::ids::SessionId;
use relay_core::provider::Provider;
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::{Result, StoreError};
use crate::row_types::{JobStatus, SessionRow};

/// Options for creating a new session.
pub struct NewSession<'a> {
    /// CLI backend for this session.
    pub provider: Provider,
    /// Project directory the session operates in.
    pub project_path: &'a str,
    /// Free-form context supplied by the client.
    pub context: Option<&'a str>,
    /// Provider-specific home directory override.
    pub provider_home: Option<&'a str>,
    /// Arbitrary metadata object.
    pub metadata: Option<&'a serde_json::Value>,
}

/// Options for listing sessions.
#[derive(Default)]
pub struct ListSessionsOptions<'a> {
    /// Filter by provider.
    pub provider: Option<&'a str>,
    /// Filter by working state.
    pub working: Option<bool>,
    /// Maximum results.
    pub limit: Option<i64>,
    /// Skip results.
    pub offset: Option<i64>,
}

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Create a new idle session.
    pub fn create(conn: &Connection, opts: &NewSession<'_>) -> Result<SessionRow> {
        let id = SessionId::new().into_inner();
        let now = chrono::Utc::now().to_rfc3339();
        let metadata = opts.metadata.map_or_else(
            || "{}".to_string(),
            |m| serde_json::to_string(m).unwrap_or_else(|_| "{}".to_string()),
        );

        let _ = conn.execute(
            "INSERT INTO sessions (id, provider, project_path, context, provider_home,
             metadata, created_at, updated_at, last_accessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                opts.provider.as_str(),
                opts.project_path,
                opts.context,
                opts.provider_home,
                metadata,
                now,
                now,
                now,
            ],
        )?;

        Ok(SessionRow {
            id,
            provider: opts.provider.as_str().to_owned(),
            project_path: opts.project_path.to_owned(),
            context: opts.context.map(str::to_owned),
            provider_home: opts.provider_home.map(str::to_owned),
            metadata,
            created_at: now.clone(),
            updated_at: now.clone(),
            last_accessed_at: now,
            is_working: false,
            current_job_id: None,
            last_job_status: None,
            message_count: 0,
            token_count: 0,
        })
    }

    /// Fetch a session by ID.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM sessions WHERE id = ?1",
                    SessionRow::COLUMNS
                ),
                params![id],
                SessionRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List sessions, most recently accessed first.
    pub fn list(conn: &Connection, opts: &ListSessionsOptions<'_>) -> Result<Vec<SessionRow>> {
        let working = opts.working.map(i64::from);
        let limit = opts.limit.unwrap_or(-1);
        let offset = opts.offset.unwrap_or(0);

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions
             WHERE (?1 IS NULL OR provider = ?1)
               AND (?2 IS NULL OR is_working = ?2)
             ORDER BY last_accessed_at DESC
             LIMIT ?3 OFFSET ?4",
            SessionRow::COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![opts.provider, working, limit, offset],
                SessionRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Refresh `last_accessed_at`. Returns `false` when the session does
    /// not exist.
    pub fn touch(conn: &Connection, id: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE sessions SET last_accessed_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(updated == 1)
    }

    /// Delete a session. Messages and file-access records cascade.
    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(deleted == 1)
    }

    /// Atomic admission: transition `idle → working` with `job_id`.
    ///
    /// Compare-and-set on `is_working = 0` — of two racing submissions
    /// exactly one sees `true`; the other sees `false` (session busy).
    /// Fails with [`StoreError::SessionNotFound`] for unknown sessions.
    pub fn begin_job(conn: &Connection, id: &str, job_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE sessions
             SET is_working = 1, current_job_id = ?2, updated_at = ?3, last_accessed_at = ?3
             WHERE id = ?1 AND is_working = 0",
            params![id, job_id, now],
        )?;
        if updated == 1 {
            return Ok(true);
        }
        if Self::get(conn, id)?.is_none() {
            return Err(StoreError::SessionNotFound(id.to_owned()));
        }
        Ok(false)
    }

    /// Compensating rollback after a failed enqueue: transition back to
    /// `idle`, conditional on `job_id` still being current. No job status
    /// is recorded — the job never ran.
    pub fn rollback_job(conn: &Connection, id: &str, job_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE sessions
             SET is_working = 0, current_job_id = NULL, updated_at = ?3
             WHERE id = ?1 AND current_job_id = ?2",
            params![id, job_id, now],
        )?;
        Ok(updated == 1)
    }

    /// Terminal reconciliation: transition `working → idle`, record the
    /// outcome, and add the job's tokens to the running counter.
    ///
    /// Conditional on `job_id` still being current, which makes stale
    /// terminal events no-ops (`false`).
    pub fn finish_job(
        conn: &Connection,
        id: &str,
        job_id: &str,
        status: JobStatus,
        token_delta: i64,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE sessions
             SET is_working = 0, current_job_id = NULL, last_job_status = ?3,
                 token_count = token_count + ?4, updated_at = ?5
             WHERE id = ?1 AND current_job_id = ?2",
            params![id, job_id, status.as_str(), token_delta, now],
        )?;
        Ok(updated == 1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
