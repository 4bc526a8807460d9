//! Row structs and stored enum types.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// A session row: one conversational workspace bound to a project path and
/// provider, with its working-state machine and running counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    /// Session identifier (`sess_` prefix).
    pub id: String,
    /// Provider name (one of the closed set).
    pub provider: String,
    /// Project directory this session operates in.
    pub project_path: String,
    /// Free-form context supplied by the client.
    pub context: Option<String>,
    /// Provider-specific home directory, when overridden.
    pub provider_home: Option<String>,
    /// Arbitrary metadata (JSON object text).
    pub metadata: String,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Last mutation timestamp.
    pub updated_at: String,
    /// Last client access timestamp.
    pub last_accessed_at: String,
    /// Whether a job is currently executing. True iff `current_job_id` is
    /// set.
    pub is_working: bool,
    /// The active job, when working.
    pub current_job_id: Option<String>,
    /// Outcome of the most recent job.
    pub last_job_status: Option<String>,
    /// Running message count.
    pub message_count: i64,
    /// Running token count.
    pub token_count: i64,
}

impl SessionRow {
    /// Column list matching [`from_row`](Self::from_row).
    pub const COLUMNS: &'static str = "id, provider, project_path, context, provider_home, \
         metadata, created_at, updated_at, last_accessed_at, is_working, \
         current_job_id, last_job_status, message_count, token_count";

    /// Build from a row selected with [`Self::COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            provider: row.get(1)?,
            project_path: row.get(2)?,
            context: row.get(3)?,
            provider_home: row.get(4)?,
            metadata: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            last_accessed_at: row.get(8)?,
            is_working: row.get(9)?,
            current_job_id: row.get(10)?,
            last_job_status: row.get(11)?,
            message_count: row.get(12)?,
            token_count: row.get(13)?,
        })
    }
}

/// Message author role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Client-submitted prompt turn.
    User,
    /// Job outcome turn.
    Assistant,
}

impl MessageRole {
    /// Stable string form (matches the CHECK constraint).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(StoreError::InvalidData(format!("message role: {other}"))),
        }
    }
}

/// One append-only exchange turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    /// Message identifier (`msg_` prefix).
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Author role.
    pub role: MessageRole,
    /// Raw content payload.
    pub content: String,
    /// For assistant turns: the provider's own session/thread ID, so a
    /// later prompt can resume provider-side context.
    pub provider_session_id: Option<String>,
    /// Creation timestamp (RFC 3339). Ordering key.
    pub created_at: String,
}

impl MessageRow {
    /// Column list matching [`from_row`](Self::from_row).
    pub const COLUMNS: &'static str =
        "id, session_id, role, content, provider_session_id, created_at";

    /// Build from a row selected with [`Self::COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let role_str: String = row.get(2)?;
        let role = MessageRole::parse(&role_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(SimpleError(e.to_string())),
            )
        })?;
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role,
            content: row.get(3)?,
            provider_session_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

/// File access kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    /// File was read.
    Read,
    /// File was overwritten or modified.
    Write,
    /// File was created.
    Create,
    /// File was deleted.
    Delete,
}

impl AccessKind {
    /// Stable string form (matches the CHECK constraint).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "create" => Ok(Self::Create),
            "delete" => Ok(Self::Delete),
            other => Err(StoreError::InvalidData(format!("access kind: {other}"))),
        }
    }
}

/// Optional descriptive metadata for a file access.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAccessMetadata {
    /// File size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Text encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// One append-only file access audit entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAccessRow {
    /// Record identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Accessed path.
    pub path: String,
    /// Access kind.
    pub kind: AccessKind,
    /// Content snapshot (for writes), when captured.
    pub snapshot: Option<String>,
    /// Parsed metadata, when recorded.
    pub metadata: Option<FileAccessMetadata>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

impl FileAccessRow {
    /// Column list matching [`from_row`](Self::from_row).
    pub const COLUMNS: &'static str =
        "id, session_id, path, kind, snapshot, metadata, created_at";

    /// Build from a row selected with [`Self::COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let kind_str: String = row.get(3)?;
        let kind = AccessKind::parse(&kind_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(SimpleError(e.to_string())),
            )
        })?;
        let metadata_json: Option<String> = row.get(5)?;
        let metadata = metadata_json
            .as_deref()
            .map(serde_json::from_str::<FileAccessMetadata>)
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            path: row.get(2)?,
            kind,
            snapshot: row.get(4)?,
            metadata,
            created_at: row.get(6)?,
        })
    }
}

/// Terminal status recorded on the session after a job finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job finished successfully.
    Completed,
    /// Job failed.
    Failed,
    /// Job terminated after a cancellation request.
    Cancelled,
}

impl JobStatus {
    /// Stable string form (stored in `last_job_status`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Boxed-error helper for `FromSqlConversionFailure`.
#[derive(Debug)]
struct SimpleError(String);

impl std::fmt::Display for SimpleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SimpleError {}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
