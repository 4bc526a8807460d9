//! Job record and terminal outcomes.

use relay_core::events::{Completion, JobFailure};
use relay_core::ids::{JobId, MessageId, PromptId, SessionId};
use relay_core::provider::Provider;
use serde::{Deserialize, Serialize};

/// One unit of work: a prompt admitted for execution against the external
/// tool. Immutable once enqueued.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Job identifier (assigned at admission).
    pub id: JobId,
    /// CLI backend to execute against.
    pub provider: Provider,
    /// Session this job belongs to.
    pub session_id: SessionId,
    /// Prompt identifier.
    pub prompt_id: PromptId,
    /// Prompt text.
    pub prompt: String,
    /// Tools the runner may use, when restricted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    /// Project directory the job operates in.
    pub project_path: String,
    /// The user-turn message that originated this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Model override, when the client requested one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Terminal outcome of a job. Exactly one per job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The runner finished successfully.
    Completed(Completion),
    /// The runner failed (or violated its stream contract).
    Failed(JobFailure),
}

impl JobOutcome {
    /// Whether the job completed successfully.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
