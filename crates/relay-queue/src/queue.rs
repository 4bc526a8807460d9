//! The queue contract consumed by the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::ids::{JobId, SessionId};

use crate::errors::QueueError;
use crate::job::{Job, JobOutcome};
use crate::metrics::QueueMetrics;

/// Terminal callback payload reported by workers.
#[derive(Clone, Debug, PartialEq)]
pub struct TerminalEvent {
    /// The finished job.
    pub job_id: JobId,
    /// The session the job belonged to.
    pub session_id: SessionId,
    /// How it ended.
    pub outcome: JobOutcome,
}

/// A prioritized, metered work queue.
///
/// Implementations execute jobs on their own worker pool, decoupled from
/// the request-handling layer, and report terminal outcomes on a channel
/// handed out at construction.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for execution. Fails with
    /// [`QueueError::EnqueueFailed`] when the broker is unavailable — the
    /// caller must roll back its admission state.
    async fn enqueue(&self, job: Job) -> Result<JobId, QueueError>;

    /// Enqueue a job that becomes runnable after `delay`.
    async fn enqueue_delayed(&self, job: Job, delay: Duration) -> Result<JobId, QueueError>;

    /// Request cooperative cancellation of a job. Returns `false` when the
    /// job is unknown (already finished or never enqueued).
    fn cancel(&self, job_id: &JobId) -> bool;

    /// Stop pulling new jobs. Jobs already executing run to completion.
    fn pause(&self);

    /// Resume pulling jobs.
    fn resume(&self);

    /// Whether the queue is paused.
    fn is_paused(&self) -> bool;

    /// Point-in-time metrics snapshot.
    fn metrics(&self) -> QueueMetrics;
}
