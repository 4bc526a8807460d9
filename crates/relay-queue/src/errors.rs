//! Queue error types.

use thiserror::Error;

/// Errors returned by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The broker rejected the job (unavailable, channel closed).
    /// The caller must roll back any session state transition it made.
    #[error("enqueue failed: {0}")]
    EnqueueFailed(String),

    /// The queue is draining and accepts no new work.
    #[error("queue is shutting down")]
    ShuttingDown,
}

impl QueueError {
    /// Machine-readable code for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EnqueueFailed(_) => "ENQUEUE_FAILED",
            Self::ShuttingDown => "QUEUE_SHUTTING_DOWN",
        }
    }
}
