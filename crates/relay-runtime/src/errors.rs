//! Runtime error types.

use relay_store::StoreError;

/// Errors that can occur during job orchestration.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Admission conflict: the session already has an active job.
    #[error("session busy: {0}")]
    SessionBusy(String),

    /// The queue rejected the job; the session state was rolled back.
    #[error("enqueue failed: {0}")]
    EnqueueFailed(String),

    /// Session store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Internal / unexpected error (corrupt row, misconfiguration).
    #[error("internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Whether the caller can meaningfully retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SessionBusy(_) | Self::EnqueueFailed(_) => true,
            Self::SessionNotFound(_) | Self::Store(_) | Self::Internal(_) => false,
        }
    }

    /// Error category string for logs and wire responses.
    pub fn category(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionBusy(_) => "session_busy",
            Self::EnqueueFailed(_) => "enqueue_failed",
            Self::Store(_) => "store",
            Self::Internal(_) => "internal",
        }
    }
}
