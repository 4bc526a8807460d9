//! Streamer error types.

use thiserror::Error;

/// Errors returned by subscribe/publish operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The job has no open stream (never admitted, or already closed
    /// after its grace period).
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// The requested resume point predates the retention window. The
    /// client must poll the session's persisted state instead.
    #[error("replay window expired for job {job_id}: oldest retained sequence is {oldest_retained}")]
    ReplayWindowExpired {
        /// The job whose window was missed.
        job_id: String,
        /// Oldest sequence number still retained.
        oldest_retained: u64,
    },
}

impl StreamError {
    /// Machine-readable code for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownJob(_) => "UNKNOWN_JOB",
            Self::ReplayWindowExpired { .. } => "REPLAY_WINDOW_EXPIRED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = StreamError::UnknownJob("job_1".into());
        assert_eq!(err.to_string(), "unknown job: job_1");

        let err = StreamError::ReplayWindowExpired {
            job_id: "job_1".into(),
            oldest_retained: 17,
        };
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn codes() {
        assert_eq!(StreamError::UnknownJob(String::new()).code(), "UNKNOWN_JOB");
        assert_eq!(
            StreamError::ReplayWindowExpired {
                job_id: String::new(),
                oldest_retained: 0
            }
            .code(),
            "REPLAY_WINDOW_EXPIRED"
        );
    }
}
