//! Abstract collaborator contracts: the job runner and the event sink.
//!
//! The runner owns CLI invocation mechanics (spawning the external tool,
//! parsing its protocol) and is expected to emit a typed event stream
//! terminating in exactly one `complete` or `error` event. The queue
//! worker enforces that contract and synthesizes a failure when it is
//! violated.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use relay_core::events::JobEvent;
use relay_core::ids::JobId;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::job::Job;

/// Error codes attached to failures the queue itself synthesizes.
pub mod codes {
    /// The job was cancelled before or during execution.
    pub const CANCELLED: &str = "CANCELLED";
    /// The runner failed before producing a stream.
    pub const RUNNER_START: &str = "RUNNER_START";
    /// The runner's stream ended without a terminal event.
    pub const RUNNER_PROTOCOL: &str = "RUNNER_PROTOCOL";
}

/// Boxed stream of job events produced by a runner.
pub type JobEventStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

/// Error starting a job run.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RunnerError {
    /// Human-readable description.
    pub message: String,
    /// Machine-readable code, when one applies.
    pub code: Option<String>,
}

impl RunnerError {
    /// Build a runner error.
    #[must_use]
    pub fn new(message: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            message: message.into(),
            code: code.map(str::to_owned),
        }
    }
}

/// Executes one job against the external tool.
///
/// Cancellation is cooperative: the runner observes `cancel` at its own
/// checkpoints and ends the stream with a terminal event when it does.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Start the job and return its event stream.
    async fn run(&self, job: &Job, cancel: CancellationToken) -> Result<JobEventStream, RunnerError>;
}

/// Receives every event a worker forwards from a runner.
///
/// Implemented by the event streamer (fan-out + replay); `finish` is called
/// once after the terminal event has been published.
pub trait JobEventSink: Send + Sync {
    /// Publish one event for a job.
    fn publish(&self, job_id: &JobId, event: JobEvent);
    /// The job's stream is complete; no more events will be published.
    fn finish(&self, job_id: &JobId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_error_display() {
        let err = RunnerError::new("spawn failed", Some(codes::RUNNER_START));
        assert_eq!(err.to_string(), "spawn failed");
        assert_eq!(err.code.as_deref(), Some("RUNNER_START"));
    }

    #[test]
    fn runner_error_without_code() {
        let err = RunnerError::new("bad", None);
        assert!(err.code.is_none());
    }
}
