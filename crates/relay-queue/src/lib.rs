//! # relay-queue
//!
//! The job queue abstraction consumed by the orchestrator, plus the
//! in-process worker-pool implementation.
//!
//! Jobs are immutable once enqueued and end in exactly one terminal
//! outcome. Workers invoke the abstract [`JobRunner`], forward its typed
//! event stream to a [`JobEventSink`], and report terminal outcomes on a
//! channel consumed by the orchestration layer.

#![deny(unsafe_code)]

pub mod errors;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod runner;
pub mod worker;

pub use errors::QueueError;
pub use job::{Job, JobOutcome};
pub use metrics::QueueMetrics;
pub use queue::{JobQueue, TerminalEvent};
pub use runner::{JobEventSink, JobEventStream, JobRunner, RunnerError, codes};
pub use worker::{InProcessQueue, QueueConfig};
