//! # relay-core
//!
//! Shared types for the Relay session server: branded ID newtypes,
//! the closed provider set, the typed job-event model, and tracing
//! initialization.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod logging;
pub mod provider;

pub use events::{Completion, JobEvent, JobFailure};
pub use ids::{JobId, MessageId, PromptId, SessionId};
pub use provider::Provider;
