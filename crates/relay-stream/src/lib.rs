//! # relay-stream
//!
//! Delivers each job's event stream to every subscribed client in strict
//! sequence order, with a bounded replay window so a client that
//! reconnects mid-job resumes from the last event it acknowledged instead
//! of from the beginning.
//!
//! Outside the window the client is told to fall back to polling the
//! session's persisted state — the stream is a low-latency convenience
//! channel, never the source of truth.

#![deny(unsafe_code)]

pub mod connection;
pub mod envelope;
pub mod errors;
pub mod replay;
pub mod streamer;

pub use connection::Subscription;
pub use envelope::StreamEnvelope;
pub use errors::StreamError;
pub use streamer::{EventStreamer, StreamConfig};
