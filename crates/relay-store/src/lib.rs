//! # relay-store
//!
//! The session state store: sessions with their working-state machine,
//! append-only messages, and append-only file-access records, persisted in
//! SQLite behind an r2d2 connection pool.
//!
//! The working-state transition is a single conditional `UPDATE` — the
//! compare-and-set that makes job admission race-free.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod row_types;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;
pub use row_types::{
    AccessKind, FileAccessMetadata, FileAccessRow, JobStatus, MessageRole, MessageRow, SessionRow,
};
pub use store::{
    ListMessagesOptions, ListSessionsOptions, NewFileAccess, NewMessage, NewSession, SessionStore,
    SqliteSessionStore,
};
