//! Stateless repositories — every method takes `&Connection`.

pub mod file_access;
pub mod message;
pub mod session;

pub use file_access::{FileAccessRepo, NewFileAccess};
pub use message::{ListMessagesOptions, MessageRepo, NewMessage};
pub use session::{ListSessionsOptions, NewSession, SessionRepo};
