//! Shared error types for the Nexus run harness

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Invalid job socket: {input}")]
    InvalidSocket { input: String },

    #[error("No socket with alias '{alias}'")]
    SocketNotFound { alias: String },

    #[error("Alias '{alias}' is used by {count} sockets")]
    AmbiguousSocket { alias: String, count: usize },

    #[error("Invalid data path: {input}")]
    InvalidDataPath { input: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
