//! Nexus error types and failure classification
//!
//! Every error is either fatal (the run failed and the failure is reported to
//! the job runtime) or transient (the process exits with a retry code and the
//! runtime reschedules it). Collaborator failures are classified by
//! [`classify`]; everything else carries its kind in the variant.

use shared::SharedError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// How a failed run must be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Fatal,
    Transient,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Fatal => write!(f, "FatalNexusError"),
            FailureKind::Transient => write!(f, "TransientNexusError"),
        }
    }
}

/// Failures raised by external collaborators (storage, job control, query store)
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Authentication rejected: {message}")]
    Authentication { message: String },

    #[error("Upstream unavailable: {message}")]
    Unavailable { message: String },

    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Storage protocol error: {message}")]
    Protocol { message: String },

    #[error("Schema mismatch: {message}")]
    SchemaMismatch { message: String },

    #[error("Commit failed: {message}")]
    CommitFailed { message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Other { message: String },
}

impl CollaboratorError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Map a non-success HTTP response status into an error
    pub fn from_status(status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match status.as_u16() {
            401 | 403 => Self::Authentication { message },
            code => Self::HttpStatus { status: code, message },
        }
    }
}

/// Classify a collaborator failure; anything not known to be retryable is fatal.
pub fn classify(error: &CollaboratorError) -> FailureKind {
    match error {
        CollaboratorError::HttpStatus { status, .. } => match status {
            408 | 429 => FailureKind::Transient,
            500..=599 => FailureKind::Transient,
            _ => FailureKind::Fatal,
        },
        CollaboratorError::Http(e) => {
            if e.is_timeout() || e.is_connect() {
                FailureKind::Transient
            } else if let Some(status) = e.status() {
                classify(&CollaboratorError::HttpStatus {
                    status: status.as_u16(),
                    message: String::new(),
                })
            } else {
                FailureKind::Fatal
            }
        }
        CollaboratorError::Io(e) => match e.kind() {
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::TimedOut => FailureKind::Transient,
            _ => FailureKind::Fatal,
        },
        CollaboratorError::Unavailable { .. }
        | CollaboratorError::TableNotFound { .. }
        | CollaboratorError::Protocol { .. }
        | CollaboratorError::SchemaMismatch { .. }
        | CollaboratorError::CommitFailed { .. } => FailureKind::Transient,
        CollaboratorError::Authentication { .. }
        | CollaboratorError::Json(_)
        | CollaboratorError::Other { .. } => FailureKind::Fatal,
    }
}

#[derive(Error, Debug)]
pub enum NexusError {
    #[error("Input '{alias}' failed to resolve")]
    FatalInput {
        alias: String,
        #[source]
        source: Arc<NexusError>,
    },

    #[error("Input '{alias}' failed to resolve and may succeed on retry")]
    TransientInput {
        alias: String,
        #[source]
        source: Arc<NexusError>,
    },

    #[error("Required configuration entry {entry} is not set")]
    StartupConfiguration { entry: String },

    #[error("Failed to start {service}: {message}")]
    ServiceStartup { service: String, message: String },

    #[error("Alias '{alias}' is registered more than once")]
    DuplicateAlias { alias: String },

    #[error("Input key '{key}' is produced by both '{first}' and '{second}'")]
    AmbiguousInput {
        key: String,
        first: String,
        second: String,
    },

    #[error("Algorithm '{algorithm}' did not finish within {limit} iterations")]
    IterationLimit { algorithm: String, limit: usize },

    #[error("No {registry} registered under '{key}'")]
    UnknownRegistration { registry: String, key: String },

    #[error("No value of type {type_name} was injected")]
    MissingInjection { type_name: &'static str },

    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    #[error("{message}")]
    Fatal { message: String },

    #[error("{message}")]
    Transient { message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Result submission failed")]
    Submission(#[source] Box<NexusError>),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),
}

impl NexusError {
    /// Error a body raises for a failure that must not be retried
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Error a body raises for a failure that may succeed on a later attempt
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn config(entry: impl Into<String>) -> Self {
        Self::StartupConfiguration { entry: entry.into() }
    }

    /// Wrap an input failure with the alias of the object that raised it, keeping its kind
    pub fn for_input(alias: impl Into<String>, source: Arc<NexusError>) -> Self {
        let alias = alias.into();
        match source.kind() {
            FailureKind::Transient => Self::TransientInput { alias, source },
            FailureKind::Fatal => Self::FatalInput { alias, source },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            NexusError::TransientInput { .. } | NexusError::Transient { .. } | NexusError::Cancelled => {
                FailureKind::Transient
            }
            NexusError::Collaborator(e) => classify(e),
            _ => FailureKind::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    /// Message submitted to the job runtime for a fatal failure
    pub fn failure_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }

    /// Full chain of messages from this error down to its root cause
    pub fn chain(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut current: Option<&dyn std::error::Error> = std::error::Error::source(self);
        while let Some(source) = current {
            lines.push(format!("caused by: {source}"));
            current = source.source();
        }
        lines.join("\n")
    }
}

pub type NexusResult<T> = Result<T, NexusError>;
