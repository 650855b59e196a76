//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Identity used when nothing has called `init_*` yet (unit tests, library use)
static STANDALONE: ProcessId = ProcessId::Standalone;

/// Process identifier attached to every log event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// Nexus process hosting the run with this request id
    Nexus(String),
    /// Library code running outside a Nexus process
    Standalone,
}

impl ProcessId {
    /// Initialize the global process ID for a Nexus run
    pub fn init_nexus(request_id: &str) -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Nexus(request_id.to_string()))
    }

    /// Get the global process ID, `Standalone` if it was never initialized
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get().unwrap_or(&STANDALONE)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Nexus(request_id) => write!(f, "nexus[{request_id}]"),
            ProcessId::Standalone => write!(f, "standalone"),
        }
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        ProcessId::Standalone
    }
}

/// Arguments handed to a Nexus process by the job runtime
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArguments {
    /// URI of the run payload
    pub sas_uri: String,
    /// Identifier the job runtime assigned to this run
    pub request_id: String,
    /// Base URL of the job-control API that receives the result
    pub results_receiver: String,
    pub results_receiver_user: Option<String>,
    pub results_receiver_password: Option<String>,
    pub sign_result: bool,
}

impl RunArguments {
    pub fn new(sas_uri: impl Into<String>, request_id: impl Into<String>, results_receiver: impl Into<String>) -> Self {
        Self {
            sas_uri: sas_uri.into(),
            request_id: request_id.into(),
            results_receiver: results_receiver.into(),
            results_receiver_user: None,
            results_receiver_password: None,
            sign_result: false,
        }
    }

    /// Basic-auth credentials for the results receiver, if both halves were supplied
    pub fn receiver_credentials(&self) -> Option<(&str, &str)> {
        match (&self.results_receiver_user, &self.results_receiver_password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }
}
