//! Run configuration read from the environment
//!
//! `.env` is loaded first through dotenv, then every `NEXUS__*` entry is read
//! through a lookup function so tests can supply their own map.

use shared::{DataPath, JobSocket};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::core::serialization::Serializer;
use crate::error::{NexusError, NexusResult};
use crate::telemetry::DEFAULT_TELEMETRY_TIMEOUT;

pub const ALGORITHM_OUTPUT_PATH: &str = "NEXUS__ALGORITHM_OUTPUT_PATH";
pub const TELEMETRY_PATH: &str = "NEXUS__TELEMETRY_PATH";
pub const STORAGE_CLIENT_CLASS: &str = "NEXUS__STORAGE_CLIENT_CLASS";
pub const STORAGE_ACCESS_TOKEN: &str = "NEXUS__STORAGE_ACCESS_TOKEN";
pub const ALGORITHM_CLASS: &str = "NEXUS__ALGORITHM_CLASS";
pub const ALGORITHM_NAME: &str = "CRYSTAL__ALGORITHM_NAME";
pub const LOG_LEVEL: &str = "NEXUS__LOG_LEVEL";
pub const LOG_ENDPOINT: &str = "NEXUS__LOG_ENDPOINT";
pub const METRICS_PROVIDER: &str = "NEXUS__METRICS_PROVIDER";
pub const QES_CONNECTION_STRING: &str = "NEXUS__QES_CONNECTION_STRING";
pub const EXTERNAL_DATA_SOCKETS: &str = "NEXUS__ALGORITHM_INPUT_EXTERNAL_DATA_SOCKETS";
pub const RESULT_SERIALIZATION_FORMAT: &str = "NEXUS__RESULT_SERIALIZATION_FORMAT";
pub const TELEMETRY_SERIALIZATION_FORMAT: &str = "NEXUS__TELEMETRY_SERIALIZATION_FORMAT";
pub const TELEMETRY_TIMEOUT_SECONDS: &str = "NEXUS__TELEMETRY_TIMEOUT_SECONDS";
pub const FORK_DRAIN_TIMEOUT_SECONDS: &str = "NEXUS__FORK_DRAIN_TIMEOUT_SECONDS";
pub const IS_LOCAL_RUN: &str = "IS_LOCAL_RUN";

pub const DEFAULT_FORK_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct NexusConfig {
    pub algorithm_output_path: DataPath,
    pub telemetry_path: DataPath,
    pub storage_client_class: String,
    pub storage_access_token: Option<String>,
    /// Only required by the binary, library users pick their algorithm in code
    pub algorithm_class: Option<String>,
    pub algorithm_name: String,
    pub log_level: String,
    pub log_endpoint: Option<String>,
    pub metrics_provider: String,
    pub qes_connection_string: Option<String>,
    pub external_sockets: Vec<JobSocket>,
    pub result_serializer: Serializer,
    pub telemetry_serializer: Serializer,
    pub telemetry_timeout: Duration,
    pub fork_drain_timeout: Duration,
    /// Submissions are logged instead of sent
    pub debug: bool,
}

impl NexusConfig {
    /// Load `.env`, then read the process environment
    pub fn from_env() -> NexusResult<Self> {
        // a missing .env file is fine
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> NexusResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| optional(key).ok_or_else(|| NexusError::config(key));
        let seconds = |key: &str, default: Duration| -> NexusResult<Duration> {
            match optional(key) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| NexusError::fatal(format!("{key} must be a number of seconds, got '{raw}'"))),
                None => Ok(default),
            }
        };

        let external_sockets = match optional(EXTERNAL_DATA_SOCKETS) {
            Some(raw) => JobSocket::deserialize_list(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            algorithm_output_path: DataPath::parse(&required(ALGORITHM_OUTPUT_PATH)?)?,
            telemetry_path: DataPath::parse(&required(TELEMETRY_PATH)?)?,
            storage_client_class: required(STORAGE_CLIENT_CLASS)?.to_ascii_lowercase(),
            storage_access_token: optional(STORAGE_ACCESS_TOKEN),
            algorithm_class: optional(ALGORITHM_CLASS),
            algorithm_name: required(ALGORITHM_NAME)?,
            log_level: optional(LOG_LEVEL).unwrap_or_else(|| "info".to_string()),
            log_endpoint: optional(LOG_ENDPOINT),
            metrics_provider: optional(METRICS_PROVIDER)
                .unwrap_or_else(|| "tracing".to_string())
                .to_ascii_lowercase(),
            qes_connection_string: optional(QES_CONNECTION_STRING),
            external_sockets,
            result_serializer: Serializer::from_lookup(RESULT_SERIALIZATION_FORMAT, &lookup)?,
            telemetry_serializer: Serializer::from_lookup(TELEMETRY_SERIALIZATION_FORMAT, &lookup)?,
            telemetry_timeout: seconds(TELEMETRY_TIMEOUT_SECONDS, DEFAULT_TELEMETRY_TIMEOUT)?,
            fork_drain_timeout: seconds(FORK_DRAIN_TIMEOUT_SECONDS, DEFAULT_FORK_DRAIN_TIMEOUT)?,
            debug: optional(IS_LOCAL_RUN).as_deref() == Some("1"),
        })
    }
}

/// Named factories, looked up by a configuration value
pub struct Registry<T> {
    name: &'static str,
    entries: BTreeMap<String, T>,
}

impl<T> Registry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: BTreeMap::new(),
        }
    }

    pub fn register(mut self, key: impl Into<String>, entry: T) -> Self {
        self.entries.insert(key.into().to_ascii_lowercase(), entry);
        self
    }

    pub fn get(&self, key: &str) -> NexusResult<&T> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .ok_or_else(|| NexusError::UnknownRegistration {
                registry: self.name.to_string(),
                key: key.to_string(),
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
