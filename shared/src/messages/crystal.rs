//! Crystal job-control API models
//!
//! Field names follow the API's camelCase JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle stage of a run as reported by the job runtime
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestLifeCycleStage {
    New,
    Buffered,
    Running,
    Completed,
    Failed,
    SchedulingTimeout,
    DeadlineExceeded,
    Throttled,
}

impl RequestLifeCycleStage {
    /// Whether the run can no longer change state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::SchedulingTimeout | Self::DeadlineExceeded
        )
    }
}

/// Status of an existing run
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestResult {
    #[serde(rename = "requestId")]
    pub run_id: String,
    pub status: RequestLifeCycleStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_error_message: Option<String>,
}

/// Outcome of an algorithm run submitted back to the job runtime.
///
/// A successful run carries `sas_uri`; a failed one carries `message` and `cause`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmRunResult {
    /// Not part of the v1.2 submission body; the run id travels in the URL
    #[serde(skip)]
    pub run_id: String,
    pub cause: Option<String>,
    pub message: Option<String>,
    pub sas_uri: Option<String>,
}

impl AlgorithmRunResult {
    pub fn success(run_id: impl Into<String>, sas_uri: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            sas_uri: Some(sas_uri.into()),
            ..Default::default()
        }
    }

    pub fn failure(run_id: impl Into<String>, message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            message: Some(message.into()),
            cause: Some(cause.into()),
            ..Default::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        self.sas_uri.is_none()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlgorithmConfigurationValueType {
    Plain,
    RelativeReference,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmConfigurationEntry {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<AlgorithmConfigurationValueType>,
}

/// Per-run overrides of the deployed algorithm configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<AlgorithmConfigurationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<AlgorithmConfigurationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workgroup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Body of a create-run call
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmRequest {
    pub algorithm_name: String,
    pub algorithm_parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_configuration: Option<AlgorithmConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunResponse {
    pub request_id: String,
}
