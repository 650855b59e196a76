//! User-defined telemetry computed from the run result

use async_trait::async_trait;

use crate::core::data::{AlgorithmData, AlgorithmResult, RunInputs};
use crate::error::NexusResult;

pub const USER_TELEMETRY_METRIC: &str = "user_telemetry_recording";

/// Recorder attached with `Nexus::on_complete`.
///
/// Payload and configuration are taken from the run context when the
/// recorder is built.
#[async_trait]
pub trait UserTelemetryRecorder: Send + Sync {
    /// Name used in the storage path and as the metric tag
    fn alias(&self) -> &str;

    async fn compute(&self, result: &AlgorithmResult, run_id: &str, inputs: &RunInputs) -> NexusResult<AlgorithmData>;
}
