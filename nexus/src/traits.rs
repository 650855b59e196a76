//! Collaborator traits with mockall annotations for testing
//!
//! Every external system the run harness talks to sits behind one of these
//! traits. The real implementations live in `services`; tests swap in the
//! generated mocks.

use shared::{AlgorithmRunResult, DataPath, JobSocket, RequestResult};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::data::{AlgorithmData, DataTable};
use crate::core::serialization::SerializationFormat;
use crate::error::NexusResult;

/// Job-control API that schedules runs and receives their results
#[mockall::automock]
#[async_trait::async_trait]
pub trait JobControlApi: Send + Sync {
    /// Report the outcome of run `run_id` of `algorithm`.
    ///
    /// With `debug` set the submission is logged and nothing is sent.
    async fn submit_result(
        &self,
        run_id: &str,
        algorithm: &str,
        result: AlgorithmRunResult,
        debug: bool,
    ) -> NexusResult<()>;

    /// Schedule a new run and return the request id assigned to it
    async fn create_run(
        &self,
        algorithm: &str,
        payload: BTreeMap<String, serde_json::Value>,
        tag: Option<String>,
    ) -> NexusResult<String>;

    async fn retrieve_run(&self, run_id: &str, algorithm: &str) -> NexusResult<RequestResult>;
}

/// Blob storage for results and telemetry
#[mockall::automock]
#[async_trait::async_trait]
pub trait StorageClient: Send + Sync {
    /// Serialize `data` with `format` and write it to `path`.
    ///
    /// Without `overwrite` an existing blob is an error.
    async fn save_blob(
        &self,
        data: &AlgorithmData,
        path: &DataPath,
        format: SerializationFormat,
        overwrite: bool,
    ) -> NexusResult<()>;

    /// URI under which the blob at `path` can be read by the job runtime
    async fn get_blob_uri(&self, path: &DataPath) -> NexusResult<String>;
}

/// Source of the run payload
#[mockall::automock]
#[async_trait::async_trait]
pub trait PayloadReader: Send + Sync {
    async fn fetch(&self, uri: &str) -> NexusResult<serde_json::Value>;
}

/// Store that answers table reads for input readers
#[mockall::automock]
#[async_trait::async_trait]
pub trait QueryStore: Send + Sync {
    async fn read_table(&self, socket: &JobSocket) -> NexusResult<DataTable>;

    /// Release connections; called once at teardown
    async fn close(&self) -> NexusResult<()>;
}

/// Sink for run-time measurements
#[mockall::automock]
pub trait MetricsProvider: Send + Sync {
    fn timing(&self, metric: &str, elapsed: Duration, tag: &str);

    fn count(&self, metric: &str, value: u64, tag: &str);
}
