//! Saves every algorithm input and user telemetry next to the run

use futures_util::future::join_all;
use shared::{logging::log_degraded, process_debug, process_info, DataPath, ProcessId};
use std::sync::Arc;
use std::time::Duration;

use super::user::{UserTelemetryRecorder, USER_TELEMETRY_METRIC};
use crate::core::data::{AlgorithmData, AlgorithmResult, RunInputs};
use crate::core::serialization::Serializer;
use crate::error::{NexusError, NexusResult};
use crate::services::metrics::timed;
use crate::traits::{MetricsProvider, StorageClient};

pub const DEFAULT_TELEMETRY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TelemetryRecorder {
    storage: Arc<dyn StorageClient>,
    serializer: Serializer,
    metrics: Arc<dyn MetricsProvider>,
    base_path: DataPath,
    timeout: Duration,
}

impl TelemetryRecorder {
    pub fn new(
        storage: Arc<dyn StorageClient>,
        serializer: Serializer,
        metrics: Arc<dyn MetricsProvider>,
        base_path: DataPath,
    ) -> Self {
        Self {
            storage,
            serializer,
            metrics,
            base_path,
            timeout: DEFAULT_TELEMETRY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `{telemetry}/{entity}/{run_id}`
    pub fn input_path(&self, entity: &str, run_id: &str) -> DataPath {
        self.base_path.join(entity).join(run_id)
    }

    /// `{telemetry}/telemetry_group=user/recorder_class={alias}/request_id={run_id}`
    pub fn user_path(&self, alias: &str, run_id: &str) -> DataPath {
        self.base_path
            .join("telemetry_group=user")
            .join(&format!("recorder_class={alias}"))
            .join(&format!("request_id={run_id}"))
    }

    /// Save every input concurrently; returns how many were recorded
    pub async fn record(&self, run_id: &str, inputs: &RunInputs) -> usize {
        if inputs.is_empty() {
            process_info!(ProcessId::current(), "No inputs to record for run {}", run_id);
            return 0;
        }

        let tasks = inputs.iter().map(|(entity, data)| async move {
            process_debug!(ProcessId::current(), "Recording telemetry for {} in run {}", entity, run_id);
            let path = self.input_path(entity, run_id);
            let outcome = self.bounded(self.save(data, &path)).await;
            (entity, outcome)
        });

        let mut recorded = 0;
        for (entity, outcome) in join_all(tasks).await {
            match outcome {
                Ok(()) => recorded += 1,
                Err(e) => log_degraded(
                    ProcessId::current(),
                    &format!("recording {entity} for run {run_id}, this run lacks observability coverage"),
                    &e,
                ),
            }
        }
        recorded
    }

    /// Compute and save the output of each user recorder concurrently
    pub async fn record_user_telemetry(
        &self,
        recorders: &[Arc<dyn UserTelemetryRecorder>],
        result: &AlgorithmResult,
        run_id: &str,
        inputs: &RunInputs,
    ) -> usize {
        if recorders.is_empty() {
            process_info!(ProcessId::current(), "No post processing tasks were defined for this run");
            return 0;
        }

        let tasks = recorders.iter().map(|recorder| async move {
            let outcome = self
                .bounded(async {
                    let telemetry = timed(
                        self.metrics.as_ref(),
                        USER_TELEMETRY_METRIC,
                        recorder.alias(),
                        recorder.compute(result, run_id, inputs),
                    )
                    .await?;
                    self.save(&telemetry, &self.user_path(recorder.alias(), run_id)).await
                })
                .await;
            (recorder.alias(), outcome)
        });

        let mut recorded = 0;
        for (alias, outcome) in join_all(tasks).await {
            match outcome {
                Ok(()) => recorded += 1,
                Err(e) => log_degraded(ProcessId::current(), &format!("user recorder {alias}"), &e),
            }
        }
        recorded
    }

    async fn save(&self, data: &AlgorithmData, path: &DataPath) -> NexusResult<()> {
        let format = self.serializer.format_for(data);
        self.storage.save_blob(data, path, format, true).await
    }

    async fn bounded<F>(&self, operation: F) -> NexusResult<()>
    where
        F: std::future::Future<Output = NexusResult<()>>,
    {
        tokio::time::timeout(self.timeout, operation)
            .await
            .unwrap_or_else(|_| Err(NexusError::transient(format!("timed out after {:?}", self.timeout))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::DataTable;
    use crate::services::metrics::NullMetricsProvider;
    use crate::traits::MockStorageClient;
    use serde_json::json;

    fn recorder(storage: MockStorageClient) -> TelemetryRecorder {
        TelemetryRecorder::new(
            Arc::new(storage),
            Serializer::default(),
            Arc::new(NullMetricsProvider),
            DataPath::parse("file:///telemetry").unwrap(),
        )
    }

    fn inputs() -> RunInputs {
        RunInputs::from([
            ("orders".to_string(), DataTable::new(vec!["sku".into()]).into()),
            ("settings".to_string(), AlgorithmData::Document(json!({"mode": "fast"}))),
        ])
    }

    #[tokio::test]
    async fn test_records_each_input_under_entity_and_run() {
        let mut storage = MockStorageClient::new();
        storage
            .expect_save_blob()
            .withf(|_, path, _, overwrite| {
                *overwrite
                    && (path.path == "/telemetry/orders/run-1" || path.path == "/telemetry/settings/run-1")
            })
            .times(2)
            .returning(|_, _, _, _| Ok(()));

        assert_eq!(recorder(storage).record("run-1", &inputs()).await, 2);
    }

    #[tokio::test]
    async fn test_failures_are_only_logged() {
        let mut storage = MockStorageClient::new();
        storage
            .expect_save_blob()
            .returning(|_, path, _, _| {
                if path.path.contains("orders") {
                    Err(NexusError::fatal("disk full"))
                } else {
                    Ok(())
                }
            });

        assert_eq!(recorder(storage).record("run-1", &inputs()).await, 1);
    }

    struct InputCount;

    #[async_trait::async_trait]
    impl UserTelemetryRecorder for InputCount {
        fn alias(&self) -> &str {
            "input_count"
        }

        async fn compute(&self, _result: &AlgorithmResult, run_id: &str, inputs: &RunInputs) -> NexusResult<AlgorithmData> {
            Ok(AlgorithmData::Document(json!({"run": run_id, "inputs": inputs.len()})))
        }
    }

    #[tokio::test]
    async fn test_user_telemetry_is_saved_per_recorder() {
        let mut storage = MockStorageClient::new();
        storage
            .expect_save_blob()
            .withf(|data, path, _, _| {
                path.path == "/telemetry/telemetry_group=user/recorder_class=input_count/request_id=run-1"
                    && data.as_document() == Some(&json!({"run": "run-1", "inputs": 2}))
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let recorders: Vec<Arc<dyn UserTelemetryRecorder>> = vec![Arc::new(InputCount)];
        let result = AlgorithmData::Document(json!({"score": 1}));

        let recorded = recorder(storage)
            .record_user_telemetry(&recorders, &result, "run-1", &inputs())
            .await;

        assert_eq!(recorded, 1);
    }

    #[test]
    fn test_user_path_layout() {
        let recorder = recorder(MockStorageClient::new());
        assert_eq!(
            recorder.user_path("order_stats", "run-1").to_uri(),
            "file:///telemetry/telemetry_group=user/recorder_class=order_stats/request_id=run-1"
        );
    }
}
