//! Fork target that schedules a new run through the job-control API

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{process_info, ProcessId, RunArguments};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{Algorithm, AlgorithmState, ALGORITHM_RUN_METRIC};
use crate::core::data::{AlgorithmData, AlgorithmResult, RunInputs};
use crate::error::NexusResult;
use crate::services::metrics::timed;
use crate::traits::{JobControlApi, MetricsProvider};

pub struct RemoteAlgorithm {
    alias: String,
    algorithm_name: String,
    payload: BTreeMap<String, Value>,
    job_control: Arc<dyn JobControlApi>,
    metrics: Arc<dyn MetricsProvider>,
    state: Mutex<AlgorithmState>,
}

impl RemoteAlgorithm {
    pub fn new(
        alias: impl Into<String>,
        algorithm_name: impl Into<String>,
        payload: BTreeMap<String, Value>,
        job_control: Arc<dyn JobControlApi>,
        metrics: Arc<dyn MetricsProvider>,
    ) -> Self {
        Self {
            alias: alias.into(),
            algorithm_name: algorithm_name.into(),
            payload,
            job_control,
            metrics,
            state: Mutex::new(AlgorithmState::Constructed),
        }
    }

    pub fn state(&self) -> AlgorithmState {
        *super::lock(&self.state)
    }

    fn set_state(&self, state: AlgorithmState) {
        *super::lock(&self.state) = state;
    }
}

#[async_trait]
impl Algorithm for RemoteAlgorithm {
    fn alias(&self) -> &str {
        &self.alias
    }

    async fn context_open(&self) -> NexusResult<()> {
        self.set_state(AlgorithmState::ContextOpened);
        Ok(())
    }

    /// Result is a document `{"requestId", "tag"}` naming the scheduled run
    async fn run(&self, _args: &RunArguments) -> NexusResult<AlgorithmResult> {
        self.set_state(AlgorithmState::Running);
        let tag = format!("{}-{}", self.alias, Uuid::new_v4());

        let request_id = timed(
            self.metrics.as_ref(),
            ALGORITHM_RUN_METRIC,
            &self.alias,
            self.job_control
                .create_run(&self.algorithm_name, self.payload.clone(), Some(tag.clone())),
        )
        .await?;

        process_info!(
            ProcessId::current(),
            "Remote run {} of {} scheduled as {}",
            tag,
            self.algorithm_name,
            request_id
        );
        Ok(AlgorithmData::Document(json!({"requestId": request_id, "tag": tag})))
    }

    async fn context_close(&self) -> NexusResult<()> {
        self.set_state(AlgorithmState::ContextClosed);
        Ok(())
    }

    fn inputs(&self) -> RunInputs {
        RunInputs::new()
    }
}
