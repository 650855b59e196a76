//! Test helpers and builder patterns for run harness tests

use async_trait::async_trait;
use nexus::core::RetryPolicy;
use nexus::services::NullMetricsProvider;
use nexus::traits::{MockJobControlApi, MockPayloadReader, MockQueryStore, MockStorageClient};
use nexus::{AlgorithmBody, AlgorithmResult, Nexus, NexusConfig, NexusResult, NexusServices, RunInputs};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::fixtures::TestFixtures;

/// Builds a `Nexus` over mocked collaborators.
///
/// Mocks that are not configured explicitly accept any call: storage records
/// every saved path, submissions succeed and the query store serves the
/// orders fixture for every socket.
pub struct NexusBuilder {
    config: NexusConfig,
    job_control: Option<MockJobControlApi>,
    storage: Option<MockStorageClient>,
    payload_reader: Option<MockPayloadReader>,
    query_store: Option<MockQueryStore>,
    cancellation: CancellationToken,
    saved: Arc<Mutex<Vec<String>>>,
}

impl NexusBuilder {
    pub fn new() -> Self {
        Self {
            config: TestFixtures::config(),
            job_control: None,
            storage: None,
            payload_reader: None,
            query_store: None,
            cancellation: CancellationToken::new(),
            saved: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_config(mut self, config: NexusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_job_control<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockJobControlApi),
    {
        let mut mock = MockJobControlApi::new();
        setup(&mut mock);
        self.job_control = Some(mock);
        self
    }

    pub fn with_storage<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockStorageClient),
    {
        let mut mock = MockStorageClient::new();
        setup(&mut mock);
        self.storage = Some(mock);
        self
    }

    pub fn with_payload_reader<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockPayloadReader),
    {
        let mut mock = MockPayloadReader::new();
        setup(&mut mock);
        self.payload_reader = Some(mock);
        self
    }

    pub fn with_query_store<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockQueryStore),
    {
        let mut mock = MockQueryStore::new();
        setup(&mut mock);
        self.query_store = Some(mock);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Paths saved through the default storage mock
    pub fn saved_paths(&self) -> Arc<Mutex<Vec<String>>> {
        self.saved.clone()
    }

    pub fn config(&self) -> &NexusConfig {
        &self.config
    }

    pub fn services(&mut self) -> NexusServices {
        let job_control = self.job_control.take().unwrap_or_else(|| {
            let mut mock = MockJobControlApi::new();
            mock.expect_submit_result().returning(|_, _, _, _| Ok(())).times(0..);
            mock.expect_create_run()
                .returning(|_, _, _| Ok("remote-1".to_string()))
                .times(0..);
            mock
        });

        let saved = self.saved.clone();
        let storage = self.storage.take().unwrap_or_else(move || {
            let mut mock = MockStorageClient::new();
            mock.expect_save_blob()
                .returning(move |_, path, _, _| {
                    saved.lock().unwrap().push(path.path.clone());
                    Ok(())
                })
                .times(0..);
            mock.expect_get_blob_uri()
                .returning(|path| Ok(path.to_uri()))
                .times(0..);
            mock
        });

        let payload_reader = self.payload_reader.take().unwrap_or_else(|| {
            let mut mock = MockPayloadReader::new();
            mock.expect_fetch().returning(|_| Ok(json!({}))).times(0..);
            mock
        });

        let query_store = self.query_store.take().unwrap_or_else(|| {
            let mut mock = MockQueryStore::new();
            mock.expect_read_table()
                .returning(|_| Ok(TestFixtures::orders_table()))
                .times(0..);
            mock.expect_close().returning(|| Ok(())).times(0..);
            mock
        });

        NexusServices {
            job_control: Arc::new(job_control),
            storage: Arc::new(storage),
            payload_reader: Arc::new(payload_reader),
            query_store: Arc::new(query_store),
            metrics: Arc::new(NullMetricsProvider),
        }
    }

    pub fn build(mut self) -> Nexus {
        let services = self.services();
        Nexus::new(TestFixtures::run_arguments(), self.config.clone())
            .with_services(services)
            .with_cancellation(self.cancellation.clone())
            .with_retry_policy(RetryPolicy::immediate(Duration::from_millis(50)))
            .with_lookup(|_| None)
    }
}

impl Default for NexusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Algorithm body that answers with a fixed outcome
pub struct FixedBody(pub fn() -> NexusResult<AlgorithmResult>);

#[async_trait]
impl AlgorithmBody for FixedBody {
    async fn run(&self, _inputs: RunInputs) -> NexusResult<AlgorithmResult> {
        (self.0)()
    }
}

pub struct TestHelpers;

impl TestHelpers {
    pub fn document(value: serde_json::Value) -> AlgorithmResult {
        nexus::AlgorithmData::Document(value)
    }
}
