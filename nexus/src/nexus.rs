//! Run orchestrator
//!
//! [`Nexus`] collects factories for readers, processors, the algorithm and
//! user telemetry recorders, composes them into a [`NexusContext`] and drives
//! one run: execute, classify the outcome, submit it, record telemetry and
//! tear everything down.

use serde_json::Value;
use shared::logging::{log_degraded, log_error, log_shutdown, log_startup};
use shared::{
    process_debug, process_info, process_warn, AlgorithmRunResult, DataPath, JobSocket, ProcessId, RunArguments,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::algorithms::Algorithm;
use crate::config::{NexusConfig, Registry};
use crate::core::cache::InputCache;
use crate::core::data::{AlgorithmResult, RunInputs};
use crate::core::forks::ForkTracker;
use crate::core::injected::InjectedValues;
use crate::core::retry::RetryPolicy;
use crate::core::serialization::SerializationFormat;
use crate::error::{NexusError, NexusResult};
use crate::input::{AlgorithmPayload, InputObject, NexusConfiguration, ReaderContext};
use crate::services::{
    CrystalClient, FileQueryStore, HttpPayloadReader, HttpStorageClient, LocalStorageClient, NullMetricsProvider,
    TracingMetricsProvider,
};
use crate::telemetry::{TelemetryRecorder, UserTelemetryRecorder};
use crate::traits::{JobControlApi, MetricsProvider, PayloadReader, QueryStore, StorageClient};

/// Exit code asking the job runtime to retry the run
pub const RETRY_EXIT_CODE: i32 = 75;

/// Exit code when the outcome could not be submitted
pub const SUBMISSION_FAILURE_EXIT_CODE: i32 = 1;

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;
type InputFactory = Box<dyn FnOnce(&NexusContext) -> NexusResult<Arc<dyn InputObject>> + Send>;
type AlgorithmFactory = Box<dyn FnOnce(&NexusContext) -> NexusResult<Arc<dyn Algorithm>> + Send>;
type RecorderFactory = Box<dyn FnOnce(&NexusContext) -> NexusResult<Arc<dyn UserTelemetryRecorder>> + Send>;
type PayloadInjector = Box<dyn FnOnce(&Value, &mut InjectedValues) -> NexusResult<()> + Send>;
type ConfigurationInjector = Box<dyn FnOnce(&Lookup, &mut InjectedValues) -> NexusResult<()> + Send>;

/// Real or mocked collaborators of a run
#[derive(Clone)]
pub struct NexusServices {
    pub job_control: Arc<dyn JobControlApi>,
    pub storage: Arc<dyn StorageClient>,
    pub payload_reader: Arc<dyn PayloadReader>,
    pub query_store: Arc<dyn QueryStore>,
    pub metrics: Arc<dyn MetricsProvider>,
}

type StorageFactory = fn(&NexusConfig, reqwest::Client) -> Arc<dyn StorageClient>;
type MetricsFactory = fn() -> Arc<dyn MetricsProvider>;

fn local_storage(_config: &NexusConfig, _client: reqwest::Client) -> Arc<dyn StorageClient> {
    Arc::new(LocalStorageClient::new())
}

fn http_storage(config: &NexusConfig, client: reqwest::Client) -> Arc<dyn StorageClient> {
    Arc::new(HttpStorageClient::new(client, config.storage_access_token.clone()))
}

fn tracing_metrics() -> Arc<dyn MetricsProvider> {
    Arc::new(TracingMetricsProvider)
}

fn null_metrics() -> Arc<dyn MetricsProvider> {
    Arc::new(NullMetricsProvider)
}

impl NexusServices {
    /// `NEXUS__STORAGE_CLIENT_CLASS` values
    pub fn storage_registry() -> Registry<StorageFactory> {
        Registry::new("storage client")
            .register("local", local_storage as StorageFactory)
            .register("http", http_storage as StorageFactory)
    }

    /// `NEXUS__METRICS_PROVIDER` values
    pub fn metrics_registry() -> Registry<MetricsFactory> {
        Registry::new("metrics provider")
            .register("tracing", tracing_metrics as MetricsFactory)
            .register("null", null_metrics as MetricsFactory)
    }

    /// Production collaborators selected by configuration
    pub fn from_config(config: &NexusConfig, args: &RunArguments) -> NexusResult<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| NexusError::ServiceStartup {
            service: "http client".to_string(),
            message: e.to_string(),
        })?;

        let mut job_control = CrystalClient::new(client.clone(), &args.results_receiver)?;
        if let Some((user, password)) = args.receiver_credentials() {
            job_control = job_control.with_basic_auth(user, password);
        }

        let storages = Self::storage_registry();
        let storage = (storages.get(&config.storage_client_class)?)(config, client.clone());
        let metrics = (Self::metrics_registry().get(&config.metrics_provider)?)();
        let query_store = match &config.qes_connection_string {
            Some(connection) => FileQueryStore::from_connection_string(connection)?,
            None => FileQueryStore::new(None),
        };

        Ok(Self {
            job_control: Arc::new(job_control),
            storage,
            payload_reader: Arc::new(HttpPayloadReader::new(client)),
            query_store: Arc::new(query_store),
            metrics,
        })
    }
}

/// Everything a factory can draw on while the run is composed
pub struct NexusContext {
    args: RunArguments,
    config: Arc<NexusConfig>,
    services: NexusServices,
    values: Arc<InjectedValues>,
    cache: Arc<InputCache>,
    forks: Arc<ForkTracker>,
    cancellation: CancellationToken,
    sockets: Arc<Vec<JobSocket>>,
    readers: Vec<Arc<dyn InputObject>>,
    processors: Vec<Arc<dyn InputObject>>,
}

impl NexusContext {
    pub fn args(&self) -> &RunArguments {
        &self.args
    }

    pub fn config(&self) -> &NexusConfig {
        &self.config
    }

    pub fn payload<P: AlgorithmPayload>(&self) -> NexusResult<Arc<P>> {
        self.values.get::<P>()
    }

    pub fn configuration<C: NexusConfiguration>(&self) -> NexusResult<Arc<C>> {
        self.values.get::<C>()
    }

    pub fn cache(&self) -> Arc<InputCache> {
        self.cache.clone()
    }

    pub fn storage(&self) -> Arc<dyn StorageClient> {
        self.services.storage.clone()
    }

    pub fn job_control(&self) -> Arc<dyn JobControlApi> {
        self.services.job_control.clone()
    }

    pub fn query_store(&self) -> Arc<dyn QueryStore> {
        self.services.query_store.clone()
    }

    pub fn metrics(&self) -> Arc<dyn MetricsProvider> {
        self.services.metrics.clone()
    }

    pub fn fork_tracker(&self) -> Arc<ForkTracker> {
        self.forks.clone()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn sockets(&self) -> &[JobSocket] {
        &self.sockets
    }

    /// Context for a reader named `alias`
    pub fn reader_context(&self, alias: &str) -> ReaderContext {
        ReaderContext::new(
            alias,
            self.sockets.clone(),
            self.query_store(),
            self.metrics(),
            self.values.clone(),
        )
    }

    pub fn reader(&self, alias: &str) -> NexusResult<Arc<dyn InputObject>> {
        find(&self.readers, "reader", alias)
    }

    pub fn readers(&self) -> Vec<Arc<dyn InputObject>> {
        self.readers.clone()
    }

    pub fn processor(&self, alias: &str) -> NexusResult<Arc<dyn InputObject>> {
        find(&self.processors, "processor", alias)
    }

    /// Processors in registration order
    pub fn processors(&self) -> Vec<Arc<dyn InputObject>> {
        self.processors.clone()
    }

    fn add_input(&mut self, object: Arc<dyn InputObject>, processor: bool) -> NexusResult<()> {
        let alias = object.alias();
        if self.readers.iter().chain(self.processors.iter()).any(|o| o.alias() == alias) {
            return Err(NexusError::DuplicateAlias {
                alias: alias.to_string(),
            });
        }
        if processor {
            self.processors.push(object);
        } else {
            self.readers.push(object);
        }
        Ok(())
    }
}

fn find(objects: &[Arc<dyn InputObject>], registry: &str, alias: &str) -> NexusResult<Arc<dyn InputObject>> {
    objects
        .iter()
        .find(|o| o.alias() == alias)
        .cloned()
        .ok_or_else(|| NexusError::UnknownRegistration {
            registry: registry.to_string(),
            key: alias.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success {
        result_uri: String,
    },
    Failure {
        message: String,
        cause: String,
        transient: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub exit_code: i32,
}

pub struct Nexus {
    args: RunArguments,
    config: NexusConfig,
    services: Option<NexusServices>,
    cancellation: CancellationToken,
    retry: RetryPolicy,
    lookup: Lookup,
    readers: Vec<InputFactory>,
    processors: Vec<InputFactory>,
    algorithm: Option<AlgorithmFactory>,
    recorders: Vec<RecorderFactory>,
    payloads: Vec<PayloadInjector>,
    configurations: Vec<ConfigurationInjector>,
}

impl Nexus {
    pub fn new(args: RunArguments, config: NexusConfig) -> Self {
        Self {
            args,
            config,
            services: None,
            cancellation: CancellationToken::new(),
            retry: RetryPolicy::default(),
            lookup: Arc::new(|key: &str| std::env::var(key).ok()),
            readers: Vec::new(),
            processors: Vec::new(),
            algorithm: None,
            recorders: Vec::new(),
            payloads: Vec::new(),
            configurations: Vec::new(),
        }
    }

    pub fn add_reader<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&NexusContext) -> NexusResult<Arc<dyn InputObject>> + Send + 'static,
    {
        self.readers.push(Box::new(factory));
        self
    }

    pub fn use_processor<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&NexusContext) -> NexusResult<Arc<dyn InputObject>> + Send + 'static,
    {
        self.processors.push(Box::new(factory));
        self
    }

    pub fn use_algorithm<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&NexusContext) -> NexusResult<Arc<dyn Algorithm>> + Send + 'static,
    {
        self.algorithm = Some(Box::new(factory));
        self
    }

    /// Deserialize the run payload into `P` for factories to look up
    pub fn inject_payload<P: AlgorithmPayload>(mut self) -> Self {
        self.payloads.push(Box::new(|raw: &Value, values: &mut InjectedValues| {
            values.insert(P::from_value(raw.clone())?);
            Ok(())
        }));
        self
    }

    /// Read configuration section `C` for factories to look up
    pub fn inject_configuration<C: NexusConfiguration>(mut self) -> Self {
        self.configurations.push(Box::new(|lookup: &Lookup, values: &mut InjectedValues| {
            values.insert(C::from_lookup(|key: &str| (**lookup)(key))?);
            Ok(())
        }));
        self
    }

    /// Attach a user telemetry recorder, run once the algorithm produced a result
    pub fn on_complete<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&NexusContext) -> NexusResult<Arc<dyn UserTelemetryRecorder>> + Send + 'static,
    {
        self.recorders.push(Box::new(factory));
        self
    }

    pub fn with_services(mut self, services: NexusServices) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Source for injected configuration sections, the process environment by default
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }

    /// Run the algorithm once and report how the run ended.
    ///
    /// Errors returned from here are composition failures: nothing ran and
    /// nothing was submitted.
    pub async fn activate(self) -> NexusResult<RunReport> {
        let Nexus {
            args,
            config,
            services,
            cancellation,
            retry,
            lookup,
            readers,
            processors,
            algorithm,
            recorders,
            payloads,
            configurations,
        } = self;

        let services = match services {
            Some(services) => services,
            None => NexusServices::from_config(&config, &args)?,
        };
        let config = Arc::new(config);

        let mut values = InjectedValues::new();
        if !payloads.is_empty() {
            let raw = guarded(&cancellation, services.payload_reader.fetch(&args.sas_uri)).await?;
            for inject in payloads {
                inject(&raw, &mut values)?;
            }
        }
        for inject in configurations {
            inject(&lookup, &mut values)?;
        }

        let mut context = NexusContext {
            args: args.clone(),
            sockets: Arc::new(config.external_sockets.clone()),
            config: config.clone(),
            services: services.clone(),
            values: Arc::new(values),
            cache: Arc::new(InputCache::new()),
            forks: Arc::new(ForkTracker::new()),
            cancellation: cancellation.clone(),
            readers: Vec::new(),
            processors: Vec::new(),
        };

        for factory in readers {
            let reader = factory(&context)?;
            context.add_input(reader, false)?;
        }
        for factory in processors {
            let processor = factory(&context)?;
            context.add_input(processor, true)?;
        }
        let algorithm = match algorithm {
            Some(factory) => factory(&context)?,
            None => return Err(NexusError::fatal("no algorithm was configured")),
        };
        let recorders = recorders
            .into_iter()
            .map(|factory| factory(&context))
            .collect::<NexusResult<Vec<_>>>()?;

        log_startup(
            ProcessId::current(),
            &format!("algorithm {} for run {}", algorithm.alias(), args.request_id),
        );

        let run = RunDriver {
            args: &args,
            config: &config,
            services: &services,
            cancellation: &cancellation,
            retry,
        };

        let opened = guarded(&cancellation, algorithm.context_open()).await;
        let is_open = opened.is_ok();
        let result = match opened {
            Ok(()) => guarded(&cancellation, algorithm.run(&args)).await,
            Err(e) => Err(e),
        };

        let report = run.conclude(&result).await;

        if cancellation.is_cancelled() {
            process_warn!(ProcessId::current(), "Run cancelled, skipping telemetry");
        } else {
            run.record_telemetry(algorithm.as_ref(), result.as_ref().ok(), &recorders)
                .await;
        }

        if is_open {
            if let Err(e) = algorithm.context_close().await {
                log_error(ProcessId::current(), "Closing algorithm context", &e);
            }
        }

        let drained = context.forks.drain(config.fork_drain_timeout).await;
        if drained.abandoned > 0 {
            log_degraded(
                ProcessId::current(),
                "Fork drain",
                &format!("{} forks abandoned", drained.abandoned),
            );
        }

        if let Err(e) = services.query_store.close().await {
            log_error(ProcessId::current(), "Closing query store", &e);
        }

        log_shutdown(
            ProcessId::current(),
            &format!("run {} finished with exit code {}", args.request_id, report.exit_code),
        );
        Ok(report)
    }
}

/// Borrowed view of a composed run used while concluding it
struct RunDriver<'a> {
    args: &'a RunArguments,
    config: &'a NexusConfig,
    services: &'a NexusServices,
    cancellation: &'a CancellationToken,
    retry: RetryPolicy,
}

impl RunDriver<'_> {
    /// Classify the run result and submit it
    async fn conclude(&self, result: &NexusResult<AlgorithmResult>) -> RunReport {
        match result {
            Ok(data) => {
                match guarded(self.cancellation, self.submit_success(data)).await {
                    Ok(result_uri) => {
                        process_info!(ProcessId::current(), "Result of {} saved to {}", self.args.request_id, result_uri);
                        RunReport {
                            outcome: RunOutcome::Success { result_uri },
                            exit_code: 0,
                        }
                    }
                    Err(e) => self.submission_failed(e),
                }
            }
            Err(error) if error.is_transient() => {
                process_warn!(
                    ProcessId::current(),
                    "Run {} failed with a transient error, leaving it to the job runtime to retry: {}",
                    self.args.request_id,
                    error.chain()
                );
                RunReport {
                    outcome: failure(error, true),
                    exit_code: RETRY_EXIT_CODE,
                }
            }
            Err(error) => {
                log_error(ProcessId::current(), "Algorithm run", &error.chain());
                match guarded(self.cancellation, self.submit_failure(error)).await {
                    Ok(()) => RunReport {
                        outcome: failure(error, false),
                        exit_code: 0,
                    },
                    Err(e) => self.submission_failed(e),
                }
            }
        }
    }

    fn submission_failed(&self, error: NexusError) -> RunReport {
        if matches!(error, NexusError::Cancelled) {
            return RunReport {
                outcome: failure(&error, true),
                exit_code: RETRY_EXIT_CODE,
            };
        }

        let error = NexusError::Submission(Box::new(error));
        log_error(ProcessId::current(), "Result submission", &error.chain());
        RunReport {
            outcome: failure(&error, false),
            exit_code: SUBMISSION_FAILURE_EXIT_CODE,
        }
    }

    /// `{output}/{request_id}.{ext}`, extension by the format chosen for the data kind
    fn output_path(&self, data: &AlgorithmResult) -> (DataPath, SerializationFormat) {
        let format = self.config.result_serializer.format_for(data);
        let path = self
            .config
            .algorithm_output_path
            .join(&format!("{}.{}", self.args.request_id, format.extension()));
        (path, format)
    }

    async fn submit_success(&self, data: &AlgorithmResult) -> NexusResult<String> {
        let (path, format) = self.output_path(data);
        let path = &path;
        self.retry
            .run("result submission", move || async move {
                self.services.storage.save_blob(data, path, format, true).await?;
                let uri = self.services.storage.get_blob_uri(path).await?;
                self.submit(AlgorithmRunResult::success(&self.args.request_id, &uri))
                    .await?;
                Ok(uri)
            })
            .await
    }

    async fn submit_failure(&self, error: &NexusError) -> NexusResult<()> {
        self.retry
            .run("failure submission", move || {
                self.submit(AlgorithmRunResult::failure(
                    &self.args.request_id,
                    error.failure_message(),
                    error.chain(),
                ))
            })
            .await
    }

    async fn submit(&self, result: AlgorithmRunResult) -> NexusResult<()> {
        self.services
            .job_control
            .submit_result(&self.args.request_id, &self.config.algorithm_name, result, self.config.debug)
            .await
    }

    async fn record_telemetry(
        &self,
        algorithm: &dyn Algorithm,
        result: Option<&AlgorithmResult>,
        recorders: &[Arc<dyn UserTelemetryRecorder>],
    ) {
        let recorder = TelemetryRecorder::new(
            self.services.storage.clone(),
            self.config.telemetry_serializer.clone(),
            self.services.metrics.clone(),
            self.config.telemetry_path.clone(),
        )
        .with_timeout(self.config.telemetry_timeout);

        let inputs: RunInputs = algorithm.inputs();
        process_info!(ProcessId::current(), "Recording telemetry for the run {}", self.args.request_id);
        let recorded = recorder.record(&self.args.request_id, &inputs).await;
        process_debug!(ProcessId::current(), "Recorded {} of {} inputs", recorded, inputs.len());

        if let Some(result) = result {
            recorder
                .record_user_telemetry(recorders, result, &self.args.request_id, &inputs)
                .await;
        }
    }
}

fn failure(error: &NexusError, transient: bool) -> RunOutcome {
    RunOutcome::Failure {
        message: error.failure_message(),
        cause: error.chain(),
        transient,
    }
}

/// Await `future` unless the run is cancelled first
async fn guarded<T, F>(cancellation: &CancellationToken, future: F) -> NexusResult<T>
where
    F: Future<Output = NexusResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(NexusError::Cancelled),
        outcome = future => outcome,
    }
}
