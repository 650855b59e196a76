//! Algorithm variants and the input plumbing they share
//!
//! Every algorithm moves through `Constructed → ContextOpened → Running →
//! ContextClosed`. Input processors are resolved through the run's
//! [`InputCache`] and their bundles merged into one [`RunInputs`] before the
//! body sees them.

pub mod distributed;
pub mod forked;
pub mod minimalistic;
pub mod recursive;
pub mod remote;

use async_trait::async_trait;
use shared::{process_debug, ProcessId, RunArguments};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::cache::InputCache;
use crate::core::data::{AlgorithmData, AlgorithmResult, RunInputs};
use crate::error::{NexusError, NexusResult};
use crate::input::InputObject;
use crate::services::metrics::timed;
use crate::traits::MetricsProvider;

pub use distributed::{DistributedAlgorithm, DistributedBody};
pub use forked::ForkedAlgorithm;
pub use minimalistic::{AlgorithmBody, MinimalisticAlgorithm};
pub use recursive::{RecursiveAlgorithm, RecursiveBody, DEFAULT_MAX_ITERATIONS};
pub use remote::RemoteAlgorithm;

/// Metric every algorithm run is reported under
pub const ALGORITHM_RUN_METRIC: &str = "algorithm_run";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmState {
    Constructed,
    ContextOpened,
    Running,
    ContextClosed,
}

#[async_trait]
pub trait Algorithm: Send + Sync {
    fn alias(&self) -> &str;

    async fn context_open(&self) -> NexusResult<()>;

    async fn run(&self, args: &RunArguments) -> NexusResult<AlgorithmResult>;

    async fn context_close(&self) -> NexusResult<()>;

    /// Inputs the last run was invoked with; empty until inputs are resolved
    fn inputs(&self) -> RunInputs;
}

/// Processors, cache handle and lifecycle state common to every variant
pub struct AlgorithmBase {
    alias: String,
    processors: Vec<Arc<dyn InputObject>>,
    cache: Arc<InputCache>,
    metrics: Arc<dyn MetricsProvider>,
    state: Mutex<AlgorithmState>,
    inputs: Mutex<RunInputs>,
}

impl AlgorithmBase {
    pub fn new(
        alias: impl Into<String>,
        processors: Vec<Arc<dyn InputObject>>,
        cache: Arc<InputCache>,
        metrics: Arc<dyn MetricsProvider>,
    ) -> Self {
        Self {
            alias: alias.into(),
            processors,
            cache,
            metrics,
            state: Mutex::new(AlgorithmState::Constructed),
            inputs: Mutex::new(RunInputs::new()),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsProvider> {
        &self.metrics
    }

    pub fn state(&self) -> AlgorithmState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: AlgorithmState) {
        process_debug!(ProcessId::current(), "Algorithm {} is now {:?}", self.alias, state);
        *lock(&self.state) = state;
    }

    pub fn inputs(&self) -> RunInputs {
        lock(&self.inputs).clone()
    }

    /// Resolve every processor and merge the results into one input set.
    ///
    /// Bundles contribute each of their entries, any other value lands under
    /// the processor alias. A key produced twice is an error.
    pub async fn resolve_inputs(&self, args: &RunArguments) -> NexusResult<RunInputs> {
        let resolved = self.cache.resolve(&self.processors, args).await?;
        let merged = merge_inputs(resolved)?;
        *lock(&self.inputs) = merged.clone();
        Ok(merged)
    }

    /// Run `body` as this algorithm's measured run
    pub async fn measured<F>(&self, body: F) -> NexusResult<AlgorithmResult>
    where
        F: std::future::Future<Output = NexusResult<AlgorithmResult>>,
    {
        self.set_state(AlgorithmState::Running);
        timed(self.metrics.as_ref(), ALGORITHM_RUN_METRIC, &self.alias, body).await
    }
}

fn merge_inputs(resolved: RunInputs) -> NexusResult<RunInputs> {
    let mut merged = RunInputs::new();
    let mut sources: BTreeMap<String, String> = BTreeMap::new();

    for (alias, value) in resolved {
        let entries = match value {
            AlgorithmData::Bundle(entries) => entries,
            other => BTreeMap::from([(alias.clone(), other)]),
        };

        for (key, entry) in entries {
            if let Some(first) = sources.get(&key) {
                return Err(NexusError::AmbiguousInput {
                    key,
                    first: first.clone(),
                    second: alias,
                });
            }
            sources.insert(key.clone(), alias.clone());
            merged.insert(key, entry);
        }
    }

    Ok(merged)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
