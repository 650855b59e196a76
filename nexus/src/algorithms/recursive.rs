//! Algorithm that feeds its own result back as input until it is done

use async_trait::async_trait;
use shared::{process_debug, ProcessId, RunArguments};
use std::sync::Arc;

use super::{Algorithm, AlgorithmBase, AlgorithmState};
use crate::core::cache::InputCache;
use crate::core::data::{AlgorithmResult, RunInputs};
use crate::error::{NexusError, NexusResult};
use crate::input::InputObject;
use crate::traits::MetricsProvider;

pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

#[async_trait]
pub trait RecursiveBody: Send + Sync + 'static {
    /// One iteration
    async fn step(&self, inputs: RunInputs) -> NexusResult<AlgorithmResult>;

    /// Whether `result` is final
    async fn is_finished(&self, result: &AlgorithmResult) -> NexusResult<bool>;
}

pub struct RecursiveAlgorithm<B: RecursiveBody> {
    base: AlgorithmBase,
    body: B,
    max_iterations: usize,
}

impl<B: RecursiveBody> RecursiveAlgorithm<B> {
    pub fn new(
        alias: impl Into<String>,
        body: B,
        processors: Vec<Arc<dyn InputObject>>,
        cache: Arc<InputCache>,
        metrics: Arc<dyn MetricsProvider>,
    ) -> Self {
        Self {
            base: AlgorithmBase::new(alias, processors, cache, metrics),
            body,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    async fn iterate(&self, mut inputs: RunInputs) -> NexusResult<AlgorithmResult> {
        for iteration in 1..=self.max_iterations {
            let result = self.body.step(inputs).await?;
            if self.body.is_finished(&result).await? {
                process_debug!(
                    ProcessId::current(),
                    "Algorithm {} finished after {} iterations",
                    self.base.alias(),
                    iteration
                );
                return Ok(result);
            }
            inputs = result.into_inputs(self.base.alias());
        }

        Err(NexusError::IterationLimit {
            algorithm: self.base.alias().to_string(),
            limit: self.max_iterations,
        })
    }
}

#[async_trait]
impl<B: RecursiveBody> Algorithm for RecursiveAlgorithm<B> {
    fn alias(&self) -> &str {
        self.base.alias()
    }

    async fn context_open(&self) -> NexusResult<()> {
        self.base.set_state(AlgorithmState::ContextOpened);
        Ok(())
    }

    async fn run(&self, args: &RunArguments) -> NexusResult<AlgorithmResult> {
        let inputs = self.base.resolve_inputs(args).await?;
        self.base.measured(self.iterate(inputs)).await
    }

    async fn context_close(&self) -> NexusResult<()> {
        self.base.set_state(AlgorithmState::ContextClosed);
        Ok(())
    }

    fn inputs(&self) -> RunInputs {
        self.base.inputs()
    }
}
