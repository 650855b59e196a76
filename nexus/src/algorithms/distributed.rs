//! Algorithm that splits its work into sub-algorithms and folds their results

use async_trait::async_trait;
use futures_util::future::join_all;
use shared::{process_info, ProcessId, RunArguments};
use std::sync::Arc;

use super::{Algorithm, AlgorithmBase, AlgorithmState};
use crate::core::cache::InputCache;
use crate::core::data::{AlgorithmResult, RunInputs};
use crate::error::NexusResult;
use crate::input::InputObject;
use crate::traits::MetricsProvider;

#[async_trait]
pub trait DistributedBody: Send + Sync + 'static {
    async fn split(&self, inputs: &RunInputs) -> NexusResult<Vec<Arc<dyn Algorithm>>>;

    /// Combine split results, given in split order
    async fn fold(&self, results: Vec<AlgorithmResult>) -> NexusResult<AlgorithmResult>;
}

pub struct DistributedAlgorithm<B: DistributedBody> {
    base: AlgorithmBase,
    body: B,
}

impl<B: DistributedBody> DistributedAlgorithm<B> {
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
        }
    }

    async fn distribute(&self, inputs: RunInputs, args: &RunArguments) -> NexusResult<AlgorithmResult> {
        let splits = self.body.split(&inputs).await?;
        process_info!(
            ProcessId::current(),
            "Algorithm {} split into {} parts",
            self.base.alias(),
            splits.len()
        );

        // every split runs to completion before the first failure is reported
        let outcomes = join_all(splits.iter().map(|split| split.run(args))).await;
        let results = outcomes.into_iter().collect::<NexusResult<Vec<_>>>()?;

        self.body.fold(results).await
    }
}

#[async_trait]
impl<B: DistributedBody> Algorithm for DistributedAlgorithm<B> {
    fn alias(&self) -> &str {
        self.base.alias()
    }

    async fn context_open(&self) -> NexusResult<()> {
        self.base.set_state(AlgorithmState::ContextOpened);
        Ok(())
    }

    async fn run(&self, args: &RunArguments) -> NexusResult<AlgorithmResult> {
        let inputs = self.base.resolve_inputs(args).await?;
        self.base.measured(self.distribute(inputs, args)).await
    }

    async fn context_close(&self) -> NexusResult<()> {
        self.base.set_state(AlgorithmState::ContextClosed);
        Ok(())
    }

    fn inputs(&self) -> RunInputs {
        self.base.inputs()
    }
}
