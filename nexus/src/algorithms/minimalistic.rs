//! Single-shot algorithm

use async_trait::async_trait;
use shared::RunArguments;
use std::sync::Arc;

use super::{Algorithm, AlgorithmBase, AlgorithmState};
use crate::core::cache::InputCache;
use crate::core::data::{AlgorithmResult, RunInputs};
use crate::error::NexusResult;
use crate::input::InputObject;
use crate::traits::MetricsProvider;

/// User logic of an algorithm: turn merged inputs into a result
#[async_trait]
pub trait AlgorithmBody: Send + Sync + 'static {
    async fn run(&self, inputs: RunInputs) -> NexusResult<AlgorithmResult>;
}

pub struct MinimalisticAlgorithm<B: AlgorithmBody> {
    base: AlgorithmBase,
    body: B,
}

impl<B: AlgorithmBody> MinimalisticAlgorithm<B> {
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

    pub fn state(&self) -> AlgorithmState {
        self.base.state()
    }
}

#[async_trait]
impl<B: AlgorithmBody> Algorithm for MinimalisticAlgorithm<B> {
    fn alias(&self) -> &str {
        self.base.alias()
    }

    async fn context_open(&self) -> NexusResult<()> {
        self.base.set_state(AlgorithmState::ContextOpened);
        Ok(())
    }

    async fn run(&self, args: &RunArguments) -> NexusResult<AlgorithmResult> {
        let inputs = self.base.resolve_inputs(args).await?;
        self.base.measured(self.body.run(inputs)).await
    }

    async fn context_close(&self) -> NexusResult<()> {
        self.base.set_state(AlgorithmState::ContextClosed);
        Ok(())
    }

    fn inputs(&self) -> RunInputs {
        self.base.inputs()
    }
}
