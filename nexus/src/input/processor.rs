//! Input processors
//!
//! A processor resolves its readers through the shared cache and turns their
//! tables into a named set of values, once per process.

use async_trait::async_trait;
use shared::RunArguments;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::core::cache::InputCache;
use crate::core::data::{AlgorithmData, RunInputs};
use crate::error::NexusResult;
use crate::input::InputObject;

/// User logic of a processor
#[async_trait]
pub trait ProcessorBody: Send + Sync + 'static {
    /// `inputs` holds the tables of the processor's readers keyed by reader alias
    async fn process_input(&self, inputs: RunInputs) -> NexusResult<RunInputs>;
}

pub struct InputProcessor<P: ProcessorBody> {
    alias: String,
    body: P,
    readers: Vec<Arc<dyn InputObject>>,
    cache: Arc<InputCache>,
    result: OnceCell<RunInputs>,
}

impl<P: ProcessorBody> InputProcessor<P> {
    pub fn new(alias: impl Into<String>, body: P, readers: Vec<Arc<dyn InputObject>>, cache: Arc<InputCache>) -> Self {
        Self {
            alias: alias.into(),
            body,
            readers,
            cache,
            result: OnceCell::new(),
        }
    }

    pub fn readers(&self) -> &[Arc<dyn InputObject>] {
        &self.readers
    }
}

#[async_trait]
impl<P: ProcessorBody> InputObject for InputProcessor<P> {
    fn alias(&self) -> &str {
        &self.alias
    }

    async fn open(&self) -> NexusResult<()> {
        Ok(())
    }

    async fn process(&self, args: &RunArguments) -> NexusResult<AlgorithmData> {
        let processed = self
            .result
            .get_or_try_init(|| async {
                let inputs = self.cache.resolve(&self.readers, args).await?;
                self.body.process_input(inputs).await
            })
            .await?;

        Ok(AlgorithmData::Bundle(processed.clone()))
    }

    async fn close(&self) -> NexusResult<()> {
        Ok(())
    }
}

/// Processor body that hands its reader tables through unchanged
pub struct Passthrough;

#[async_trait]
impl ProcessorBody for Passthrough {
    async fn process_input(&self, inputs: RunInputs) -> NexusResult<RunInputs> {
        Ok(inputs)
    }
}
