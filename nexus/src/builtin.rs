//! Algorithms shipped with the `nexus` binary
//!
//! The binary reads every external socket through a socket reader, bundles
//! them with one pass-through processor and runs the algorithm named by
//! `NEXUS__ALGORITHM_CLASS`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::algorithms::{Algorithm, AlgorithmBody, MinimalisticAlgorithm};
use crate::config::{NexusConfig, Registry, ALGORITHM_CLASS};
use crate::core::data::{AlgorithmData, AlgorithmResult, RunInputs};
use crate::error::{NexusError, NexusResult};
use crate::input::processor::Passthrough;
use crate::input::reader::SocketSource;
use crate::input::{InputObject, InputProcessor, InputReader};
use crate::nexus::{Nexus, NexusContext};

/// Alias of the processor bundling every external socket
pub const EXTERNAL_INPUTS: &str = "external_inputs";

pub type BuiltinAlgorithm = fn(&NexusContext) -> NexusResult<Arc<dyn Algorithm>>;

/// Returns its inputs unchanged as one bundle
pub struct PassthroughBody;

#[async_trait]
impl AlgorithmBody for PassthroughBody {
    async fn run(&self, inputs: RunInputs) -> NexusResult<AlgorithmResult> {
        Ok(AlgorithmData::Bundle(inputs))
    }
}

/// Counts the rows of every table input
pub struct RowCountBody;

#[async_trait]
impl AlgorithmBody for RowCountBody {
    async fn run(&self, inputs: RunInputs) -> NexusResult<AlgorithmResult> {
        let counts: Map<String, Value> = inputs
            .iter()
            .filter_map(|(key, data)| data.as_table().map(|table| (key.clone(), Value::from(table.len()))))
            .collect();
        Ok(AlgorithmData::Document(Value::Object(counts)))
    }
}

fn passthrough(ctx: &NexusContext) -> NexusResult<Arc<dyn Algorithm>> {
    Ok(Arc::new(MinimalisticAlgorithm::new(
        "passthrough",
        PassthroughBody,
        ctx.processors(),
        ctx.cache(),
        ctx.metrics(),
    )))
}

fn row_count(ctx: &NexusContext) -> NexusResult<Arc<dyn Algorithm>> {
    Ok(Arc::new(MinimalisticAlgorithm::new(
        "row_count",
        RowCountBody,
        ctx.processors(),
        ctx.cache(),
        ctx.metrics(),
    )))
}

pub fn algorithm_registry() -> Registry<BuiltinAlgorithm> {
    Registry::new("algorithm")
        .register("passthrough", passthrough as BuiltinAlgorithm)
        .register("row_count", row_count as BuiltinAlgorithm)
}

/// Wire socket readers, the bundling processor and the configured algorithm into `nexus`
pub fn configure(mut nexus: Nexus, config: &NexusConfig) -> NexusResult<Nexus> {
    for socket in &config.external_sockets {
        let alias = socket.alias.clone();
        nexus = nexus.add_reader(move |ctx| {
            Ok(Arc::new(InputReader::new(SocketSource, ctx.reader_context(&alias))) as Arc<dyn InputObject>)
        });
    }

    nexus = nexus.use_processor(|ctx| {
        Ok(Arc::new(InputProcessor::new(EXTERNAL_INPUTS, Passthrough, ctx.readers(), ctx.cache())) as Arc<dyn InputObject>)
    });

    let class = config
        .algorithm_class
        .as_deref()
        .ok_or_else(|| NexusError::config(ALGORITHM_CLASS))?;
    let factory = *algorithm_registry().get(class)?;
    Ok(nexus.use_algorithm(factory))
}
