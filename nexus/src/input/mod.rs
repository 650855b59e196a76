//! Input objects: readers that produce tables and processors that combine them
//!
//! Both are resolved through the shared [`InputCache`](crate::core::InputCache),
//! which drives their `open → process → close` protocol.

pub mod payload;
pub mod processor;
pub mod reader;

use async_trait::async_trait;
use shared::{JobSocket, RunArguments};
use std::sync::Arc;

use crate::core::data::AlgorithmData;
use crate::core::injected::InjectedValues;
use crate::error::{NexusError, NexusResult};
use crate::traits::{MetricsProvider, QueryStore};

pub use payload::{AlgorithmPayload, NexusConfiguration};
pub use processor::{InputProcessor, Passthrough, ProcessorBody};
pub use reader::{InputReader, ReaderSource, ReaderState, SocketSource};

/// Anything the input cache can resolve
#[async_trait]
pub trait InputObject: Send + Sync {
    /// Unique name of this object within a run
    fn alias(&self) -> &str;

    /// Key the resolved value is memoized under; objects with equal keys share one resolution
    fn cache_key(&self) -> String {
        self.alias().to_string()
    }

    async fn open(&self) -> NexusResult<()>;

    async fn process(&self, args: &RunArguments) -> NexusResult<AlgorithmData>;

    /// Called after `process` whenever `open` succeeded, including after a failure
    async fn close(&self) -> NexusResult<()>;
}

/// What a reader source can reach while reading
#[derive(Clone)]
pub struct ReaderContext {
    alias: String,
    sockets: Arc<Vec<JobSocket>>,
    store: Arc<dyn QueryStore>,
    metrics: Arc<dyn MetricsProvider>,
    values: Arc<InjectedValues>,
}

impl ReaderContext {
    pub fn new(
        alias: impl Into<String>,
        sockets: Arc<Vec<JobSocket>>,
        store: Arc<dyn QueryStore>,
        metrics: Arc<dyn MetricsProvider>,
        values: Arc<InjectedValues>,
    ) -> Self {
        Self {
            alias: alias.into(),
            sockets,
            store,
            metrics,
            values,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// External socket registered under this reader's alias
    pub fn socket(&self) -> NexusResult<&JobSocket> {
        self.socket_for(&self.alias)
    }

    pub fn socket_for(&self, alias: &str) -> NexusResult<&JobSocket> {
        JobSocket::from_list(&self.sockets, alias).map_err(NexusError::from)
    }

    pub fn store(&self) -> &Arc<dyn QueryStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsProvider> {
        &self.metrics
    }

    /// Injected payload or configuration of type `T`
    pub fn value<T: std::any::Any + Send + Sync>(&self) -> NexusResult<Arc<T>> {
        self.values.get::<T>()
    }
}
