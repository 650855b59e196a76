//! Input readers
//!
//! A reader wraps a user [`ReaderSource`] and reads its table at most once.

use async_trait::async_trait;
use shared::{process_debug, ProcessId, RunArguments};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::OnceCell;

use crate::core::data::{AlgorithmData, DataTable};
use crate::error::{NexusError, NexusResult};
use crate::input::{InputObject, ReaderContext};
use crate::services::metrics::timed;

/// Where a table comes from
#[async_trait]
pub trait ReaderSource: Send + Sync + 'static {
    /// Acquire whatever the read needs (connections, temp files)
    async fn acquire(&self, _ctx: &ReaderContext) -> NexusResult<()> {
        Ok(())
    }

    async fn read_input(&self, ctx: &ReaderContext) -> NexusResult<DataTable>;

    async fn release(&self, _ctx: &ReaderContext) -> NexusResult<()> {
        Ok(())
    }

    /// Memoization key; defaults to the reader alias
    fn cache_key(&self, ctx: &ReaderContext) -> String {
        ctx.alias().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Unopened,
    Opened,
    Read,
    Closed,
}

pub struct InputReader<S: ReaderSource> {
    source: S,
    ctx: ReaderContext,
    state: Mutex<ReaderState>,
    /// Set while an `acquire` awaits its `release`
    acquired: AtomicBool,
    data: OnceCell<DataTable>,
}

impl<S: ReaderSource> InputReader<S> {
    pub fn new(source: S, ctx: ReaderContext) -> Self {
        Self {
            source,
            ctx,
            state: Mutex::new(ReaderState::Unopened),
            acquired: AtomicBool::new(false),
            data: OnceCell::new(),
        }
    }

    pub fn state(&self) -> ReaderState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Table read so far, if any
    pub fn data(&self) -> Option<&DataTable> {
        self.data.get()
    }

    fn set_state(&self, state: ReaderState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// Read the table through the source, once; later calls return the memoized table
    pub async fn read(&self) -> NexusResult<&DataTable> {
        let table = self
            .data
            .get_or_try_init(|| async {
                if self.state() == ReaderState::Unopened {
                    return Err(NexusError::fatal(format!(
                        "reader '{}' was read before it was opened",
                        self.ctx.alias()
                    )));
                }
                process_debug!(ProcessId::current(), "Reading input {}", self.ctx.alias());
                timed(
                    self.ctx.metrics().as_ref(),
                    "read_input",
                    self.ctx.alias(),
                    self.source.read_input(&self.ctx),
                )
                .await
            })
            .await?;

        self.set_state(ReaderState::Read);
        Ok(table)
    }
}

#[async_trait]
impl<S: ReaderSource> InputObject for InputReader<S> {
    fn alias(&self) -> &str {
        self.ctx.alias()
    }

    fn cache_key(&self) -> String {
        self.source.cache_key(&self.ctx)
    }

    async fn open(&self) -> NexusResult<()> {
        if self.state() == ReaderState::Read {
            return Ok(());
        }
        if !self.acquired.load(Ordering::SeqCst) {
            self.source.acquire(&self.ctx).await?;
            self.acquired.store(true, Ordering::SeqCst);
        }
        self.set_state(ReaderState::Opened);
        Ok(())
    }

    async fn process(&self, _args: &RunArguments) -> NexusResult<AlgorithmData> {
        self.read().await.map(|table| AlgorithmData::Table(table.clone()))
    }

    async fn close(&self) -> NexusResult<()> {
        let released = if self.acquired.swap(false, Ordering::SeqCst) {
            self.source.release(&self.ctx).await
        } else {
            Ok(())
        };
        self.set_state(ReaderState::Closed);
        released
    }
}

/// Reads the table behind the reader's external socket from the query store
pub struct SocketSource;

#[async_trait]
impl ReaderSource for SocketSource {
    async fn read_input(&self, ctx: &ReaderContext) -> NexusResult<DataTable> {
        let socket = ctx.socket()?;
        ctx.store().read_table(socket).await
    }

    /// Readers of the same data share one read, whatever their alias
    fn cache_key(&self, ctx: &ReaderContext) -> String {
        match ctx.socket() {
            Ok(socket) => format!("socket:{}|{}", socket.data_path, socket.data_format.to_ascii_lowercase()),
            Err(_) => format!("socket:{}", ctx.alias()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::injected::InjectedValues;
    use crate::error::CollaboratorError;
    use crate::traits::{MockMetricsProvider, MockQueryStore};
    use serde_json::json;
    use shared::JobSocket;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Recording {
        acquires: AtomicUsize,
        reads: AtomicUsize,
        releases: AtomicUsize,
        fail: bool,
    }

    struct RecordingSource(Arc<Recording>);

    #[async_trait]
    impl ReaderSource for RecordingSource {
        async fn acquire(&self, _ctx: &ReaderContext) -> NexusResult<()> {
            self.0.acquires.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn read_input(&self, _ctx: &ReaderContext) -> NexusResult<DataTable> {
            self.0.reads.fetch_add(1, Ordering::SeqCst);
            if self.0.fail {
                return Err(CollaboratorError::TableNotFound { table: "orders".into() }.into());
            }
            let mut table = DataTable::new(vec!["id".into()]);
            table.push_row(vec![json!(1)])?;
            Ok(table)
        }

        async fn release(&self, _ctx: &ReaderContext) -> NexusResult<()> {
            self.0.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn context(store: MockQueryStore, sockets: Vec<JobSocket>) -> ReaderContext {
        context_for("orders", Arc::new(store), sockets)
    }

    fn context_for(alias: &str, store: Arc<MockQueryStore>, sockets: Vec<JobSocket>) -> ReaderContext {
        let mut metrics = MockMetricsProvider::new();
        metrics.expect_timing().returning(|_, _, _| ()).times(0..);
        metrics.expect_count().returning(|_, _, _| ()).times(0..);
        ReaderContext::new(
            alias,
            Arc::new(sockets),
            store,
            Arc::new(metrics),
            Arc::new(InjectedValues::new()),
        )
    }

    fn args() -> RunArguments {
        RunArguments::new("https://payload", "req-1", "https://crystal")
    }

    #[tokio::test]
    async fn test_reader_reads_once_and_walks_states() {
        let recording = Arc::new(Recording::default());
        let reader = InputReader::new(RecordingSource(recording.clone()), context(MockQueryStore::new(), vec![]));
        assert_eq!(reader.state(), ReaderState::Unopened);

        reader.open().await.unwrap();
        assert_eq!(reader.state(), ReaderState::Opened);

        let first = reader.process(&args()).await.unwrap();
        let second = reader.process(&args()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(reader.state(), ReaderState::Read);

        reader.close().await.unwrap();
        assert_eq!(reader.state(), ReaderState::Closed);
        assert_eq!(recording.reads.load(Ordering::SeqCst), 1);
        assert_eq!(recording.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_before_open_is_fatal() {
        let recording = Arc::new(Recording::default());
        let reader = InputReader::new(RecordingSource(recording.clone()), context(MockQueryStore::new(), vec![]));

        let error = reader.process(&args()).await.unwrap_err();

        assert!(!error.is_transient());
        assert_eq!(recording.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_read_is_released_through_cache() {
        let recording = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let reader: Arc<dyn InputObject> = Arc::new(InputReader::new(
            RecordingSource(recording.clone()),
            context(MockQueryStore::new(), vec![]),
        ));
        let cache = crate::core::InputCache::new();

        let error = cache.resolve(&[reader], &args()).await.unwrap_err();

        assert!(matches!(error, NexusError::TransientInput { ref alias, .. } if alias == "orders"));
        assert_eq!(recording.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_socket_source_reads_from_store() {
        let mut store = MockQueryStore::new();
        store
            .expect_read_table()
            .withf(|socket| socket.data_path == "/data/orders.json")
            .times(1)
            .returning(|_| Ok(DataTable::new(vec!["id".into()])));
        let sockets = vec![JobSocket::new("orders", "/data/orders.json", "json")];
        let reader = InputReader::new(SocketSource, context(store, sockets));

        reader.open().await.unwrap();
        let table = reader.read().await.unwrap();

        assert_eq!(table.columns, vec!["id"]);
        assert_eq!(reader.cache_key(), "socket:/data/orders.json|json");
    }

    #[tokio::test]
    async fn test_socket_source_requires_socket() {
        let reader = InputReader::new(SocketSource, context(MockQueryStore::new(), vec![]));
        reader.open().await.unwrap();

        let error = reader.read().await.unwrap_err();

        assert!(matches!(error, NexusError::Shared(shared::SharedError::SocketNotFound { .. })));
    }

    #[tokio::test]
    async fn test_readers_of_the_same_data_share_one_read() {
        let mut store = MockQueryStore::new();
        store
            .expect_read_table()
            .times(1)
            .returning(|_| Ok(DataTable::new(vec!["id".into()])));
        let store = Arc::new(store);
        let sockets = vec![
            JobSocket::new("orders", "/data/orders.json", "json"),
            JobSocket::new("orders_copy", "/data/orders.json", "JSON"),
        ];
        let readers: Vec<Arc<dyn InputObject>> = vec![
            Arc::new(InputReader::new(SocketSource, context_for("orders", store.clone(), sockets.clone()))),
            Arc::new(InputReader::new(SocketSource, context_for("orders_copy", store, sockets))),
        ];
        let cache = crate::core::InputCache::new();

        let inputs = cache.resolve(&readers, &args()).await.unwrap();

        assert_eq!(inputs.keys().collect::<Vec<_>>(), vec!["orders", "orders_copy"]);
        assert_eq!(readers[0].cache_key(), readers[1].cache_key());
    }

    #[tokio::test]
    async fn test_release_only_follows_acquire() {
        let recording = Arc::new(Recording::default());
        let reader = InputReader::new(RecordingSource(recording.clone()), context(MockQueryStore::new(), vec![]));

        reader.close().await.unwrap();
        assert_eq!(recording.releases.load(Ordering::SeqCst), 0);

        reader.open().await.unwrap();
        reader.process(&args()).await.unwrap();
        reader.open().await.unwrap();
        reader.close().await.unwrap();
        reader.close().await.unwrap();

        assert_eq!(recording.acquires.load(Ordering::SeqCst), 1);
        assert_eq!(recording.releases.load(Ordering::SeqCst), 1);
    }
}
