//! Behaviour of the algorithm variants and shared input resolution

mod common;

use async_trait::async_trait;
use common::TestFixtures;
use nexus::core::ForkTracker;
use nexus::input::ReaderContext;
use nexus::services::NullMetricsProvider;
use nexus::traits::MockQueryStore;
use nexus::{
    Algorithm, AlgorithmBody, AlgorithmData, AlgorithmResult, DataTable, DistributedAlgorithm, DistributedBody,
    ForkedAlgorithm, InputCache, InputObject, InputProcessor, InputReader, MetricsProvider, MinimalisticAlgorithm,
    NexusError, NexusResult, ReaderSource, RecursiveAlgorithm, RecursiveBody, RunInputs,
};
use serde_json::json;
use shared::JobSocket;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

fn metrics() -> Arc<dyn MetricsProvider> {
    Arc::new(NullMetricsProvider)
}

struct Counter {
    steps: Arc<AtomicUsize>,
}

#[async_trait]
impl RecursiveBody for Counter {
    async fn step(&self, inputs: RunInputs) -> NexusResult<AlgorithmResult> {
        self.steps.fetch_add(1, Ordering::SeqCst);
        let current = inputs
            .get("counter")
            .and_then(AlgorithmData::as_document)
            .and_then(|value| value.as_u64())
            .unwrap_or(0);
        Ok(AlgorithmData::Document(json!(current + 1)))
    }

    async fn is_finished(&self, result: &AlgorithmResult) -> NexusResult<bool> {
        Ok(result.as_document().and_then(|v| v.as_u64()) >= Some(4))
    }
}

#[tokio::test]
async fn test_recursive_feeds_result_back_until_finished() {
    let steps = Arc::new(AtomicUsize::new(0));
    let algorithm = RecursiveAlgorithm::new(
        "counter",
        Counter { steps: steps.clone() },
        vec![],
        Arc::new(InputCache::new()),
        metrics(),
    );

    algorithm.context_open().await.unwrap();
    let result = algorithm.run(&TestFixtures::run_arguments()).await.unwrap();
    algorithm.context_close().await.unwrap();

    assert_eq!(result.as_document(), Some(&json!(4)));
    assert_eq!(steps.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_recursive_stops_at_iteration_limit() {
    struct Never;

    #[async_trait]
    impl RecursiveBody for Never {
        async fn step(&self, _inputs: RunInputs) -> NexusResult<AlgorithmResult> {
            Ok(AlgorithmData::Document(json!(null)))
        }

        async fn is_finished(&self, _result: &AlgorithmResult) -> NexusResult<bool> {
            Ok(false)
        }
    }

    let algorithm =
        RecursiveAlgorithm::new("never", Never, vec![], Arc::new(InputCache::new()), metrics()).with_max_iterations(5);

    match algorithm.run(&TestFixtures::run_arguments()).await {
        Err(NexusError::IterationLimit { algorithm, limit }) => {
            assert_eq!(algorithm, "never");
            assert_eq!(limit, 5);
        }
        other => panic!("expected iteration limit, got {other:?}"),
    }
}

struct Constant(i64);

#[async_trait]
impl AlgorithmBody for Constant {
    async fn run(&self, _inputs: RunInputs) -> NexusResult<AlgorithmResult> {
        Ok(AlgorithmData::Document(json!(self.0)))
    }
}

/// Split that sleeps `value` times 5ms and fails for negative values
struct Split {
    value: i64,
    finished: Arc<AtomicUsize>,
}

#[async_trait]
impl AlgorithmBody for Split {
    async fn run(&self, _inputs: RunInputs) -> NexusResult<AlgorithmResult> {
        if self.value > 0 {
            tokio::time::sleep(Duration::from_millis(self.value as u64 * 5)).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.value < 0 {
            return Err(NexusError::fatal(format!("negative split {}", self.value)));
        }
        Ok(AlgorithmData::Document(json!(self.value)))
    }
}

struct Sum {
    parts: Vec<i64>,
    cache: Arc<InputCache>,
    finished: Arc<AtomicUsize>,
}

impl Sum {
    fn new(parts: Vec<i64>, cache: Arc<InputCache>) -> Self {
        Self {
            parts,
            cache,
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl DistributedBody for Sum {
    async fn split(&self, _inputs: &RunInputs) -> NexusResult<Vec<Arc<dyn Algorithm>>> {
        Ok(self
            .parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                Arc::new(MinimalisticAlgorithm::new(
                    format!("part-{i}"),
                    Split {
                        value: *part,
                        finished: self.finished.clone(),
                    },
                    vec![],
                    self.cache.clone(),
                    metrics(),
                )) as Arc<dyn Algorithm>
            })
            .collect())
    }

    async fn fold(&self, results: Vec<AlgorithmResult>) -> NexusResult<AlgorithmResult> {
        let total: i64 = results
            .iter()
            .filter_map(|r| r.as_document().and_then(|v| v.as_i64()))
            .sum();
        Ok(AlgorithmData::Document(json!(total)))
    }
}

#[tokio::test]
async fn test_distributed_folds_all_splits() {
    let cache = Arc::new(InputCache::new());
    let algorithm = DistributedAlgorithm::new("sum", Sum::new(vec![1, 2, 3], cache.clone()), vec![], cache, metrics());

    let result = algorithm.run(&TestFixtures::run_arguments()).await.unwrap();

    assert_eq!(result.as_document(), Some(&json!(6)));
}

#[tokio::test]
async fn test_distributed_failure_waits_for_every_split() {
    let cache = Arc::new(InputCache::new());
    let body = Sum::new(vec![1, -2, 40, -3], cache.clone());
    let finished = body.finished.clone();
    let algorithm = DistributedAlgorithm::new("sum", body, vec![], cache, metrics());

    let error = algorithm.run(&TestFixtures::run_arguments()).await.unwrap_err();

    assert_eq!(error.to_string(), "negative split -2");
    assert_eq!(finished.load(Ordering::SeqCst), 4);
}

/// Fork that waits for a permit before finishing
struct GatedFork {
    alias: String,
    gate: Arc<Semaphore>,
    finished: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl Algorithm for GatedFork {
    fn alias(&self) -> &str {
        &self.alias
    }

    async fn context_open(&self) -> NexusResult<()> {
        Ok(())
    }

    async fn run(&self, _args: &shared::RunArguments) -> NexusResult<AlgorithmResult> {
        let permit = self.gate.acquire().await.map_err(|e| NexusError::fatal(e.to_string()))?;
        permit.forget();
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NexusError::fatal("fork failed"));
        }
        Ok(AlgorithmData::Document(json!(null)))
    }

    async fn context_close(&self) -> NexusResult<()> {
        Ok(())
    }

    fn inputs(&self) -> RunInputs {
        RunInputs::new()
    }
}

#[tokio::test]
async fn test_forked_returns_before_forks_finish() {
    let gate = Arc::new(Semaphore::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let tracker = Arc::new(ForkTracker::new());

    let forks: Vec<Arc<dyn Algorithm>> = (0..3)
        .map(|i| {
            Arc::new(GatedFork {
                alias: format!("fork-{i}"),
                gate: gate.clone(),
                finished: finished.clone(),
                fail: i == 1,
            }) as Arc<dyn Algorithm>
        })
        .collect();

    let algorithm = ForkedAlgorithm::new(
        "main",
        Constant(7),
        vec![],
        Arc::new(InputCache::new()),
        metrics(),
        tracker.clone(),
        CancellationToken::new(),
    )
    .with_forks(forks);

    let result = algorithm.run(&TestFixtures::run_arguments()).await.unwrap();

    assert_eq!(result.as_document(), Some(&json!(7)));
    assert_eq!(tracker.pending(), 3);
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    gate.add_permits(3);
    let report = tracker.drain(Duration::from_secs(5)).await;

    assert_eq!(report.completed, 3);
    assert_eq!(finished.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_forks_stop_when_run_is_cancelled() {
    let token = CancellationToken::new();
    let tracker = Arc::new(ForkTracker::new());
    let finished = Arc::new(AtomicUsize::new(0));

    let fork: Arc<dyn Algorithm> = Arc::new(GatedFork {
        alias: "blocked".to_string(),
        gate: Arc::new(Semaphore::new(0)),
        finished: finished.clone(),
        fail: false,
    });

    let algorithm = ForkedAlgorithm::new(
        "main",
        Constant(1),
        vec![],
        Arc::new(InputCache::new()),
        metrics(),
        tracker.clone(),
        token.clone(),
    )
    .with_forks(vec![fork]);

    algorithm.run(&TestFixtures::run_arguments()).await.unwrap();
    token.cancel();
    let report = tracker.drain(Duration::from_secs(5)).await;

    assert_eq!(report.completed, 1);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

/// Reader that counts how often its table was read
struct CountingSource {
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl ReaderSource for CountingSource {
    async fn read_input(&self, _ctx: &ReaderContext) -> NexusResult<DataTable> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(TestFixtures::orders_table())
    }
}

fn reader_context(alias: &str) -> ReaderContext {
    ReaderContext::new(
        alias,
        Arc::new(vec![JobSocket::new(alias, "orders.json", "json")]),
        Arc::new(MockQueryStore::new()),
        metrics(),
        Arc::new(Default::default()),
    )
}

struct KeysOf;

#[async_trait]
impl AlgorithmBody for KeysOf {
    async fn run(&self, inputs: RunInputs) -> NexusResult<AlgorithmResult> {
        Ok(AlgorithmData::Document(json!(inputs.keys().collect::<Vec<_>>())))
    }
}

#[tokio::test]
async fn test_shared_reader_is_read_once_across_processors() {
    let reads = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(InputCache::new());
    let reader: Arc<dyn InputObject> = Arc::new(InputReader::new(
        CountingSource { reads: reads.clone() },
        reader_context("orders"),
    ));

    struct Rename(&'static str);

    #[async_trait]
    impl nexus::ProcessorBody for Rename {
        async fn process_input(&self, inputs: RunInputs) -> NexusResult<RunInputs> {
            Ok(inputs
                .into_iter()
                .map(|(key, value)| (format!("{}_{key}", self.0), value))
                .collect::<BTreeMap<_, _>>())
        }
    }

    let processors: Vec<Arc<dyn InputObject>> = vec![
        Arc::new(InputProcessor::new("daily", Rename("daily"), vec![reader.clone()], cache.clone())),
        Arc::new(InputProcessor::new("weekly", Rename("weekly"), vec![reader], cache.clone())),
    ];

    let algorithm = MinimalisticAlgorithm::new("keys", KeysOf, processors, cache, metrics());
    let result = algorithm.run(&TestFixtures::run_arguments()).await.unwrap();

    assert_eq!(result.as_document(), Some(&json!(["daily_orders", "weekly_orders"])));
    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert_eq!(algorithm.inputs().len(), 2);
}

#[tokio::test]
async fn test_colliding_processor_outputs_are_rejected() {
    struct Collide;

    #[async_trait]
    impl nexus::ProcessorBody for Collide {
        async fn process_input(&self, _inputs: RunInputs) -> NexusResult<RunInputs> {
            Ok(RunInputs::from([("orders".to_string(), TestFixtures::orders_table().into())]))
        }
    }

    let cache = Arc::new(InputCache::new());
    let processors: Vec<Arc<dyn InputObject>> = vec![
        Arc::new(InputProcessor::new("first", Collide, vec![], cache.clone())),
        Arc::new(InputProcessor::new("second", Collide, vec![], cache.clone())),
    ];

    let algorithm = MinimalisticAlgorithm::new("keys", KeysOf, processors, cache, metrics());

    match algorithm.run(&TestFixtures::run_arguments()).await {
        Err(NexusError::AmbiguousInput { key, first, second }) => {
            assert_eq!(key, "orders");
            assert_eq!(first, "first");
            assert_eq!(second, "second");
        }
        other => panic!("expected ambiguous input, got {other:?}"),
    }
}
