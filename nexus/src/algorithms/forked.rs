//! Algorithm that returns a main result and then fires off forked runs
//!
//! Forks are spawned tasks. The parent waits until every fork task has been
//! scheduled, never for its result. Fork failures are logged where the fork
//! runs and do not reach the parent.

use async_trait::async_trait;
use futures_util::future::join_all;
use shared::{process_error, process_info, process_warn, ProcessId, RunArguments};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::minimalistic::AlgorithmBody;
use super::{Algorithm, AlgorithmBase, AlgorithmState};
use crate::core::cache::InputCache;
use crate::core::data::{AlgorithmResult, RunInputs};
use crate::core::forks::ForkTracker;
use crate::error::NexusResult;
use crate::input::InputObject;
use crate::traits::MetricsProvider;

pub struct ForkedAlgorithm<B: AlgorithmBody> {
    base: AlgorithmBase,
    body: B,
    forks: Vec<Arc<dyn Algorithm>>,
    tracker: Arc<ForkTracker>,
    cancellation: CancellationToken,
}

impl<B: AlgorithmBody> ForkedAlgorithm<B> {
    pub fn new(
        alias: impl Into<String>,
        body: B,
        processors: Vec<Arc<dyn InputObject>>,
        cache: Arc<InputCache>,
        metrics: Arc<dyn MetricsProvider>,
        tracker: Arc<ForkTracker>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            base: AlgorithmBase::new(alias, processors, cache, metrics),
            body,
            forks: Vec::new(),
            tracker,
            cancellation,
        }
    }

    pub fn with_forks(mut self, forks: Vec<Arc<dyn Algorithm>>) -> Self {
        self.forks = forks;
        self
    }

    /// Spawn every fork and wait until each task has started
    async fn schedule_forks(&self, args: &RunArguments) {
        if self.forks.is_empty() {
            process_info!(
                ProcessId::current(),
                "Algorithm {} supports forks but none were attached, main run only",
                self.base.alias()
            );
            return;
        }

        let names: Vec<&str> = self.forks.iter().map(|fork| fork.alias()).collect();
        process_info!(
            ProcessId::current(),
            "Scheduling forks of {}: {}",
            self.base.alias(),
            names.join(",")
        );

        let mut acks = Vec::with_capacity(self.forks.len());
        for fork in &self.forks {
            let alias = fork.alias().to_string();
            let (scheduled, ack) = oneshot::channel();
            let handle = tokio::spawn(run_fork(
                fork.clone(),
                args.clone(),
                self.cancellation.child_token(),
                scheduled,
            ));
            self.tracker.register(alias.clone(), handle);
            acks.push(async move { (alias, ack.await) });
        }

        for (alias, ack) in join_all(acks).await {
            if ack.is_err() {
                process_warn!(ProcessId::current(), "Fork {} ended before acknowledging its schedule", alias);
            }
        }
    }
}

async fn run_fork(
    fork: Arc<dyn Algorithm>,
    args: RunArguments,
    cancellation: CancellationToken,
    scheduled: oneshot::Sender<()>,
) {
    let _ = scheduled.send(());

    tokio::select! {
        _ = cancellation.cancelled() => {
            process_warn!(ProcessId::current(), "Fork {} cancelled", fork.alias());
        }
        outcome = execute(fork.as_ref(), &args) => {
            if let Err(e) = outcome {
                process_error!(ProcessId::current(), "Fork {} failed: {}", fork.alias(), e.chain());
            }
        }
    }
}

async fn execute(fork: &dyn Algorithm, args: &RunArguments) -> NexusResult<()> {
    fork.context_open().await?;
    let outcome = fork.run(args).await;
    let closed = fork.context_close().await;
    outcome?;
    closed
}

#[async_trait]
impl<B: AlgorithmBody> Algorithm for ForkedAlgorithm<B> {
    fn alias(&self) -> &str {
        self.base.alias()
    }

    async fn context_open(&self) -> NexusResult<()> {
        self.base.set_state(AlgorithmState::ContextOpened);
        Ok(())
    }

    async fn run(&self, args: &RunArguments) -> NexusResult<AlgorithmResult> {
        let inputs = self.base.resolve_inputs(args).await?;
        let result = self.base.measured(self.body.run(inputs)).await?;
        self.schedule_forks(args).await;
        Ok(result)
    }

    async fn context_close(&self) -> NexusResult<()> {
        self.base.set_state(AlgorithmState::ContextClosed);
        Ok(())
    }

    fn inputs(&self) -> RunInputs {
        self.base.inputs()
    }
}
