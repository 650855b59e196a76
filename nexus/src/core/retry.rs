//! Exponential backoff for transient collaborator failures

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use shared::{process_warn, ProcessId};

use crate::error::NexusResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_ms: u64,
    /// Upper bound of a single delay
    pub max_ms: u64,
    /// Total time after which the last error is returned
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: 250,
            max_ms: 4_000,
            max_elapsed: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits, for tests
    pub fn immediate(max_elapsed: Duration) -> Self {
        Self {
            base_ms: 0,
            max_ms: 0,
            max_elapsed,
        }
    }

    /// Delay before retry number `attempt` (0-based), jittered into 75-100% of the capped exponential
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = exp.min(self.max_ms);
        if capped == 0 {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(0..=capped / 2);
        Duration::from_millis(capped - capped / 4 + jitter / 2)
    }

    /// Run `operation` until it succeeds, fails fatally, or the budget runs out.
    ///
    /// Only transient errors are retried.
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> NexusResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = NexusResult<T>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transient() => return Err(error),
                Err(error) => {
                    let delay = self.delay(attempt);
                    if started.elapsed() + delay > self.max_elapsed {
                        return Err(error);
                    }
                    process_warn!(
                        ProcessId::current(),
                        "{} failed (attempt {}), retrying in {:?}: {}",
                        name,
                        attempt + 1,
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
