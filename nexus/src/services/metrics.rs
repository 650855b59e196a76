//! Metrics providers and the run-time measurement helper

use std::future::Future;
use std::time::{Duration, Instant};

use shared::{process_debug, process_info, ProcessId};

use crate::traits::MetricsProvider;

/// Emits measurements as structured tracing events
#[derive(Debug, Default, Clone)]
pub struct TracingMetricsProvider;

impl MetricsProvider for TracingMetricsProvider {
    fn timing(&self, metric: &str, elapsed: Duration, tag: &str) {
        process_info!(
            ProcessId::current(),
            metric = metric,
            tag = tag,
            elapsed_ms = elapsed.as_millis() as u64,
            "Finished {} for {} in {:.2}s",
            metric,
            tag,
            elapsed.as_secs_f64()
        );
    }

    fn count(&self, metric: &str, value: u64, tag: &str) {
        process_debug!(ProcessId::current(), metric = metric, tag = tag, value = value, "{} += {}", metric, value);
    }
}

/// Drops every measurement
#[derive(Debug, Default, Clone)]
pub struct NullMetricsProvider;

impl MetricsProvider for NullMetricsProvider {
    fn timing(&self, _metric: &str, _elapsed: Duration, _tag: &str) {}

    fn count(&self, _metric: &str, _value: u64, _tag: &str) {}
}

/// Await `future` and report how long it took as `metric`, tagged with `tag`.
///
/// The timing is reported whether the future succeeded or not.
pub async fn timed<F: Future>(metrics: &dyn MetricsProvider, metric: &str, tag: &str, future: F) -> F::Output {
    let started = Instant::now();
    let output = future.await;
    metrics.timing(metric, started.elapsed(), tag);
    output
}
