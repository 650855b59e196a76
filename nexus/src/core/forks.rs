//! Bookkeeping for forked runs scheduled by the main algorithm

use futures_util::future::join_all;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use shared::{process_debug, process_warn, ProcessId};

/// How a bounded drain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub completed: usize,
    pub abandoned: usize,
}

/// Completion hook for fork tasks; the orchestrator drains it at teardown
#[derive(Default)]
pub struct ForkTracker {
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl ForkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, alias: impl Into<String>, handle: JoinHandle<()>) {
        self.lock().push((alias.into(), handle));
    }

    /// Forks registered and not yet drained
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Wait up to `bound` for every registered fork, aborting whatever is still running after it
    pub async fn drain(&self, bound: Duration) -> DrainReport {
        let handles: Vec<(String, JoinHandle<()>)> = std::mem::take(&mut *self.lock());
        if handles.is_empty() {
            return DrainReport::default();
        }

        let total = handles.len();
        let aborts: Vec<_> = handles.iter().map(|(alias, h)| (alias.clone(), h.abort_handle())).collect();

        match tokio::time::timeout(bound, join_all(handles.into_iter().map(|(_, h)| h))).await {
            Ok(_) => {
                process_debug!(ProcessId::current(), "All {} forks finished", total);
                DrainReport {
                    completed: total,
                    abandoned: 0,
                }
            }
            Err(_) => {
                let mut abandoned = 0;
                for (alias, abort) in aborts {
                    if !abort.is_finished() {
                        process_warn!(ProcessId::current(), "Fork {} did not finish within {:?}, aborting", alias, bound);
                        abort.abort();
                        abandoned += 1;
                    }
                }
                DrainReport {
                    completed: total - abandoned,
                    abandoned,
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, JoinHandle<()>)>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_waits_for_finished_forks() {
        let tracker = ForkTracker::new();
        tracker.register("quick", tokio::spawn(async {}));
        tracker.register("short", tokio::spawn(tokio::time::sleep(Duration::from_millis(10))));

        let report = tracker.drain(Duration::from_secs(1)).await;

        assert_eq!(report, DrainReport { completed: 2, abandoned: 0 });
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn test_drain_is_bounded() {
        let tracker = ForkTracker::new();
        tracker.register("stuck", tokio::spawn(tokio::time::sleep(Duration::from_secs(60))));
        tracker.register("quick", tokio::spawn(async {}));

        let report = tracker.drain(Duration::from_millis(50)).await;

        assert_eq!(report, DrainReport { completed: 1, abandoned: 1 });
    }
}
