//! In-memory memoization of input resolution
//!
//! Each cache key owns a single-flight slot. The first caller to reach an
//! empty slot runs the object's acquisition protocol; every other caller for
//! that key, in the same batch or a concurrent one, awaits the same outcome.
//! Successful values live for the rest of the process. Failed slots are
//! dropped after the batch so a later batch can try again.

use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

use shared::{process_debug, ProcessId, RunArguments};

use crate::core::data::{AlgorithmData, RunInputs};
use crate::error::{NexusError, NexusResult};
use crate::input::InputObject;

type Outcome = Result<AlgorithmData, Arc<NexusError>>;
type Slot = Arc<OnceCell<Outcome>>;

#[derive(Default)]
pub struct InputCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl InputCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every object and return their values keyed by alias.
    ///
    /// Objects whose key is already cached are not invoked. All uncached
    /// objects run concurrently; the call returns only after every one of them
    /// finished. If any failed, the error of the first failing alias (in alias
    /// order) is returned, wrapped with that alias.
    pub async fn resolve(&self, objects: &[Arc<dyn InputObject>], args: &RunArguments) -> NexusResult<RunInputs> {
        let mut aliases = HashSet::new();
        for object in objects {
            if !aliases.insert(object.alias()) {
                return Err(NexusError::DuplicateAlias {
                    alias: object.alias().to_string(),
                });
            }
        }

        let slots: Vec<(String, Slot)> = {
            let mut guard = self.lock();
            objects
                .iter()
                .map(|object| {
                    let key = object.cache_key();
                    let slot = guard.entry(key.clone()).or_default().clone();
                    (key, slot)
                })
                .collect()
        };

        let outcomes = join_all(objects.iter().zip(slots.iter()).map(|(object, (_, slot))| async move {
            slot.get_or_init(|| acquire(object.as_ref(), args)).await
        }))
        .await;

        let mut resolved: BTreeMap<&str, (&str, &Slot, &Outcome)> = BTreeMap::new();
        for ((object, (key, slot)), outcome) in objects.iter().zip(slots.iter()).zip(outcomes) {
            resolved.insert(object.alias(), (key.as_str(), slot, outcome));
        }

        self.evict_failures(resolved.values().map(|(key, slot, outcome)| (*key, *slot, *outcome)));

        let mut inputs = RunInputs::new();
        for (alias, (_, _, outcome)) in resolved {
            match outcome {
                Ok(value) => {
                    inputs.insert(alias.to_string(), value.clone());
                }
                Err(error) => return Err(NexusError::for_input(alias, error.clone())),
            }
        }

        Ok(inputs)
    }

    /// Number of successfully resolved keys
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| matches!(slot.get(), Some(Ok(_))))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<AlgorithmData> {
        match self.lock().get(key).and_then(|slot| slot.get()) {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn evict_failures<'a>(&self, outcomes: impl Iterator<Item = (&'a str, &'a Slot, &'a Outcome)>) {
        let mut guard = self.lock();
        for (key, slot, outcome) in outcomes {
            if outcome.is_err() && guard.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
                guard.remove(key);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // The map is only touched in short synchronous sections, a poisoned lock still holds valid slots
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// open → process → close; close runs whenever open succeeded
async fn acquire(object: &dyn InputObject, args: &RunArguments) -> Outcome {
    process_debug!(ProcessId::current(), "Resolving input {}", object.alias());

    object.open().await.map_err(Arc::new)?;
    let processed = object.process(args).await;
    let closed = object.close().await;

    match (processed, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(error), _) | (Ok(_), Err(error)) => Err(Arc::new(error)),
    }
}
