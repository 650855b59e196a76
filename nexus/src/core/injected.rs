//! Typed values handed to factories: payloads and configuration sections

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{NexusError, NexusResult};

/// Map from type to a single shared instance of it
#[derive(Default, Clone)]
pub struct InjectedValues {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl InjectedValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, replacing an earlier value of the same type
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> NexusResult<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
            .ok_or(NexusError::MissingInjection {
                type_name: type_name::<T>(),
            })
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
