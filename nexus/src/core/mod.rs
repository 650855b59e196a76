//! Core building blocks of a run
//!
//! Data values, input memoization, serialization, retries and fork
//! bookkeeping. Nothing here talks to an external system directly.

pub mod cache;
pub mod data;
pub mod forks;
pub mod injected;
pub mod retry;
pub mod serialization;

pub use cache::InputCache;
pub use data::{require_table, AlgorithmData, AlgorithmResult, DataKind, DataTable, RunInputs};
pub use forks::{DrainReport, ForkTracker};
pub use injected::InjectedValues;
pub use retry::RetryPolicy;
pub use serialization::{SerializationFormat, Serializer};
