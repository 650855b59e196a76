//! Nexus: a harness that hosts one algorithm run for a job runtime
//!
//! Readers and processors feed an algorithm through a memoizing input cache.
//! The orchestrator classifies the outcome, submits it to the job-control
//! API, records telemetry and shuts down cleanly on cancellation.

pub mod algorithms;
pub mod builtin;
pub mod config;
pub mod core;
pub mod error;
pub mod input;
pub mod nexus;
pub mod services;
pub mod telemetry;
pub mod traits;

// Re-export commonly used types
pub use algorithms::{
    Algorithm, AlgorithmBody, DistributedAlgorithm, DistributedBody, ForkedAlgorithm, MinimalisticAlgorithm,
    RecursiveAlgorithm, RecursiveBody, RemoteAlgorithm,
};
pub use config::{NexusConfig, Registry};
pub use crate::core::{AlgorithmData, AlgorithmResult, DataTable, InputCache, RunInputs};
pub use error::{FailureKind, NexusError, NexusResult};
pub use input::{AlgorithmPayload, InputObject, InputProcessor, InputReader, NexusConfiguration, ProcessorBody, ReaderSource};
pub use nexus::{Nexus, NexusContext, NexusServices, RunOutcome, RunReport, RETRY_EXIT_CODE};
pub use telemetry::{TelemetryRecorder, UserTelemetryRecorder};
pub use traits::{JobControlApi, MetricsProvider, PayloadReader, QueryStore, StorageClient};
