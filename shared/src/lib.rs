//! Shared types for the Nexus run harness
//!
//! Contains the pieces that both the harness library and its binary need
//! without pulling in the run lifecycle: job-control wire models, run
//! arguments, data sockets, process identity and tracing setup.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod sockets;
pub mod types;

pub use errors::*;
pub use sockets::{DataPath, JobSocket};
pub use types::*;

// Re-export job-control API wire models
pub use messages::{AlgorithmRequest, AlgorithmRunResult, RequestLifeCycleStage, RequestResult};
