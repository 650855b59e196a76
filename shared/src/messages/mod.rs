//! Wire messages exchanged with the job-control API
//!
//! - `crystal`: run requests, run status and result submission bodies

pub mod crystal;

pub use crystal::{
    AlgorithmConfiguration, AlgorithmConfigurationEntry, AlgorithmRequest, AlgorithmRunResult,
    CreateRunResponse, RequestLifeCycleStage, RequestResult,
};
