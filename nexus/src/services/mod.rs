//! Production implementations of the collaborator traits

pub mod job_control;
pub mod metrics;
pub mod payload_reader;
pub mod query_store;
pub mod storage;

#[cfg(test)]
mod tests;

pub use job_control::CrystalClient;
pub use metrics::{timed, NullMetricsProvider, TracingMetricsProvider};
pub use payload_reader::HttpPayloadReader;
pub use query_store::FileQueryStore;
pub use storage::{HttpStorageClient, LocalStorageClient};
