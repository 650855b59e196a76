//! Best-effort recording of run inputs and user-defined telemetry
//!
//! Nothing recorded here can fail a run: every failure is logged as a
//! degraded condition and dropped.

pub mod recorder;
pub mod user;

pub use recorder::{TelemetryRecorder, DEFAULT_TELEMETRY_TIMEOUT};
pub use user::{UserTelemetryRecorder, USER_TELEMETRY_METRIC};
