//! Tracing setup and process-aware logging helpers shared by every Nexus binary
//!
//! Besides stdout, events emitted through the `process_*` macros can be
//! shipped to an HTTP log sink. Each shipped event names the run's request id
//! and algorithm so a collector can group them without parsing messages.

use crate::types::ProcessId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn, Event, Subscriber};
use tracing_subscriber::layer::Context;

/// Fields the `process_*` macros add to every event; the sink carries them as run tags instead
const MACRO_FIELDS: [&str; 2] = ["process", "timestamp"];

/// Remote log sink configuration
#[derive(Debug, Clone)]
pub struct TracingEndpoint {
    pub url: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Algorithm name attached to every shipped event
    pub algorithm: Option<String>,
}

impl TracingEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            batch_size: 20,
            flush_interval: Duration::from_secs(1),
            algorithm: None,
        }
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }
}

/// Log event as posted to the remote sink
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunLogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    pub fields: Map<String, Value>,
}

impl RunLogEvent {
    /// Event stamped now and tagged with the request id of the current Nexus process
    pub fn new(
        level: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
        algorithm: Option<String>,
        fields: Map<String, Value>,
    ) -> Self {
        let request_id = match ProcessId::current() {
            ProcessId::Nexus(request_id) => Some(request_id.clone()),
            ProcessId::Standalone => None,
        };
        Self {
            timestamp: Utc::now(),
            level: level.into(),
            target: target.into(),
            message: message.into(),
            request_id,
            algorithm,
            fields,
        }
    }
}

enum SinkCommand {
    Event(RunLogEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle to the task that batches events and posts them as JSON arrays
#[derive(Clone)]
pub struct LogSink {
    commands: mpsc::UnboundedSender<SinkCommand>,
}

impl LogSink {
    /// Must be called from within a tokio runtime; the batching task is spawned on it.
    pub fn spawn(endpoint: TracingEndpoint) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_sink(endpoint, receiver));
        Self { commands }
    }

    pub fn record(&self, event: RunLogEvent) {
        let _ = self.commands.send(SinkCommand::Event(event));
    }

    /// Post everything buffered so far; false if the sink did not confirm within `bound`
    pub async fn flush(&self, bound: Duration) -> bool {
        let (done, confirmed) = oneshot::channel();
        if self.commands.send(SinkCommand::Flush(done)).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(bound, confirmed).await, Ok(Ok(())))
    }
}

async fn run_sink(endpoint: TracingEndpoint, mut commands: mpsc::UnboundedReceiver<SinkCommand>) {
    let client = reqwest::Client::new();
    let mut batch = Vec::with_capacity(endpoint.batch_size);
    let mut ticker = tokio::time::interval(endpoint.flush_interval);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SinkCommand::Event(event)) => {
                    batch.push(event);
                    if batch.len() >= endpoint.batch_size {
                        post_batch(&client, &endpoint.url, &mut batch).await;
                    }
                }
                Some(SinkCommand::Flush(done)) => {
                    post_batch(&client, &endpoint.url, &mut batch).await;
                    let _ = done.send(());
                }
                None => {
                    post_batch(&client, &endpoint.url, &mut batch).await;
                    break;
                }
            },
            _ = ticker.tick() => post_batch(&client, &endpoint.url, &mut batch).await,
        }
    }
}

async fn post_batch(client: &reqwest::Client, url: &str, batch: &mut Vec<RunLogEvent>) {
    if batch.is_empty() {
        return;
    }
    let events = std::mem::take(batch);

    // stderr only: logging a sink failure through tracing would feed it back into the sink
    match client.post(url).json(&events).send().await {
        Ok(response) if !response.status().is_success() => {
            eprintln!("log sink rejected {} events: HTTP {}", events.len(), response.status());
        }
        Ok(_) => {}
        Err(e) => eprintln!("log sink unreachable, dropped {} events: {e}", events.len()),
    }
}

/// Layer that ships events from the `process_*` macros to a [`LogSink`]
pub struct HttpTracingLayer {
    sink: LogSink,
    algorithm: Option<String>,
}

impl HttpTracingLayer {
    pub fn new(sink: LogSink, algorithm: Option<String>) -> Self {
        Self { sink, algorithm }
    }
}

impl<S> tracing_subscriber::Layer<S> for HttpTracingLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        if !collector.fields.contains_key("process") {
            return;
        }
        for field in MACRO_FIELDS {
            collector.fields.remove(field);
        }

        let metadata = event.metadata();
        self.sink.record(RunLogEvent::new(
            metadata.level().to_string(),
            metadata.target(),
            collector.message,
            self.algorithm.clone(),
            collector.fields,
        ));
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn insert(&mut self, field: &tracing::field::Field, value: Value) {
        match (field.name(), value) {
            ("message", Value::String(text)) => self.message = text,
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl tracing::field::Visit for FieldCollector {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }
}

/// Filter directive for the current process at `base_level`
pub fn level_filter(base_level: &str) -> String {
    match ProcessId::current() {
        ProcessId::Nexus(_) => {
            format!("nexus={base_level},shared={base_level},reqwest=warn,hyper=warn")
        }
        ProcessId::Standalone => format!("shared={base_level}"),
    }
}

/// Initialize the global subscriber: stdout always, plus the HTTP sink when `endpoint` is set.
///
/// `ProcessId::init_nexus` should run first so the filter targets the nexus crate
/// and shipped events carry the request id. Calling this twice is harmless; the
/// second subscriber is discarded. Returns the sink so the caller can flush it.
pub fn init_tracing_with_endpoint_and_level(
    endpoint: Option<TracingEndpoint>,
    log_level: Option<&str>,
) -> Option<LogSink> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = level_filter(log_level.unwrap_or("info"));
    let env_filter = EnvFilter::new(&filter);

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let sink = endpoint.map(|endpoint| {
        let algorithm = endpoint.algorithm.clone();
        (LogSink::spawn(endpoint), algorithm)
    });
    let http_layer = sink
        .as_ref()
        .map(|(sink, algorithm)| HttpTracingLayer::new(sink.clone(), algorithm.clone()));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(http_layer)
        .with(fmt_layer)
        .try_init();

    sink.map(|(sink, _)| sink)
}

/// Initialize stdout tracing at `info`
pub fn init_tracing() {
    let _ = init_tracing_with_endpoint_and_level(None, None);
}

/// Post whatever the HTTP sink still buffers before the runtime goes away
pub async fn flush_traces(sink: Option<&LogSink>) {
    if let Some(sink) = sink {
        if !sink.flush(Duration::from_secs(5)).await {
            eprintln!("log sink did not confirm the final flush");
        }
    }
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for process-aware info logging
#[macro_export]
macro_rules! process_info {
    ($process_id:expr, $($arg:tt)*) => {
        tracing::info!(
            process = %$process_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware warning logging
#[macro_export]
macro_rules! process_warn {
    ($process_id:expr, $($arg:tt)*) => {
        tracing::warn!(
            process = %$process_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware error logging
#[macro_export]
macro_rules! process_error {
    ($process_id:expr, $($arg:tt)*) => {
        tracing::error!(
            process = %$process_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware debug logging
#[macro_export]
macro_rules! process_debug {
    ($process_id:expr, $($arg:tt)*) => {
        tracing::debug!(
            process = %$process_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

pub fn log_startup(process_id: &ProcessId, details: &str) {
    info!(
        process = %process_id,
        timestamp = format_timestamp(),
        "Starting {}",
        details
    );
}

pub fn log_shutdown(process_id: &ProcessId, reason: &str) {
    info!(
        process = %process_id,
        timestamp = format_timestamp(),
        "Shutting down: {}",
        reason
    );
}

pub fn log_error(process_id: &ProcessId, context: &str, error: &dyn std::fmt::Display) {
    error!(
        process = %process_id,
        timestamp = format_timestamp(),
        error = %error,
        "{} failed: {}",
        context,
        error
    );
}

/// Best-effort side channels (telemetry, forks) report through here and carry on
pub fn log_degraded(process_id: &ProcessId, context: &str, error: &dyn std::fmt::Display) {
    warn!(
        process = %process_id,
        timestamp = format_timestamp(),
        error = %error,
        "{} skipped: {}",
        context,
        error
    );
}
