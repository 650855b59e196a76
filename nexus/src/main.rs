//! Entry point of the `nexus` binary
//!
//! Parses the job runtime's arguments, configures tracing from the
//! environment, runs one built-in algorithm and exits with the run's code.

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use nexus::{builtin, Nexus, NexusConfig, RETRY_EXIT_CODE};
use shared::logging::{self, TracingEndpoint};
use shared::{process_error, ProcessId, RunArguments};

/// Hosts a single algorithm run submitted by the job runtime
#[derive(Parser, Debug)]
#[command(name = "nexus")]
#[command(about = "Runs one algorithm request and submits its result")]
pub struct Args {
    /// URI of the run payload
    #[arg(long)]
    pub sas_uri: String,

    /// Id of the run, used for the result path and the submission
    #[arg(long)]
    pub request_id: String,

    /// Base URL of the job-control API that receives the result
    #[arg(long)]
    pub results_receiver: String,

    #[arg(long)]
    pub results_receiver_user: Option<String>,

    #[arg(long)]
    pub results_receiver_password: Option<String>,

    /// Ask the job runtime to sign the result
    #[arg(long, default_value_t = false)]
    pub sign_result: bool,
}

impl From<Args> for RunArguments {
    fn from(args: Args) -> Self {
        Self {
            sas_uri: args.sas_uri,
            request_id: args.request_id,
            results_receiver: args.results_receiver,
            results_receiver_user: args.results_receiver_user,
            results_receiver_password: args.results_receiver_password,
            sign_result: args.sign_result,
        }
    }
}

/// Cancel `token` on Ctrl+C or SIGTERM
fn watch_signals(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal"),
                        _ = terminate.recv() => logging::log_shutdown(ProcessId::current(), "Received SIGTERM"),
                    }
                }
                Err(err) => {
                    logging::log_error(ProcessId::current(), "Signal handling", &err);
                    return;
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(err) = tokio::signal::ctrl_c().await {
                logging::log_error(ProcessId::current(), "Signal handling", &err);
                return;
            }
            logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal");
        }
        token.cancel();
    });
}

async fn run(args: RunArguments, config: NexusConfig) -> anyhow::Result<i32> {
    let token = CancellationToken::new();
    watch_signals(token.clone());

    let nexus = Nexus::new(args, config.clone()).with_cancellation(token);
    let nexus = builtin::configure(nexus, &config).context("failed to configure the run")?;

    match nexus.activate().await {
        Ok(report) => Ok(report.exit_code),
        Err(e) => {
            process_error!(ProcessId::current(), "Run could not start: {}", e.chain());
            Ok(if e.is_transient() { RETRY_EXIT_CODE } else { 1 })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: RunArguments = Args::parse().into();
    ProcessId::init_nexus(&args.request_id);

    let config = NexusConfig::from_env().context("failed to read the run configuration")?;

    let endpoint = config
        .log_endpoint
        .clone()
        .map(|url| TracingEndpoint::new(url).with_algorithm(&config.algorithm_name));
    let sink = logging::init_tracing_with_endpoint_and_level(endpoint, Some(&config.log_level));

    let exit_code = run(args, config).await?;

    logging::flush_traces(sink.as_ref()).await;
    std::process::exit(exit_code);
}
