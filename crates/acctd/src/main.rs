//! Accounting-record shipping daemon: wires the refresh-deadline scheduler
//! (C1), ring consumer and record decorator (C2/C3), aggregation cache (C4),
//! and publication engine (C5) into one running broker plugin.

use acct_broker::{dump_schema_to_file, ResilientBrokerBuilder, StdoutBrokerClient};
use acct_ingest::RingConsumer;
use acct_ring::Config as RingConfig;
use acctd::config::{build_decorator_pipeline, Args, DaemonConfig};
use acctd::daemon;
use acctd::error::DaemonError;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "fatal error; exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), DaemonError> {
    let config = DaemonConfig::from_args(&args)?;
    let decorators = build_decorator_pipeline(&args)?;

    // One-shot schema dump at startup (§4.5, §6, §7): failure is fatal.
    if let Some(path) = &config.schema_output_file {
        dump_schema_to_file(path).map_err(|source| DaemonError::SchemaDump {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "schema dumped");
    }

    let ring_config = RingConfig::new(config.ring_bits, config.max_producers, false);
    let (_factory, receiver) = acct_stream::channel(ring_config);
    let consumer = RingConsumer::new(receiver);

    let shutdown = daemon::spawn_ctrl_c_shutdown();
    let verbose = args.log_level == "debug" || args.log_level == "trace";

    match (config.retry.clone(), config.circuit_breaker.clone()) {
        (Some(retry), Some(cb)) => {
            let client = ResilientBrokerBuilder::new(StdoutBrokerClient::new(verbose))
                .with_retry(retry)
                .with_circuit_breaker(cb)
                .build_with_retry_and_circuit_breaker();
            daemon::run(config, client, decorators, consumer, shutdown).await
        }
        (Some(retry), None) => {
            let client = ResilientBrokerBuilder::new(StdoutBrokerClient::new(verbose))
                .with_retry(retry)
                .build_retry_only();
            daemon::run(config, client, decorators, consumer, shutdown).await
        }
        (None, Some(cb)) => {
            let client = ResilientBrokerBuilder::new(StdoutBrokerClient::new(verbose))
                .with_circuit_breaker(cb)
                .build_circuit_breaker_only();
            daemon::run(config, client, decorators, consumer, shutdown).await
        }
        (None, None) => daemon::run(config, StdoutBrokerClient::new(verbose), decorators, consumer, shutdown).await,
    }
}

fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
