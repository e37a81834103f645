//! havoc-monkey binary entry point.
//!
//! Usage:
//! ```bash
//! havoc-monkey --config havoc.toml
//! havoc-monkey --help
//! ```
//!
//! Runs until Ctrl+C, then rolls back every recorded change and exits 0.
//! Exits 1 on a configuration error, 2 if the signal handler cannot be
//! installed.

use anyhow::{Context, Result};
use clap::Parser;
use havoc_device::SshConnector;
use havoc_monkey::config::{Config, LogFormat};
use havoc_monkey::http::{build_router, serve};
use havoc_monkey::telemetry::spawn_ingest_task;
use havoc_monkey::{spawn_scheduler, Engine};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

/// Randomized, reversible network fault injection.
#[derive(Parser, Debug)]
#[command(name = "havoc-monkey")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, default_value = "havoc.toml")]
    config: PathBuf,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("havoc-monkey: {}", e);
            return ExitCode::from(1);
        }
    };
    init_tracing(config.logging.format);
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id);

    match run(config).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let fleet = config.fleet();
    tracing::info!(devices = fleet.len(), "Fleet loaded");

    let engine = Arc::new(Engine::new(
        fleet,
        Arc::new(SshConnector::default()),
        config.engine_options(),
    ));

    let (ingest_tx, ingest_rx) = mpsc::channel(config.telemetry.channel_capacity);
    let ingest = spawn_ingest_task(engine.telemetry().clone(), ingest_rx);

    let http = if config.http.enabled {
        let listener = tokio::net::TcpListener::bind(&config.http.bind_address)
            .await
            .with_context(|| format!("Failed to bind {}", config.http.bind_address))?;
        tracing::info!(address = %config.http.bind_address, "HTTP listening");
        let router = build_router(engine.clone(), ingest_tx.clone());
        let shutdown = {
            let engine = engine.clone();
            async move { engine.cancelled().await }
        };
        Some(tokio::spawn(serve(listener, router, shutdown)))
    } else {
        None
    };
    drop(ingest_tx);

    let scheduler = spawn_scheduler(engine.clone());

    // Roll back even if the handler failed.
    let signal = tokio::signal::ctrl_c().await;
    if signal.is_ok() {
        tracing::info!("Interrupt received, shutting down");
    }

    engine.cancel();
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Chaos loop task failed");
    }

    let summary = engine.rollback().await;
    if summary.failed > 0 {
        tracing::warn!(failed = summary.failed, "Some changes could not be reverted");
    }

    if let Some(http) = http {
        match http.await {
            Ok(Err(e)) => tracing::warn!(error = %e, "HTTP server error"),
            Err(e) => tracing::warn!(error = %e, "HTTP task failed"),
            Ok(Ok(())) => {}
        }
    }
    if let Err(e) = ingest.await {
        tracing::warn!(error = %e, "Telemetry ingest task failed");
    }

    signal.context("Failed to listen for Ctrl+C")?;
    tracing::info!("Done");
    Ok(())
}
