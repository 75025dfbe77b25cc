//! CO2 Monitor Service - acquisition, HTTP endpoint and cloud uploader.
//!
//! Run with: `cargo run -p co2mon-service -- [CONFIG]`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use co2mon_core::Co2Monitor;
use co2mon_service::{AppState, Config, UploadError, Uploader, api};

/// CO2 Monitor Service - background acquisition, HTTP endpoint and uploader.
#[derive(Parser, Debug)]
#[command(name = "co2mon-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: ./co2mon.toml if present).
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Observation interval in seconds (overrides config).
    #[arg(short, long)]
    interval: Option<u64>,

    /// Disable the cloud uploader.
    #[arg(long)]
    no_upload: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("co2mon_service={}", level).parse()?)
                .add_directive(format!("co2mon_core={}", level).parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(interval) = args.interval {
        config.device.monitoring_cycle_seconds = interval;
    }
    if args.no_upload && config.upload.take().is_some() {
        info!("Cloud upload disabled by --no-upload");
    }
    config.validate()?;

    // Open the device and start acquisition
    let options = config.device.poll_options();
    let mut monitor = tokio::task::spawn_blocking(move || Co2Monitor::open_with_options(options))
        .await?
        .context("Failed to open the CO2 monitor")?;
    monitor.start_monitoring(config.device.monitoring_interval())?;

    let state = AppState::with_liveness(monitor.store(), monitor.metrics(), monitor.liveness());

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let uploader = match &config.upload {
        Some(upload) => {
            let uploader = Uploader::new(upload)?;
            Some(tokio::spawn(
                uploader.run(monitor.store(), cancel.child_token()),
            ))
        }
        None => {
            info!("No [upload] section configured, cloud upload disabled");
            None
        }
    };

    // Run the server
    let addr: SocketAddr = config.server.bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting server on {}", addr);
    let app = api::app(Arc::clone(&state));
    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_cancel.cancelled_owned())
            .await
    });

    let outcome = wait_for_shutdown(&cancel, uploader).await;

    info!("Shutting down");
    if let Err(e) = server.await? {
        warn!("Server error during shutdown: {}", e);
    }
    tokio::task::spawn_blocking(move || monitor.close()).await?;

    outcome
}

/// Wait until a signal arrives or the uploader gives up.
async fn wait_for_shutdown(
    cancel: &CancellationToken,
    uploader: Option<JoinHandle<Result<(), UploadError>>>,
) -> anyhow::Result<()> {
    let Some(task) = uploader else {
        cancel.cancelled().await;
        return Ok(());
    };
    // The uploader returns Ok(()) once `cancel` fires.
    let result = task.await;
    cancel.cancel();
    Ok(result??)
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
    cancel.cancel();
}
