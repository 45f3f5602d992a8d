//! Skywave Server - supervisor daemon for the radio control plane.
//!
//! Runs the scheduler triggers, the drop-in watcher, and the push fan-out
//! HTTP server around one shared set of bootstrapped services. The audio
//! engine and streaming server run as separate system services.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use skywave_core::constants::SHUTDOWN_GRACE;
use skywave_core::{bootstrap_services, drops, start_server, AppState, RadioConfig};
use tokio::signal;

/// Skywave Server - 24/7 automated radio orchestrator.
#[derive(Parser, Debug)]
#[command(name = "skywave-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", env = "SKYWAVE_CONFIG")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SKYWAVE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Push fan-out port (overrides config file).
    #[arg(short = 'p', long, env = "SKYWAVE_PUSH_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Skywave Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = RadioConfig::load(&args.config).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.push.port = port;
    }
    log::info!(
        "Configuration: station={}, base={}, push_port={}",
        config.station.name,
        config.paths.base.display(),
        config.push.port
    );

    let services = bootstrap_services(config)
        .await
        .context("Failed to bootstrap services")?;
    log::info!("Services bootstrapped successfully");

    // Drop-in watcher: operator overrides and control files.
    let (watcher, drop_events) = drops::DropWatcher::new(&services.config)
        .context("Failed to start drop-in watcher")?;
    let drops_handle = drops::spawn_processor(
        services.config.clone(),
        services.engine.clone(),
        drop_events,
    );

    // Scheduler triggers.
    let mut task_handles = services.start_background_tasks();
    log::info!("Background tasks started");

    // Push fan-out server on the main runtime.
    let app_state = AppState {
        broadcaster: services.broadcaster.clone(),
        config: services.config.clone(),
    };
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {e}");
        }
    });

    // Wait for shutdown signal.
    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");

    // Clients see "restarting" before anything stops; the streaming
    // server shifts listeners to the fallback mount while we are gone.
    services
        .shutdown("Skywave is restarting; you may hear the backup stream briefly.")
        .await;

    // Give running tasks a grace window to reach a clean boundary.
    let drain = async {
        for handle in task_handles.drain(..) {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        log::warn!("Tasks did not stop within grace window; terminating");
    }

    drop(watcher);
    drops_handle.abort();
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
