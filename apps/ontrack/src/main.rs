//! Skywave OnTrack - the audio engine's track-transition hook.
//!
//! The engine spawns this binary on every track start with the filename
//! and source queue as arguments. It records the play, refreshes the
//! public snapshot in-process, and exits. The engine treats slow hooks as
//! a hazard to streaming, so the whole process — store open included —
//! runs under one hard deadline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use skywave_core::bootstrap::bootstrap_recorder;
use skywave_core::constants::ON_TRACK_DEADLINE;
use skywave_core::{RadioConfig, Recorder};

/// Skywave OnTrack - record a track start and refresh now-playing.
#[derive(Parser, Debug)]
#[command(name = "skywave-ontrack")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Absolute path of the track that just started.
    filename: String,

    /// Engine queue the track came from (override, breaks, music).
    queue: String,

    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", env = "SKYWAVE_CONFIG")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "warn", env = "SKYWAVE_LOG_LEVEL")]
    log_level: log::LevelFilter,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    let config = RadioConfig::load(&args.config).context("Failed to load configuration")?;

    // One deadline for everything the engine waits on, wiring included.
    // The store open can stall on WAL lock contention with the daemon;
    // that wait counts against the budget, not on top of it.
    let deadline = tokio::time::Instant::now() + ON_TRACK_DEADLINE;

    // The record half must land; a timeout before the row is written is a
    // real failure the engine should see.
    let recorder: Arc<Recorder> =
        match tokio::time::timeout_at(deadline, record(config, &args)).await {
            Ok(Ok(recorder)) => recorder,
            Ok(Err(e)) => {
                log::error!("on_track failed: {e}");
                return Err(e.into());
            }
            Err(_) => {
                bail!(
                    "on_track budget of {}ms exhausted before the play was recorded",
                    ON_TRACK_DEADLINE.as_millis()
                );
            }
        };

    // The export half is best-effort within whatever budget remains: the
    // row is durable and the fallback export keeps the snapshot fresh.
    if tokio::time::timeout_at(deadline, recorder.refresh_snapshot())
        .await
        .is_err()
    {
        log::warn!("snapshot refresh exceeded the hook budget; the fallback will catch up");
    }
    Ok(())
}

/// Wires the minimal recorder and writes the play-history row.
async fn record(config: RadioConfig, args: &Args) -> skywave_core::RadioResult<Arc<Recorder>> {
    let recorder = bootstrap_recorder(config).await?;
    recorder.record_start(&args.filename, &args.queue).await?;
    Ok(recorder)
}
