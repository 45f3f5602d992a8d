//! Drop-in watcher: the operator's filesystem control surfaces.
//!
//! Three surfaces under `drops/`:
//!
//! - `queue/`: a new file is an operator override. It is moved into
//!   `processed/` FIRST and pushed to the engine from its new path; pushing
//!   the original path and then moving it races the engine's open.
//! - `force_break/trigger`: the file's presence is the force-break flag.
//!   The scheduler reads it; only the recorder (seeing a break actually
//!   start) removes it. The watcher just logs the touch.
//! - `kill_generation`: presence is observed directly by break generation.
//!
//! # Design
//!
//! - **Debounced events**: rapid copies coalesce before we act
//! - **Non-blocking**: the debouncer callback only forwards on a channel;
//!   a processor task does the moves and engine pushes

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use notify::event::CreateKind;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};

use crate::config::RadioConfig;
use crate::engine::{EngineClient, EngineQueue};

/// Events emitted by the drop watcher.
#[derive(Debug, Clone)]
pub enum DropEvent {
    /// A new file appeared in the override queue directory.
    OverrideQueued(PathBuf),
    /// The force-break trigger was touched.
    ForceBreakTouched,
    /// The generation kill switch appeared or disappeared.
    KillSwitchChanged(bool),
    /// A watch error occurred.
    Error(String),
}

/// Errors that can occur during drop watching.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WatchError {
    #[error("failed to initialize watcher: {0}")]
    Init(String),
    #[error("failed to watch path: {0}")]
    Watch(String),
}

/// Handle to a running drop watcher. Dropping it stops the watcher.
pub struct DropWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    running: Arc<AtomicBool>,
}

impl DropWatcher {
    /// Watches the drops directory and returns the event receiver.
    pub fn new(config: &RadioConfig) -> Result<(Self, Receiver<DropEvent>), WatchError> {
        let (tx, rx) = bounded(256);
        let running = Arc::new(AtomicBool::new(true));
        let running_in_callback = Arc::clone(&running);

        let queue_dir = config.paths.drops_queue_dir();
        let processed_dir = config.paths.drops_processed_dir();
        let trigger = config.paths.force_break_trigger();
        let kill_switch = config.paths.kill_generation();

        let mut debouncer = new_debouncer(
            Duration::from_millis(500),
            None,
            move |result: DebounceEventResult| {
                if !running_in_callback.load(Ordering::Relaxed) {
                    return;
                }
                handle_events(
                    result,
                    &tx,
                    &queue_dir,
                    &processed_dir,
                    &trigger,
                    &kill_switch,
                );
            },
        )
        .map_err(|e| WatchError::Init(e.to_string()))?;

        let drops_root = config
            .paths
            .drops_queue_dir()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.paths.drops_queue_dir());
        tracing::info!(target: "drops", path = %drops_root.display(), "Watching drops directory");
        debouncer
            .watch(&drops_root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::Watch(e.to_string()))?;

        Ok((
            Self {
                _debouncer: debouncer,
                running,
            },
            rx,
        ))
    }
}

impl Drop for DropWatcher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        tracing::debug!(target: "drops", "Drop watcher stopped");
    }
}

/// Classifies debounced filesystem events into drop events.
fn handle_events(
    result: DebounceEventResult,
    tx: &Sender<DropEvent>,
    queue_dir: &Path,
    processed_dir: &Path,
    trigger: &Path,
    kill_switch: &Path,
) {
    match result {
        Ok(events) => {
            for event in events {
                for path in &event.paths {
                    let drop_event = match &event.kind {
                        notify::EventKind::Create(CreateKind::File)
                        | notify::EventKind::Create(CreateKind::Any) => {
                            classify_created(path, queue_dir, processed_dir, trigger, kill_switch)
                        }
                        notify::EventKind::Remove(_) if path == kill_switch => {
                            Some(DropEvent::KillSwitchChanged(false))
                        }
                        _ => None,
                    };
                    if let Some(event) = drop_event {
                        let _ = tx.try_send(event);
                    }
                }
            }
        }
        Err(errors) => {
            for error in errors {
                tracing::warn!(target: "drops", error = %error, "Watch error");
                let _ = tx.try_send(DropEvent::Error(error.to_string()));
            }
        }
    }
}

fn classify_created(
    path: &Path,
    queue_dir: &Path,
    processed_dir: &Path,
    trigger: &Path,
    kill_switch: &Path,
) -> Option<DropEvent> {
    if path == trigger {
        return Some(DropEvent::ForceBreakTouched);
    }
    if path == kill_switch {
        return Some(DropEvent::KillSwitchChanged(true));
    }
    if path.starts_with(queue_dir) && !path.starts_with(processed_dir) && path.is_file() {
        return Some(DropEvent::OverrideQueued(path.to_path_buf()));
    }
    None
}

/// Consumes watcher events and acts on them.
///
/// Runs until the channel closes (the watcher handle was dropped).
pub fn spawn_processor(
    config: Arc<RadioConfig>,
    engine: EngineClient,
    rx: Receiver<DropEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let recv = {
                let rx = rx.clone();
                tokio::task::spawn_blocking(move || rx.recv())
            };
            let event = match recv.await {
                Ok(Ok(event)) => event,
                // Channel closed or runtime shutting down.
                _ => return,
            };

            match event {
                DropEvent::OverrideQueued(path) => {
                    if let Err(e) = process_override(&config, &engine, &path).await {
                        log::warn!("[Drops] override {} failed: {e}", path.display());
                    }
                }
                DropEvent::ForceBreakTouched => {
                    log::info!("[Drops] force-break trigger touched");
                }
                DropEvent::KillSwitchChanged(present) => {
                    if present {
                        log::warn!("[Drops] generation kill switch engaged");
                    } else {
                        log::info!("[Drops] generation kill switch released");
                    }
                }
                DropEvent::Error(e) => log::warn!("[Drops] watcher error: {e}"),
            }
        }
    })
}

/// Moves an override into `processed/`, then pushes its new path to the
/// engine's override queue. The order is the contract: the engine must
/// only ever be handed a path that is done moving.
pub async fn process_override(
    config: &RadioConfig,
    engine: &EngineClient,
    path: &Path,
) -> Result<(), crate::error::RadioError> {
    let name = path
        .file_name()
        .ok_or_else(|| crate::error::RadioError::InvalidInput("override has no file name".into()))?;

    let processed_dir = config.paths.drops_processed_dir();
    std::fs::create_dir_all(&processed_dir)?;

    let mut dest = processed_dir.join(name);
    if dest.exists() {
        // Same name dropped twice: keep both.
        dest = processed_dir.join(format!(
            "{}-{}",
            chrono::Utc::now().timestamp(),
            name.to_string_lossy()
        ));
    }
    std::fs::rename(path, &dest)?;

    let rid = engine
        .push(EngineQueue::Override, &dest.display().to_string())
        .await?;
    log::info!(
        "[Drops] override queued: {} (rid {rid})",
        dest.display()
    );
    Ok(())
}
