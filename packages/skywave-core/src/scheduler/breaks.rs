//! Break generation and break scheduling.
//!
//! Generation runs at minute 50 and produces `next.mp3` for the following
//! top of hour. Scheduling runs on the 5-minute grid, acts only in the
//! top-of-hour window, and is guarded by a `mark_scheduled` key so the
//! hour gets exactly one break no matter how many times (or in how many
//! processes) the task fires.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike, Utc};

use super::{ScheduledTask, TaskOutcome};
use crate::config::RadioConfig;
use crate::constants::{BREAK_FRESHNESS, GENERATION_DEADLINE};
use crate::content::{BreakGenerator, GenerationOutcome};
use crate::engine::{EngineClient, EngineQueue};
use crate::store::Store;
use crate::utils::hour_bucket;

// ─────────────────────────────────────────────────────────────────────────────
// Break Generate
// ─────────────────────────────────────────────────────────────────────────────

pub struct BreakGenerateTask {
    generator: Arc<BreakGenerator>,
}

impl BreakGenerateTask {
    pub fn new(generator: Arc<BreakGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl ScheduledTask for BreakGenerateTask {
    fn name(&self) -> &'static str {
        "break_generate"
    }

    fn deadline(&self) -> Duration {
        GENERATION_DEADLINE
    }

    async fn run(&self, _now: DateTime<Local>) -> TaskOutcome {
        match self.generator.generate().await {
            GenerationOutcome::Published(path) => TaskOutcome::Ok {
                output: Some(path.display().to_string()),
            },
            GenerationOutcome::Skipped => TaskOutcome::Skipped {
                reason: "kill switch present".into(),
            },
            // Prior next/last_good stay untouched; the scheduler can still
            // serve a break this hour.
            GenerationOutcome::Failed(e) => TaskOutcome::Fail {
                error: e.to_string(),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Break Schedule
// ─────────────────────────────────────────────────────────────────────────────

pub struct BreakScheduleTask {
    config: Arc<RadioConfig>,
    store: Store,
    engine: EngineClient,
}

impl BreakScheduleTask {
    pub fn new(config: Arc<RadioConfig>, store: Store, engine: EngineClient) -> Self {
        Self {
            config,
            store,
            engine,
        }
    }

    /// Picks what the hour's break should be: a fresh `next`, else
    /// `last_good`, else the hourly bumper.
    fn choose_break_file(&self) -> (PathBuf, &'static str) {
        let next = self.config.paths.next_break();
        if file_age(&next).is_some_and(|age| age <= BREAK_FRESHNESS) {
            return (next, "next");
        }

        let last_good = self.config.paths.last_good_break();
        if last_good.exists() {
            return (last_good, "last_good");
        }

        (self.config.paths.hourly_bumper.clone(), "hourly_bumper")
    }

    /// Handles the operator's force-break trigger.
    ///
    /// The trigger file itself is the flag; it survives restarts and is
    /// removed only by the recorder when a break actually starts playing.
    /// An already-pending break in the queue means a prior tick (or a
    /// second touch) is covered: push nothing.
    async fn handle_force_trigger(&self) -> Result<Option<TaskOutcome>, String> {
        if !self.config.paths.force_break_trigger().exists() {
            return Ok(None);
        }

        let pending = self
            .engine
            .queue_length(EngineQueue::Breaks)
            .await
            .map_err(|e| e.to_string())?;
        if pending > 0 {
            return Ok(Some(TaskOutcome::Skipped {
                reason: "forced break already pending".into(),
            }));
        }

        let (path, label) = self.choose_break_file();
        self.engine
            .push(EngineQueue::Breaks, &path.display().to_string())
            .await
            .map_err(|e| e.to_string())?;
        log::info!("[BreakSchedule] forced break pushed ({label})");
        Ok(Some(TaskOutcome::Ok {
            output: Some(path.display().to_string()),
        }))
    }

    /// Best-effort archive copy of the hour's break.
    ///
    /// A copy, not a move: the engine was handed the original path and may
    /// not have opened it yet.
    fn archive(&self, played: &PathBuf, now: DateTime<Local>) {
        let dir = self
            .config
            .paths
            .break_archive_dir()
            .join(now.format("%Y-%m-%d").to_string());
        let target = dir.join(format!("{}00.mp3", now.format("%H")));
        let result = std::fs::create_dir_all(&dir).and_then(|()| std::fs::copy(played, &target));
        match result {
            Ok(_) => log::info!("[BreakSchedule] archived to {}", target.display()),
            Err(e) => log::warn!("[BreakSchedule] archive failed: {e}"),
        }
    }
}

#[async_trait]
impl ScheduledTask for BreakScheduleTask {
    fn name(&self) -> &'static str {
        "break_schedule"
    }

    async fn run(&self, now: DateTime<Local>) -> TaskOutcome {
        // Operator override first; it ignores the top-of-hour window.
        match self.handle_force_trigger().await {
            Ok(Some(outcome)) => return outcome,
            Ok(None) => {}
            Err(error) => return TaskOutcome::Fail { error },
        }

        if now.minute() >= 5 {
            return TaskOutcome::Skipped {
                reason: "outside top-of-hour window".into(),
            };
        }

        // The hour is the one containing the trigger instant, not a fresh
        // clock read; a fire straddling the boundary stays in its hour.
        let bucket = hour_bucket(now.with_timezone(&Utc));
        let key = format!("break:{bucket}");
        match self.store.mark_scheduled(&key, now.with_timezone(&Utc)).await {
            Ok(true) => {}
            Ok(false) => {
                return TaskOutcome::Skipped {
                    reason: format!("already scheduled ({key})"),
                }
            }
            Err(e) => return TaskOutcome::Fail { error: e.to_string() },
        }

        let (path, label) = self.choose_break_file();
        if !path.exists() {
            return TaskOutcome::Fail {
                error: format!("no break source available ({label}: {})", path.display()),
            };
        }

        // No buffer between this push and the speakers: the breaks queue
        // is configured for audible immediacy.
        if let Err(e) = self
            .engine
            .push(EngineQueue::Breaks, &path.display().to_string())
            .await
        {
            return TaskOutcome::Fail { error: e.to_string() };
        }
        log::info!("[BreakSchedule] pushed {label} for {bucket}");

        self.archive(&path, now);

        TaskOutcome::Ok {
            output: Some(path.display().to_string()),
        }
    }
}

/// Time since a file was last modified.
fn file_age(path: &std::path::Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    std::time::SystemTime::now().duration_since(modified).ok()
}
