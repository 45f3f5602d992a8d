//! Scheduler: five idempotent periodic tasks under one supervisor.
//!
//! Every task is single-shot and stateless between runs: it reads the wall
//! clock, consults the store and the engine, decides, acts, returns. The
//! only memory a task has across runs (and crashes) is the store's
//! `mark_scheduled` keys.

pub mod breaks;
pub mod clock;
pub mod export;
pub mod housekeeping;
pub mod joblog;
pub mod metrics;
pub mod music;
pub mod station_id;
pub mod supervisor;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::constants::TASK_DEADLINE;

/// Result of one task firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task acted.
    Ok { output: Option<String> },
    /// A guard said no (already scheduled, outside window, kill switch).
    /// Expected, not an error.
    Skipped { reason: String },
    /// The task could not act; the next scheduled instant retries.
    Fail { error: String },
}

impl TaskOutcome {
    /// Status label for the job log.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Ok { .. } => "ok",
            Self::Skipped { .. } => "skipped",
            Self::Fail { .. } => "fail",
        }
    }
}

/// A wall-clock triggered unit of work.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Stable name for logs, the job log, and the fire-state file.
    fn name(&self) -> &'static str;

    /// Overall deadline for one run.
    fn deadline(&self) -> Duration {
        TASK_DEADLINE
    }

    /// Runs once. `now` is the station-local instant the trigger fired at.
    async fn run(&self, now: DateTime<Local>) -> TaskOutcome;
}
