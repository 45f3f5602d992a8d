//! Fallback now-playing refresh.
//!
//! The recorder exports immediately on every track start; this task is the
//! safety net behind it. It re-broadcasts the on-disk snapshot rather than
//! re-reading the engine — re-reading here can overwrite a just-written
//! snapshot with stale engine metadata.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use super::{ScheduledTask, TaskOutcome};
use crate::now_playing::export::Exporter;

pub struct ExportFallbackTask {
    exporter: Arc<Exporter>,
}

impl ExportFallbackTask {
    pub fn new(exporter: Arc<Exporter>) -> Self {
        Self { exporter }
    }
}

#[async_trait]
impl ScheduledTask for ExportFallbackTask {
    fn name(&self) -> &'static str {
        "now_playing_export"
    }

    async fn run(&self, _now: DateTime<Local>) -> TaskOutcome {
        match self.exporter.refresh_fallback().await {
            Ok(()) => TaskOutcome::Ok { output: None },
            Err(e) => TaskOutcome::Fail {
                error: e.to_string(),
            },
        }
    }
}
