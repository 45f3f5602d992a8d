//! Minutely operational metrics, published to `state/metrics.json`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use super::{ScheduledTask, TaskOutcome};
use crate::config::RadioConfig;
use crate::fanout::Broadcaster;
use crate::now_playing::stats;
use crate::store::Store;
use crate::utils::{now_rfc3339, write_json_atomic};

/// The metrics document. Shape is for operators and dashboards, not
/// listeners; it can grow fields without breaking anyone.
#[derive(Debug, Serialize)]
struct MetricsDocument {
    ts: String,
    uptime_sec: u64,
    listeners: u32,
    sse_clients: usize,
    plays_last_hour: i64,
    generation_runs_24h: GenerationCounts,
}

#[derive(Debug, Default, Serialize)]
struct GenerationCounts {
    ok: i64,
    fail: i64,
    skipped: i64,
}

pub struct MetricsTask {
    config: Arc<RadioConfig>,
    store: Store,
    broadcaster: Broadcaster,
    http: reqwest::Client,
    started: Instant,
}

impl MetricsTask {
    pub fn new(
        config: Arc<RadioConfig>,
        store: Store,
        broadcaster: Broadcaster,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            store,
            broadcaster,
            http,
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl ScheduledTask for MetricsTask {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn run(&self, _now: DateTime<Local>) -> TaskOutcome {
        let listeners = stats::fetch_stream_stats(&self.http, &self.config.stream)
            .await
            .map(|s| s.listeners)
            .unwrap_or(0);

        let plays_last_hour = self
            .store
            .plays_since(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap_or(0);

        let mut generation = GenerationCounts::default();
        if let Ok(counts) = self
            .store
            .generation_run_counts_since(Utc::now() - chrono::Duration::hours(24))
            .await
        {
            for (status, count) in counts {
                match status.as_str() {
                    "ok" => generation.ok = count,
                    "fail" => generation.fail = count,
                    "skipped" => generation.skipped = count,
                    _ => {}
                }
            }
        }

        let document = MetricsDocument {
            ts: now_rfc3339(),
            uptime_sec: self.started.elapsed().as_secs(),
            listeners,
            sse_clients: self.broadcaster.client_count(),
            plays_last_hour,
            generation_runs_24h: generation,
        };

        match write_json_atomic(&self.config.paths.metrics(), &document) {
            Ok(()) => TaskOutcome::Ok { output: None },
            Err(e) => TaskOutcome::Fail {
                error: format!("metrics write: {e}"),
            },
        }
    }
}
