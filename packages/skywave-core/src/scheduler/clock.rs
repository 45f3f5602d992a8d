//! Wall-clock alignment and missed-fire accounting.
//!
//! Triggers fire at canonical instants relative to station-local midnight
//! (`:00, :05, :10, …`), never at `start + N·period`: a timer started at
//! 10:07 with a 5-minute period fires at 10:10, not 10:12. After each fire
//! the next instant is recomputed, so drift cannot accumulate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{parse_rfc3339, write_json_atomic};

/// Static description of one trigger.
#[derive(Debug, Clone, Copy)]
pub struct TriggerSpec {
    /// Firing period in minutes; must divide 24 hours cleanly.
    pub period_min: u32,
    /// Offset from the period boundary (minute 50 of each hour is
    /// `period 60, offset 50`).
    pub offset_min: u32,
    /// Whether a missed instant earns exactly one catch-up fire at the
    /// next start.
    pub persistent: bool,
}

/// The next canonical instant strictly after `after`.
#[must_use]
pub fn next_aligned(after: DateTime<Local>, spec: &TriggerSpec) -> DateTime<Local> {
    let period = i64::from(spec.period_min);
    let offset = i64::from(spec.offset_min % spec.period_min);

    let midnight = after
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time");
    let elapsed_min = (after.naive_local() - midnight).num_minutes();

    let k = (elapsed_min - offset).div_euclid(period) + 1;
    let candidate = midnight + Duration::minutes(k * period + offset);

    // DST gaps make some local times nonexistent; fall forward to the
    // next representable instant rather than panicking at 02:00.
    Local
        .from_local_datetime(&candidate)
        .earliest()
        .unwrap_or_else(|| {
            Local
                .from_local_datetime(&(candidate + Duration::hours(1)))
                .earliest()
                .unwrap_or_else(Local::now)
        })
}

/// True when at least one canonical instant lies in `(last, now]`.
#[must_use]
pub fn missed_since(last: DateTime<Local>, now: DateTime<Local>, spec: &TriggerSpec) -> bool {
    next_aligned(last, spec) <= now
}

// ─────────────────────────────────────────────────────────────────────────────
// Persisted Fire State
// ─────────────────────────────────────────────────────────────────────────────

/// Last-fire times per trigger, persisted across restarts so downtime
/// across a scheduled instant earns exactly one catch-up fire.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FireState {
    last_fired: HashMap<String, String>,
}

impl FireState {
    /// Loads the state file; a missing or unreadable file is an empty
    /// state (every persistent trigger then catches up once, which is the
    /// safe direction).
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Persists atomically.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        write_json_atomic(path, self)
    }

    /// When `name` last fired, if known.
    pub fn last_fired(&self, name: &str) -> Option<DateTime<Local>> {
        let raw = self.last_fired.get(name)?;
        parse_rfc3339(raw).map(|utc| utc.with_timezone(&Local))
    }

    /// Records a fire.
    pub fn record(&mut self, name: &str, at: DateTime<Local>) {
        self.last_fired.insert(
            name.to_string(),
            at.with_timezone(&Utc)
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        );
    }
}

/// Path helper so the supervisor and tests agree on the file name.
pub fn fire_state_path(state_dir: &Path) -> PathBuf {
    state_dir.join("schedule.json")
}
