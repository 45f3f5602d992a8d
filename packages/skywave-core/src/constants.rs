//! Fixed operating constants for the control plane.
//!
//! These values encode the station's scheduling contract and the tolerances
//! agreed with the external collaborators (audio engine, streaming server,
//! content providers). Most are deliberate policy, not tunables.

use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Audio Engine Socket
// ─────────────────────────────────────────────────────────────────────────────

/// Deadline for a single engine socket operation (connect + write + read).
pub const ENGINE_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Connect retry delays for a refused engine socket (exponential backoff).
///
/// Total worst-case wait stays under the 2 second operation deadline.
pub const ENGINE_CONNECT_DELAYS_MS: [u64; 5] = [50, 100, 200, 400, 800];

/// Line that terminates every engine response.
pub const ENGINE_END_SENTINEL: &str = "END";

// ─────────────────────────────────────────────────────────────────────────────
// Scheduling Policy
// ─────────────────────────────────────────────────────────────────────────────

/// How long a generated `next` break is considered fresh.
///
/// One hour plus slack for the generation run itself: a break produced at
/// minute 50 must still be usable at the top of the following hour.
pub const BREAK_FRESHNESS: Duration = Duration::from_secs(65 * 60);

/// Station-ID slots within the hour, as (acting minute, slot label).
pub const STATION_ID_SLOTS: [(u32, u32); 3] = [(14, 15), (29, 30), (44, 45)];

/// Anti-repetition exclusion windows, widest first.
///
/// The widest window that still leaves candidates wins; an empty pool is
/// never an acceptable outcome of exclusion.
pub const MUSIC_EXCLUSION_WINDOWS: [usize; 4] = [20, 10, 5, 0];

/// Scheduler-state keys older than this are pruned by housekeeping.
pub const STATE_PRUNE_AGE: Duration = Duration::from_secs(48 * 3600);

// ─────────────────────────────────────────────────────────────────────────────
// Task Deadlines
// ─────────────────────────────────────────────────────────────────────────────

/// Overall deadline for a content-generation run.
pub const GENERATION_DEADLINE: Duration = Duration::from_secs(180);

/// Default deadline for the short scheduler tasks.
pub const TASK_DEADLINE: Duration = Duration::from_secs(60);

/// Grace window between the stop signal and forced termination.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Budget for the on_track hook; the engine treats slow recorders as a
/// hazard to streaming.
pub const ON_TRACK_DEADLINE: Duration = Duration::from_secs(1);

// ─────────────────────────────────────────────────────────────────────────────
// Content Generation
// ─────────────────────────────────────────────────────────────────────────────

/// Hard timeout for each external input fetch (weather, one feed).
pub const INPUT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-provider transient-retry delays (exponential backoff).
pub const PROVIDER_RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 2000];

/// Total in-provider wait budget for rate-limit backoff before the provider
/// is treated as quota-exhausted.
pub const RATE_LIMIT_BUDGET: Duration = Duration::from_secs(15);

/// Number of recent phrases fed to the script model as negative context.
pub const PHRASE_CONTEXT_LINES: usize = 20;

/// Size cap for the recent-phrase log before rotation.
pub const PHRASE_LOG_CAP_BYTES: u64 = 64 * 1024;

/// Bound on advisory-lock contention waits for the phrase log.
pub const PHRASE_LOCK_WAIT: Duration = Duration::from_millis(500);

/// Loudness target for break artifacts (integrated LUFS).
pub const BREAK_LUFS_TARGET: f64 = -18.0;

/// True-peak ceiling for break artifacts (dBTP).
pub const BREAK_TRUE_PEAK_DB: f64 = -1.0;

/// Sample rate for break artifacts (Hz).
pub const BREAK_SAMPLE_RATE: u32 = 44_100;

// ─────────────────────────────────────────────────────────────────────────────
// Now-Playing Export
// ─────────────────────────────────────────────────────────────────────────────

/// History-match window for music tracks.
pub const EXPORT_MUSIC_WINDOW: Duration = Duration::from_secs(10 * 60);

/// History-match window for breaks and bumpers.
///
/// Deliberately tight: a replayed station-ID must not match an old row and
/// surface its stale timestamp.
pub const EXPORT_BREAK_WINDOW: Duration = Duration::from_secs(30);

/// Single retry delay that lets the recorder's write land before the
/// exporter synthesizes a record.
pub const EXPORT_RETRY_SLEEP: Duration = Duration::from_millis(100);

/// Queue depths surfaced in the public snapshot.
pub const SNAPSHOT_BREAKS_QUEUE: usize = 3;
pub const SNAPSHOT_MUSIC_QUEUE: usize = 5;

/// History depth surfaced in the public snapshot.
pub const SNAPSHOT_HISTORY: usize = 15;

// ─────────────────────────────────────────────────────────────────────────────
// Push Fan-Out
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between SSE keepalive comments.
pub const SSE_KEEPALIVE: Duration = Duration::from_secs(30);

/// Per-client send buffer (events). A client that falls this far behind is
/// dropped rather than allowed to stall the fan-out.
pub const CLIENT_BUFFER_EVENTS: usize = 8;

/// Capacity of the internal broadcast command channel.
pub const BROADCAST_CHANNEL_CAPACITY: usize = 32;

/// Timeout for the internal notify POST after an export.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);
