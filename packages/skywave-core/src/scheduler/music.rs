//! Music enqueue: keep the engine's music queue topped up without repeats.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike};
use rand::seq::SliceRandom;

use super::{ScheduledTask, TaskOutcome};
use crate::config::RadioConfig;
use crate::constants::MUSIC_EXCLUSION_WINDOWS;
use crate::engine::{EngineClient, EngineQueue};
use crate::store::{Asset, AssetKind, PlaySource, Store};

/// Target energy by local hour. The shape is the station's day: low
/// overnight, a morning ramp, an evening peak, a slow wind-down.
const HOURLY_ENERGY: [u8; 24] = [
    35, 30, 28, 28, 30, 35, 45, 55, 62, 65, 68, 70, 68, 65, 64, 66, 70, 75, 78, 76, 70, 60, 50, 40,
];

/// Average track length assumed when projecting energy targets for later
/// queue positions.
const ASSUMED_TRACK_MINUTES: i64 = 4;

pub struct MusicEnqueueTask {
    config: Arc<RadioConfig>,
    store: Store,
    engine: EngineClient,
}

impl MusicEnqueueTask {
    pub fn new(config: Arc<RadioConfig>, store: Store, engine: EngineClient) -> Self {
        Self {
            config,
            store,
            engine,
        }
    }
}

#[async_trait]
impl ScheduledTask for MusicEnqueueTask {
    fn name(&self) -> &'static str {
        "music_enqueue"
    }

    async fn run(&self, now: DateTime<Local>) -> TaskOutcome {
        let queue_len = match self.engine.queue_length(EngineQueue::Music).await {
            Ok(len) => len,
            Err(e) => return TaskOutcome::Fail { error: e.to_string() },
        };
        if queue_len >= self.config.schedule.music_queue_min {
            return TaskOutcome::Skipped {
                reason: format!("queue holds {queue_len} tracks"),
            };
        }

        let candidates = match self.store.assets_by_kind(AssetKind::Music).await {
            Ok(assets) => assets,
            Err(e) => return TaskOutcome::Fail { error: e.to_string() },
        };
        if candidates.is_empty() {
            return TaskOutcome::Fail {
                error: "no music assets in store".into(),
            };
        }

        let pool = match self.eligible_pool(candidates).await {
            Ok(pool) => pool,
            Err(e) => return TaskOutcome::Fail { error: e },
        };

        let fill = self
            .config
            .schedule
            .music_queue_target
            .saturating_sub(queue_len);
        let selected = select_tracks(pool, fill, now, self.config.schedule.energy_flow);

        let mut pushed = 0usize;
        for asset in &selected {
            match self.engine.push(EngineQueue::Music, &asset.path).await {
                Ok(_rid) => pushed += 1,
                Err(e) => {
                    // A partial fill is fine; the rest comes next tick.
                    log::warn!("[MusicEnqueue] push failed after {pushed}: {e}");
                    break;
                }
            }
        }

        if pushed == 0 && !selected.is_empty() {
            TaskOutcome::Fail {
                error: "engine rejected every push".into(),
            }
        } else {
            TaskOutcome::Ok {
                output: Some(format!("pushed {pushed} tracks")),
            }
        }
    }
}

impl MusicEnqueueTask {
    /// Applies the anti-repetition exclusion, relaxing the window until
    /// candidates remain. Exclusion may never empty the pool.
    async fn eligible_pool(&self, candidates: Vec<Asset>) -> Result<Vec<Asset>, String> {
        for &window in &MUSIC_EXCLUSION_WINDOWS {
            let recent = self
                .store
                .recently_played_ids(PlaySource::Music, window)
                .await
                .map_err(|e| e.to_string())?;
            let pool: Vec<Asset> = candidates
                .iter()
                .filter(|a| !recent.contains(&a.id))
                .cloned()
                .collect();
            if !pool.is_empty() {
                if window < MUSIC_EXCLUSION_WINDOWS[0] {
                    log::info!("[MusicEnqueue] relaxed exclusion window to {window}");
                }
                return Ok(pool);
            }
        }
        // The zero window never excludes anything, so this is unreachable
        // with a non-empty candidate list.
        Ok(candidates)
    }
}

/// Picks up to `fill` tracks from the pool.
///
/// With energy flow on, each queue position gets a target energy from the
/// time-of-day curve and the closest-energy candidate wins, ties broken
/// randomly. This is a preference, never a filter: assets without an
/// energy rating compete at a neutral value and the pool is always
/// honored as-is.
fn select_tracks(
    mut pool: Vec<Asset>,
    fill: usize,
    now: DateTime<Local>,
    energy_flow: bool,
) -> Vec<Asset> {
    let mut rng = rand::rng();
    // The shuffle is the uniform-random base case and the tie-breaker for
    // the energy sort below.
    pool.shuffle(&mut rng);

    if !energy_flow {
        pool.truncate(fill);
        return pool;
    }

    let mut selected = Vec::with_capacity(fill.min(pool.len()));
    for position in 0..fill {
        if pool.is_empty() {
            break;
        }
        let at = now + chrono::Duration::minutes(position as i64 * ASSUMED_TRACK_MINUTES);
        let target = target_energy(&at);
        let (index, _) = pool
            .iter()
            .enumerate()
            .min_by_key(|(_, asset)| {
                let energy = i32::from(asset.energy.unwrap_or(50));
                (energy - i32::from(target)).abs()
            })
            .expect("pool is non-empty");
        selected.push(pool.swap_remove(index));
    }
    selected
}

/// Interpolates the hourly curve at a local instant.
fn target_energy(at: &DateTime<Local>) -> u8 {
    let hour = at.hour() as usize;
    let next_hour = (hour + 1) % 24;
    let fraction = f64::from(at.minute()) / 60.0;
    let here = f64::from(HOURLY_ENERGY[hour]);
    let there = f64::from(HOURLY_ENERGY[next_hour]);
    (here + (there - here) * fraction).round() as u8
}
