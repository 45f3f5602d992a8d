//! Station-ID scheduling: a bumper at :15, :30, and :45.
//!
//! Fires every minute and acts one minute ahead of each slot so the bumper
//! is queued when the slot arrives. Each slot is guarded by its own
//! `mark_scheduled` key; restarts inside the same minute cannot queue a
//! duplicate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike, Utc};

use super::{ScheduledTask, TaskOutcome};
use crate::config::RadioConfig;
use crate::constants::STATION_ID_SLOTS;
use crate::engine::{EngineClient, EngineQueue};
use crate::store::{AssetKind, PlaySource, Store};
use crate::utils::hour_bucket;

pub struct StationIdTask {
    #[allow(dead_code)]
    config: Arc<RadioConfig>,
    store: Store,
    engine: EngineClient,
}

impl StationIdTask {
    pub fn new(config: Arc<RadioConfig>, store: Store, engine: EngineClient) -> Self {
        Self {
            config,
            store,
            engine,
        }
    }
}

#[async_trait]
impl ScheduledTask for StationIdTask {
    fn name(&self) -> &'static str {
        "station_id"
    }

    async fn run(&self, now: DateTime<Local>) -> TaskOutcome {
        let Some(&(_, slot)) = STATION_ID_SLOTS.iter().find(|(m, _)| *m == now.minute()) else {
            return TaskOutcome::Skipped {
                reason: "not a station-id minute".into(),
            };
        };

        let bucket = hour_bucket(now.with_timezone(&Utc));
        let key = format!("station_id:{bucket}:{slot}");
        match self.store.mark_scheduled(&key, now.with_timezone(&Utc)).await {
            Ok(true) => {}
            Ok(false) => {
                return TaskOutcome::Skipped {
                    reason: format!("already scheduled ({key})"),
                }
            }
            Err(e) => return TaskOutcome::Fail { error: e.to_string() },
        }

        // Exclude only the immediately previous bumper; variety, not a
        // rotation scheme.
        let last = match self.store.recently_played_ids(PlaySource::Bumper, 1).await {
            Ok(last) => last,
            Err(e) => return TaskOutcome::Fail { error: e.to_string() },
        };
        let bumper = match self.store.random_asset(AssetKind::Bumper, &last).await {
            Ok(Some(asset)) => asset,
            Ok(None) => {
                return TaskOutcome::Fail {
                    error: "no bumper assets in store".into(),
                }
            }
            Err(e) => return TaskOutcome::Fail { error: e.to_string() },
        };

        if let Err(e) = self.engine.push(EngineQueue::Breaks, &bumper.path).await {
            return TaskOutcome::Fail { error: e.to_string() };
        }
        log::info!("[StationId] queued {} for :{slot}", bumper.id);

        TaskOutcome::Ok {
            output: Some(bumper.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;
    use crate::store::Asset;
    use chrono::TimeZone;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixListener;

    fn bumper(n: u32) -> Asset {
        Asset {
            id: format!("bumper{n}"),
            path: format!("/radio/assets/bumpers/id_{n}.mp3"),
            kind: AssetKind::Bumper,
            duration_sec: 8.0,
            lufs: None,
            true_peak_db: None,
            energy: None,
            title: None,
            artist: None,
            album: None,
            created_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    fn spawn_counting_engine(socket_path: &std::path::Path) -> Arc<parking_lot::Mutex<Vec<String>>> {
        let pushes = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let listener = UnixListener::bind(socket_path).expect("bind fake engine");
        let record = Arc::clone(&pushes);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let record = Arc::clone(&record);
                tokio::spawn(async move {
                    let mut reader = BufReader::new(stream);
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.is_err() {
                        return;
                    }
                    if let Some(path) = line.trim_end().strip_prefix("breaks.push ") {
                        record.lock().push(path.to_string());
                    }
                    let _ = reader.get_mut().write_all(b"88\nEND\n").await;
                });
            }
        });
        pushes
    }

    fn test_task(dir: &tempfile::TempDir, store: &Store) -> StationIdTask {
        let yaml = format!(
            "station:\n  name: S\npaths:\n  base: {base}\n  hourly_bumper: {base}/b.mp3\n\
             engine:\n  socket_path: {base}/engine.sock\ncontent:\n  weather:\n    endpoint: http://127.0.0.1:1/\n    latitude: 0\n    longitude: 0\nannouncer:\n  persona: p\n",
            base = dir.path().display()
        );
        let config_path = dir.path().join("c.yaml");
        std::fs::write(&config_path, yaml).unwrap();
        let config = Arc::new(crate::config::RadioConfig::load(&config_path).unwrap());
        StationIdTask::new(
            Arc::clone(&config),
            store.clone(),
            EngineClient::new(config.engine.socket_path.clone(), "radio".into()),
        )
    }

    fn minute(m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 2, 14, m, 0).single().unwrap()
    }

    #[tokio::test]
    async fn acts_only_on_slot_minutes() {
        let (dir, store) = temp_store().await;
        let task = test_task(&dir, &store);

        for m in [0, 5, 13, 16, 30, 59] {
            let outcome = task.run(minute(m)).await;
            assert!(
                matches!(outcome, TaskOutcome::Skipped { .. }),
                "minute {m} must skip: {outcome:?}"
            );
        }
    }

    #[tokio::test]
    async fn one_bumper_per_slot_across_restarts() {
        let (dir, store) = temp_store().await;
        store.insert_asset(&bumper(1)).await.unwrap();
        store.insert_asset(&bumper(2)).await.unwrap();

        let task = test_task(&dir, &store);
        let pushes = spawn_counting_engine(&dir.path().join("engine.sock"));

        // S4: first fire at :14 pushes for slot 15.
        let first = task.run(minute(14)).await;
        assert!(matches!(first, TaskOutcome::Ok { .. }), "{first:?}");

        // Restart mid-minute: a fresh task instance fires again at :14.
        let restarted = test_task(&dir, &store);
        let second = restarted.run(minute(14)).await;
        assert!(matches!(second, TaskOutcome::Skipped { .. }), "{second:?}");

        assert_eq!(pushes.lock().len(), 1);

        // The :30 slot is independent.
        let third = task.run(minute(29)).await;
        assert!(matches!(third, TaskOutcome::Ok { .. }));
        assert_eq!(pushes.lock().len(), 2);
    }

    #[tokio::test]
    async fn excludes_the_previous_bumper_when_possible() {
        let (dir, store) = temp_store().await;
        store.insert_asset(&bumper(1)).await.unwrap();
        store.insert_asset(&bumper(2)).await.unwrap();
        store
            .record_play("bumper1", PlaySource::Bumper, Utc::now())
            .await
            .unwrap();

        let task = test_task(&dir, &store);
        let pushes = spawn_counting_engine(&dir.path().join("engine.sock"));

        let outcome = task.run(minute(44)).await;
        assert!(matches!(outcome, TaskOutcome::Ok { .. }));
        assert!(pushes.lock()[0].ends_with("id_2.mp3"));
    }
}
