//! Snapshot composition and export.
//!
//! The exporter runs in two places: in-process inside the play recorder
//! (immediately after every track start) and as a 2-minute fallback task in
//! the supervisor. Both end the same way: atomic write of the snapshot
//! file, then a best-effort notify POST so the fan-out re-reads and
//! broadcasts it.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use super::{
    classify_path, stats, Crossfade, CurrentTrack, HistoryEntry, NowPlayingSnapshot, QueuedTrack,
    StreamStats, SystemStatus,
};
use crate::config::RadioConfig;
use crate::constants::{
    EXPORT_BREAK_WINDOW, EXPORT_MUSIC_WINDOW, EXPORT_RETRY_SLEEP, NOTIFY_TIMEOUT,
    SNAPSHOT_BREAKS_QUEUE, SNAPSHOT_HISTORY, SNAPSHOT_MUSIC_QUEUE,
};
use crate::engine::{EngineClient, EngineQueue};
use crate::error::{RadioError, RadioResult};
use crate::store::{PlayRow, PlaySource, Store};
use crate::utils::{file_stem, now_rfc3339};

/// Composes and publishes the now-playing snapshot.
pub struct Exporter {
    config: Arc<RadioConfig>,
    store: Store,
    engine: EngineClient,
    http: reqwest::Client,
}

impl Exporter {
    pub fn new(
        config: Arc<RadioConfig>,
        store: Store,
        engine: EngineClient,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            store,
            engine,
            http,
        }
    }

    /// Full export: read the engine, compose, write atomically, notify.
    pub async fn export(&self) -> RadioResult<NowPlayingSnapshot> {
        let snapshot = self.compose().await?;
        snapshot.write_to(&self.config.paths.now_playing())?;
        self.notify().await;
        Ok(snapshot)
    }

    /// The 2-minute fallback path.
    ///
    /// Re-broadcasts the existing on-disk snapshot instead of re-reading
    /// the engine; re-reading here can race a just-written snapshot whose
    /// track the engine has not surfaced in its metadata yet. Only the
    /// volatile stream stats are refreshed before the re-broadcast; a
    /// missing file (first boot) triggers a full export.
    pub async fn refresh_fallback(&self) -> RadioResult<()> {
        let path = self.config.paths.now_playing();
        if !path.exists() {
            self.export().await?;
            return Ok(());
        }

        let mut snapshot = match NowPlayingSnapshot::read_from(&path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // A torn or hand-edited file: replace it wholesale.
                log::warn!("[Export] on-disk snapshot unreadable ({e}); re-exporting");
                self.export().await?;
                return Ok(());
            }
        };

        // Listener counts move without any track change; they are the one
        // part of the document worth refreshing here. Playout state
        // (current, queues, history) stays as the recorder last wrote it,
        // and updated_at advances only when playout state does.
        if let Some(stream) = stats::fetch_stream_stats(&self.http, &self.config.stream).await {
            snapshot.stream = stream;
        }
        snapshot.write_to(&path)?;

        self.notify().await;
        Ok(())
    }

    async fn compose(&self) -> RadioResult<NowPlayingSnapshot> {
        let current = self.compose_current().await?;
        let breaks_queue = self
            .compose_queue(EngineQueue::Breaks, SNAPSHOT_BREAKS_QUEUE)
            .await;
        let music_queue = self
            .compose_queue(EngineQueue::Music, SNAPSHOT_MUSIC_QUEUE)
            .await;
        let history = self.compose_history().await;
        let stream = stats::fetch_stream_stats(&self.http, &self.config.stream)
            .await
            .unwrap_or_else(StreamStats::default);

        Ok(NowPlayingSnapshot {
            updated_at: now_rfc3339(),
            system_status: SystemStatus::Online,
            crossfade: Crossfade {
                music_sec: self.config.station.crossfade.music_sec,
                breaks_sec: self.config.station.crossfade.breaks_sec,
            },
            current,
            breaks_queue,
            music_queue,
            history,
            stream,
        })
    }

    /// Resolves the engine's current metadata into the `current` object.
    async fn compose_current(&self) -> RadioResult<CurrentTrack> {
        let metadata = self.engine.current_metadata().await?;
        let filename = metadata
            .get("filename")
            .or_else(|| metadata.get("initial_uri"))
            .ok_or_else(|| RadioError::Unavailable("engine metadata has no filename".into()))?
            .clone();

        let source = classify_path(&filename);
        let asset = self.store.asset_by_path(&filename).await?;
        let asset_id = match &asset {
            Some(asset) => asset.id.clone(),
            None => file_stem(&filename),
        };

        let row = self.find_history_row(&filename, &asset_id, source).await?;
        let played_at = match &row {
            Some(row) => row.played_at.clone(),
            None => now_rfc3339(),
        };

        let duration_sec = match &asset {
            Some(asset) => asset.duration_sec,
            None => probe_duration(Path::new(&filename)).unwrap_or(0.0),
        };

        let (title, artist, album) = self.describe(&filename, source, asset.as_ref(), &metadata);

        Ok(CurrentTrack {
            asset_id,
            title,
            artist,
            album,
            duration_sec,
            played_at,
            source: source.as_str().to_string(),
            kind: source.as_str().to_string(),
        })
    }

    /// Finds the play-history row for the current track.
    ///
    /// Music matches by path within a 10-minute window. Breaks and bumpers
    /// match by stem within 30 seconds only; for those, one short retry
    /// lets the recorder's write land before we synthesize a record.
    async fn find_history_row(
        &self,
        filename: &str,
        stem: &str,
        source: PlaySource,
    ) -> RadioResult<Option<PlayRow>> {
        match source {
            PlaySource::Music | PlaySource::Override => {
                let since = Utc::now() - chrono::Duration::from_std(EXPORT_MUSIC_WINDOW).unwrap();
                Ok(self.store.latest_play_for_path(filename, since).await?)
            }
            PlaySource::Break | PlaySource::Bumper => {
                let since = Utc::now() - chrono::Duration::from_std(EXPORT_BREAK_WINDOW).unwrap();
                if let Some(row) = self.store.latest_play_for_stem(stem, since).await? {
                    return Ok(Some(row));
                }
                tokio::time::sleep(EXPORT_RETRY_SLEEP).await;
                Ok(self.store.latest_play_for_stem(stem, since).await?)
            }
        }
    }

    /// Produces title/artist/album for a playing or queued file.
    fn describe(
        &self,
        filename: &str,
        source: PlaySource,
        asset: Option<&crate::store::Asset>,
        metadata: &std::collections::HashMap<String, String>,
    ) -> (String, String, String) {
        let station = self.config.station.name.clone();
        match source {
            PlaySource::Break => ("Station Break".to_string(), station, String::new()),
            PlaySource::Bumper => ("Station ID".to_string(), station, String::new()),
            PlaySource::Music | PlaySource::Override => {
                let title = asset
                    .and_then(|a| a.title.clone())
                    .or_else(|| metadata.get("title").cloned())
                    .unwrap_or_else(|| file_stem(filename));
                let artist = asset
                    .and_then(|a| a.artist.clone())
                    .or_else(|| metadata.get("artist").cloned())
                    .unwrap_or_default();
                let album = asset
                    .and_then(|a| a.album.clone())
                    .or_else(|| metadata.get("album").cloned())
                    .unwrap_or_default();
                (title, artist, album)
            }
        }
    }

    /// Reads the first `depth` entries of a queue and resolves each rid.
    /// Failures shrink the queue view; they never fail the export.
    async fn compose_queue(&self, queue: EngineQueue, depth: usize) -> Vec<QueuedTrack> {
        let rids = match self.engine.queue_list(queue).await {
            Ok(rids) => rids,
            Err(e) => {
                log::warn!("[Export] queue list {} failed: {e}", queue.as_str());
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for rid in rids.iter().take(depth) {
            let metadata = match self.engine.request_metadata(rid).await {
                Ok(md) => md,
                Err(e) => {
                    log::warn!("[Export] request.metadata {rid} failed: {e}");
                    continue;
                }
            };
            let Some(filename) = metadata
                .get("filename")
                .or_else(|| metadata.get("initial_uri"))
            else {
                continue;
            };

            let source = classify_path(filename);
            let asset = self.store.asset_by_path(filename).await.ok().flatten();
            let duration_sec = asset
                .as_ref()
                .map(|a| a.duration_sec)
                .or_else(|| probe_duration(Path::new(filename)))
                .unwrap_or(0.0);
            let (title, artist, album) = self.describe(filename, source, asset.as_ref(), &metadata);

            entries.push(QueuedTrack {
                title,
                artist,
                album,
                duration_sec,
                source: source.as_str().to_string(),
                kind: source.as_str().to_string(),
            });
        }
        entries
    }

    async fn compose_history(&self) -> Vec<HistoryEntry> {
        let plays = match self.store.recent_plays(SNAPSHOT_HISTORY).await {
            Ok(plays) => plays,
            Err(e) => {
                log::warn!("[Export] history read failed: {e}");
                return Vec::new();
            }
        };

        plays
            .into_iter()
            .map(|play| {
                let source = PlaySource::parse(&play.source).unwrap_or(PlaySource::Music);
                let (title, artist) = match source {
                    PlaySource::Break => {
                        ("Station Break".to_string(), self.config.station.name.clone())
                    }
                    PlaySource::Bumper => {
                        ("Station ID".to_string(), self.config.station.name.clone())
                    }
                    _ => (
                        play.title.unwrap_or_else(|| play.asset_id.clone()),
                        play.artist.unwrap_or_default(),
                    ),
                };
                HistoryEntry {
                    title,
                    artist,
                    played_at: play.played_at,
                    source: play.source,
                }
            })
            .collect()
    }

    /// POSTs to the fan-out's notify endpoint with an empty body, asking it
    /// to re-read the snapshot we just wrote. Failure is logged, not fatal:
    /// the next plain read of the file is still correct.
    async fn notify(&self) {
        let url = format!("http://127.0.0.1:{}/notify", self.config.push.port);
        let result = self
            .http
            .post(&url)
            .timeout(NOTIFY_TIMEOUT)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("")
            .send()
            .await;
        if let Err(e) = result {
            log::debug!("[Export] notify POST failed: {e}");
        }
    }
}

/// Reads a file's audio duration, if the file is probeable.
fn probe_duration(path: &Path) -> Option<f64> {
    use lofty::file::AudioFile;

    let tagged = lofty::probe::Probe::open(path).ok()?.read().ok()?;
    Some(tagged.properties().duration().as_secs_f64())
}
