//! Play recorder: invoked by the audio engine at every track transition.
//!
//! The engine spawns the `skywave-ontrack` binary with the starting track's
//! filename and the queue it came from; the binary delegates here. The
//! export runs in-process, as a direct call, so the history write is
//! guaranteed to land before any broadcast that mentions the track — the
//! historical fork-a-subprocess design raced exactly there.

use std::sync::Arc;

use chrono::Utc;

use crate::config::RadioConfig;
use crate::error::RadioResult;
use crate::now_playing::{classify_path, export::Exporter};
use crate::store::{PlaySource, Store};
use crate::utils::file_stem;

/// Handles one on_track callback.
pub struct Recorder {
    config: Arc<RadioConfig>,
    store: Store,
    exporter: Arc<Exporter>,
}

impl Recorder {
    pub fn new(config: Arc<RadioConfig>, store: Store, exporter: Arc<Exporter>) -> Self {
        Self {
            config,
            store,
            exporter,
        }
    }

    /// Records the starting track and refreshes the public snapshot.
    ///
    /// Ordering contract: the history row is written before the export
    /// composes its snapshot, so any broadcast a client sees after this
    /// call includes the new track.
    pub async fn on_track(&self, filename: &str, queue: &str) -> RadioResult<()> {
        self.record_start(filename, queue).await?;
        self.refresh_snapshot().await;
        Ok(())
    }

    /// Writes the play-history row and consumes the force-break trigger
    /// when a break starts. This is the half that must land; the hook
    /// binary gives it priority under its deadline.
    pub async fn record_start(&self, filename: &str, queue: &str) -> RadioResult<()> {
        let source = classify_source(queue, filename);
        let asset_id = match source {
            PlaySource::Music | PlaySource::Override => match self
                .store
                .asset_by_path(filename)
                .await?
            {
                Some(asset) => asset.id,
                None => file_stem(filename),
            },
            PlaySource::Break | PlaySource::Bumper => file_stem(filename),
        };

        let now = Utc::now();
        self.store.record_play(&asset_id, source, now).await?;
        log::info!(
            "[Recorder] {} started: {} ({})",
            source.as_str(),
            asset_id,
            filename
        );

        // A break actually starting is what consumes the force-break
        // trigger; reading the flag never clears it.
        if source == PlaySource::Break {
            self.clear_force_break_trigger();
        }
        Ok(())
    }

    /// In-process export of the public snapshot. Failures are logged, not
    /// surfaced: the row is already recorded and the 2-minute fallback
    /// refreshes the snapshot if the engine is being difficult right now.
    pub async fn refresh_snapshot(&self) {
        if let Err(e) = self.exporter.export().await {
            log::warn!("[Recorder] export after track start failed: {e}");
        }
    }

    fn clear_force_break_trigger(&self) {
        let trigger = self.config.paths.force_break_trigger();
        if trigger.exists() {
            match std::fs::remove_file(&trigger) {
                Ok(()) => log::info!("[Recorder] force-break trigger consumed"),
                Err(e) => log::warn!("[Recorder] could not clear force-break trigger: {e}"),
            }
        }
    }
}

/// Classifies a track start, with the queue name overriding the path when
/// the two disagree.
#[must_use]
pub fn classify_source(queue: &str, filename: &str) -> PlaySource {
    match queue {
        "override" => PlaySource::Override,
        "breaks" => match classify_path(filename) {
            // The breaks queue carries both breaks and station IDs.
            PlaySource::Bumper => PlaySource::Bumper,
            _ => PlaySource::Break,
        },
        _ => classify_path(filename),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_name_overrides_path() {
        // A file living under music/ but played from the override queue is
        // an override.
        assert_eq!(
            classify_source("override", "/radio/assets/music/abc.mp3"),
            PlaySource::Override
        );
        // The breaks queue classifies bumpers by path, everything else as
        // a break.
        assert_eq!(
            classify_source("breaks", "/radio/assets/bumpers/id_7.mp3"),
            PlaySource::Bumper
        );
        assert_eq!(
            classify_source("breaks", "/radio/assets/breaks/next.mp3"),
            PlaySource::Break
        );
        assert_eq!(
            classify_source("breaks", "/tmp/oddly_placed.mp3"),
            PlaySource::Break
        );
    }

    #[test]
    fn music_queue_falls_back_to_path_classification() {
        assert_eq!(
            classify_source("music", "/radio/assets/music/abc.mp3"),
            PlaySource::Music
        );
        // The engine's own fallback chain can start safety audio under the
        // music queue; path classification still calls it music.
        assert_eq!(
            classify_source("music", "/radio/assets/safety/evergreen.mp3"),
            PlaySource::Music
        );
    }
}
