//! The public "now playing" snapshot.
//!
//! One JSON document at a well-known path is the whole read surface for
//! listeners: the web frontend, the push fan-out, and any external API
//! consumer read the same file. The schema here is exact contract; field
//! names and shapes must not drift.

pub mod export;
pub mod stats;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::PlaySource;
use crate::utils::write_json_atomic;

/// Listener-visible system state. The only error signal listeners ever
/// see: "restarting" during ops restarts, "online" otherwise, even when
/// subsystems are degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Online,
    Restarting,
}

/// Crossfade durations, reported as configured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Crossfade {
    pub music_sec: f64,
    pub breaks_sec: f64,
}

/// The track currently on air.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTrack {
    pub asset_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_sec: f64,
    pub played_at: String,
    pub source: String,
    pub kind: String,
}

/// A queued track: like [`CurrentTrack`] minus identity and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTrack {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_sec: f64,
    pub source: String,
    pub kind: String,
}

/// One past play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: String,
    pub artist: String,
    pub played_at: String,
    pub source: String,
}

/// Listener stats read from the streaming server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StreamStats {
    pub listeners: u32,
    pub bitrate: u32,
    pub samplerate: u32,
    pub stream_start_iso8601: String,
}

/// The canonical snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlayingSnapshot {
    pub updated_at: String,
    pub system_status: SystemStatus,
    pub crossfade: Crossfade,
    pub current: CurrentTrack,
    pub breaks_queue: Vec<QueuedTrack>,
    pub music_queue: Vec<QueuedTrack>,
    pub history: Vec<HistoryEntry>,
    pub stream: StreamStats,
}

impl NowPlayingSnapshot {
    /// Publishes the snapshot atomically; concurrent readers see either
    /// the prior or the new complete document.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        write_json_atomic(path, self)
    }

    /// Reads a snapshot back from disk.
    pub fn read_from(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read(path)?;
        serde_json::from_slice(&contents).map_err(std::io::Error::other)
    }
}

/// Classifies a playing file by its path. The directory layout is contract,
/// so the substring check is reliable.
#[must_use]
pub fn classify_path(path: &str) -> PlaySource {
    if path.contains("/breaks/") {
        PlaySource::Break
    } else if path.contains("/bumpers/") {
        PlaySource::Bumper
    } else {
        PlaySource::Music
    }
}

/// A fully populated snapshot for tests across the crate.
#[cfg(test)]
pub(crate) fn sample_snapshot() -> NowPlayingSnapshot {
    NowPlayingSnapshot {
        updated_at: "2025-06-01T14:00:05.123456Z".into(),
        system_status: SystemStatus::Online,
        crossfade: Crossfade {
            music_sec: 2.5,
            breaks_sec: 0.5,
        },
        current: CurrentTrack {
            asset_id: "abc123".into(),
            title: "Night Drive".into(),
            artist: "The Harbor Lights".into(),
            album: "Low Tide".into(),
            duration_sec: 243.0,
            played_at: "2025-06-01T13:58:41.000001Z".into(),
            source: "music".into(),
            kind: "music".into(),
        },
        breaks_queue: vec![QueuedTrack {
            title: "Station Break".into(),
            artist: "Skywave FM".into(),
            album: String::new(),
            duration_sec: 62.0,
            source: "break".into(),
            kind: "break".into(),
        }],
        music_queue: vec![],
        history: vec![HistoryEntry {
            title: "Previous Song".into(),
            artist: "Somebody".into(),
            played_at: "2025-06-01T13:54:00.500000Z".into(),
            source: "music".into(),
        }],
        stream: StreamStats {
            listeners: 12,
            bitrate: 192,
            samplerate: 44100,
            stream_start_iso8601: "2025-05-28T02:00:00Z".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_roundtrips_field_for_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("now_playing.json");

        let snapshot = sample_snapshot();
        snapshot.write_to(&path).unwrap();
        let reread = NowPlayingSnapshot::read_from(&path).unwrap();
        assert_eq!(reread, snapshot);
    }

    #[test]
    fn schema_field_names_are_contract() {
        let value = serde_json::to_value(sample_snapshot()).unwrap();
        assert_eq!(value["system_status"], "online");
        assert_eq!(value["crossfade"]["music_sec"], 2.5);
        assert_eq!(value["current"]["asset_id"], "abc123");
        assert_eq!(value["breaks_queue"][0]["duration_sec"], 62.0);
        assert!(value["breaks_queue"][0].get("asset_id").is_none());
        assert!(value["breaks_queue"][0].get("played_at").is_none());
        assert_eq!(value["history"][0]["source"], "music");
        assert_eq!(value["stream"]["stream_start_iso8601"], "2025-05-28T02:00:00Z");
    }

    #[test]
    fn classify_by_directory() {
        assert_eq!(classify_path("/radio/assets/music/abc.mp3"), PlaySource::Music);
        assert_eq!(classify_path("/radio/assets/breaks/next.mp3"), PlaySource::Break);
        assert_eq!(
            classify_path("/radio/assets/bumpers/station_id_3.mp3"),
            PlaySource::Bumper
        );
        // Unknown locations default to music.
        assert_eq!(classify_path("/srv/dropins/live.mp3"), PlaySource::Music);
    }
}
