//! Play history: the append-only log of what actually went on air.
//!
//! Rows are written only by the play recorder; the live system never
//! updates or deletes them.

use chrono::{DateTime, Utc};

use super::{Store, StoreResult};
use crate::utils::hour_bucket;

/// Which queue a play originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaySource {
    Music,
    Override,
    Break,
    Bumper,
}

impl PlaySource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Override => "override",
            Self::Break => "break",
            Self::Bumper => "bumper",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "music" => Some(Self::Music),
            "override" => Some(Self::Override),
            "break" => Some(Self::Break),
            "bumper" => Some(Self::Bumper),
            _ => None,
        }
    }
}

/// One play-history row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlayRow {
    pub id: i64,
    pub asset_id: String,
    pub played_at: String,
    pub source: String,
    pub hour_bucket: String,
}

/// A recent play joined with asset metadata where available.
///
/// Breaks and bumpers have no asset row; their titles are synthesized by
/// the exporter from the classification.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecentPlay {
    pub asset_id: String,
    pub played_at: String,
    pub source: String,
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl Store {
    /// Appends a play-history row.
    ///
    /// The hour bucket is computed here from `played_at`. The log is
    /// append-only by design: duplicates are accepted.
    pub async fn record_play(
        &self,
        asset_id: &str,
        source: PlaySource,
        played_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO play_history (asset_id, played_at, source, hour_bucket) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(asset_id)
        .bind(played_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .bind(source.as_str())
        .bind(hour_bucket(played_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Returns the last `window` distinct asset ids played from `source`,
    /// newest first. Used by music enqueue for anti-repetition.
    pub async fn recently_played_ids(
        &self,
        source: PlaySource,
        window: usize,
    ) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT asset_id FROM play_history WHERE source = ? \
             GROUP BY asset_id ORDER BY MAX(played_at) DESC LIMIT ?",
        )
        .bind(source.as_str())
        .bind(window as i64)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Returns the most recent plays (any source), newest first, joined
    /// with asset titles where a matching asset row exists.
    pub async fn recent_plays(&self, limit: usize) -> StoreResult<Vec<RecentPlay>> {
        let rows: Vec<RecentPlay> = sqlx::query_as(
            "SELECT ph.asset_id, ph.played_at, ph.source, a.title, a.artist \
             FROM play_history ph LEFT JOIN assets a ON a.id = ph.asset_id \
             ORDER BY ph.id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Finds the newest play of the asset stored at `path`, no older than
    /// `since`. Music tracks are matched this way (path -> content hash).
    pub async fn latest_play_for_path(
        &self,
        path: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<PlayRow>> {
        let row: Option<PlayRow> = sqlx::query_as(
            "SELECT ph.id, ph.asset_id, ph.played_at, ph.source, ph.hour_bucket \
             FROM play_history ph JOIN assets a ON a.id = ph.asset_id \
             WHERE a.path = ? AND ph.played_at >= ? \
             ORDER BY ph.played_at DESC LIMIT 1",
        )
        .bind(path)
        .bind(since.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Finds the newest break/bumper play recorded under a filename stem,
    /// no older than `since`.
    ///
    /// The caller keeps `since` tight (seconds, not minutes): a replayed
    /// station-ID must not match an old row and inherit its timestamp.
    pub async fn latest_play_for_stem(
        &self,
        stem: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<PlayRow>> {
        let row: Option<PlayRow> = sqlx::query_as(
            "SELECT id, asset_id, played_at, source, hour_bucket FROM play_history \
             WHERE asset_id = ? AND played_at >= ? AND source IN ('break', 'bumper') \
             ORDER BY played_at DESC LIMIT 1",
        )
        .bind(stem)
        .bind(since.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Counts plays recorded since `since` (metrics).
    pub async fn plays_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM play_history WHERE played_at >= ?")
                .bind(since.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
                .fetch_one(self.pool())
                .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;
    use crate::store::{Asset, AssetKind};
    use chrono::{Duration, TimeZone};

    fn music_asset(n: u32) -> Asset {
        Asset {
            id: format!("hash{n}"),
            path: format!("/radio/assets/music/{n}.mp3"),
            kind: AssetKind::Music,
            duration_sec: 200.0,
            lufs: None,
            true_peak_db: None,
            energy: None,
            title: Some(format!("Track {n}")),
            artist: Some("Somebody".to_string()),
            album: None,
            created_at: crate::utils::now_rfc3339(),
        }
    }

    #[tokio::test]
    async fn record_play_computes_hour_bucket() {
        let (_dir, store) = temp_store().await;
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 4).unwrap();
        store.record_play("hash1", PlaySource::Break, at).await.unwrap();

        let rows = store.recent_plays(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, "break");

        let row = store
            .latest_play_for_stem("hash1", at - Duration::seconds(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.hour_bucket, "2025-06-01T14:00:00Z");
    }

    #[tokio::test]
    async fn recently_played_ids_are_distinct_and_newest_first() {
        let (_dir, store) = temp_store().await;
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        for (i, id) in ["a", "b", "a", "c"].iter().enumerate() {
            store
                .record_play(id, PlaySource::Music, base + Duration::minutes(i as i64))
                .await
                .unwrap();
        }

        let ids = store.recently_played_ids(PlaySource::Music, 10).await.unwrap();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let windowed = store.recently_played_ids(PlaySource::Music, 2).await.unwrap();
        assert_eq!(windowed, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn stem_lookup_honors_window_and_source() {
        let (_dir, store) = temp_store().await;
        let old = Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 14, 15, 0).unwrap();

        // An old play of the same station-ID must not match a tight window.
        store.record_play("station_id_3", PlaySource::Bumper, old).await.unwrap();
        let found = store
            .latest_play_for_stem("station_id_3", now - Duration::seconds(30))
            .await
            .unwrap();
        assert!(found.is_none());

        // A fresh play does.
        store.record_play("station_id_3", PlaySource::Bumper, now).await.unwrap();
        let found = store
            .latest_play_for_stem("station_id_3", now - Duration::seconds(30))
            .await
            .unwrap();
        assert!(found.is_some());

        // Music rows never match the stem lookup.
        store.record_play("station_id_3", PlaySource::Music, now).await.unwrap();
        let row = store
            .latest_play_for_stem("station_id_3", now - Duration::seconds(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.source, "bumper");
    }

    #[tokio::test]
    async fn path_lookup_joins_through_assets() {
        let (_dir, store) = temp_store().await;
        let asset = music_asset(7);
        store.insert_asset(&asset).await.unwrap();

        let at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        store.record_play(&asset.id, PlaySource::Music, at).await.unwrap();

        let row = store
            .latest_play_for_path(&asset.path, at - Duration::minutes(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.asset_id, asset.id);

        // Outside the window: nothing.
        let none = store
            .latest_play_for_path(&asset.path, at + Duration::minutes(1))
            .await
            .unwrap();
        assert!(none.is_none());
    }
}
