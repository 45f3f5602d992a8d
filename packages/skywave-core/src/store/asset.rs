//! Asset rows: immutable audio artifacts identified by content hash.

use std::path::Path;

use sha2::{Digest, Sha256};

use super::{Store, StoreError, StoreResult};

/// What role an audio artifact plays on air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Music,
    Break,
    Bumper,
    Bed,
    Safety,
}

impl AssetKind {
    /// Canonical lowercase name stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Break => "break",
            Self::Bumper => "bumper",
            Self::Bed => "bed",
            Self::Safety => "safety",
        }
    }

    /// Parses a stored kind name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "music" => Some(Self::Music),
            "break" => Some(Self::Break),
            "bumper" => Some(Self::Bumper),
            "bed" => Some(Self::Bed),
            "safety" => Some(Self::Safety),
            _ => None,
        }
    }
}

/// An immutable audio artifact.
///
/// The id is the sha256 of the file bytes at ingest time; the kind is fixed
/// for the asset's lifetime.
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: String,
    pub path: String,
    pub kind: AssetKind,
    pub duration_sec: f64,
    pub lufs: Option<f64>,
    pub true_peak_db: Option<f64>,
    pub energy: Option<u8>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub created_at: String,
}

/// Raw row shape; converted into [`Asset`] after the kind is validated.
#[derive(sqlx::FromRow)]
struct AssetRow {
    id: String,
    path: String,
    kind: String,
    duration_sec: f64,
    lufs: Option<f64>,
    true_peak_db: Option<f64>,
    energy: Option<i64>,
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    created_at: String,
}

impl TryFrom<AssetRow> for Asset {
    type Error = StoreError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        let kind = AssetKind::parse(&row.kind)
            .ok_or_else(|| StoreError::Invalid(format!("unknown asset kind: {}", row.kind)))?;
        Ok(Asset {
            id: row.id,
            path: row.path,
            kind,
            duration_sec: row.duration_sec,
            lufs: row.lufs,
            true_peak_db: row.true_peak_db,
            energy: row.energy.map(|e| e.clamp(0, 100) as u8),
            title: row.title,
            artist: row.artist,
            album: row.album,
            created_at: row.created_at,
        })
    }
}

const SELECT_ASSET: &str = "SELECT id, path, kind, duration_sec, lufs, true_peak_db, energy, \
     title, artist, album, created_at FROM assets";

impl Store {
    /// Inserts an asset row.
    ///
    /// # Errors
    ///
    /// - `Duplicate` if the content hash or path already exists.
    /// - `Invalid` if the duration is not positive.
    pub async fn insert_asset(&self, asset: &Asset) -> StoreResult<()> {
        if !asset.duration_sec.is_finite() || asset.duration_sec <= 0.0 {
            return Err(StoreError::Invalid(format!(
                "duration must be positive: {}",
                asset.duration_sec
            )));
        }

        let result = sqlx::query(
            "INSERT INTO assets (id, path, kind, duration_sec, lufs, true_peak_db, energy, \
             title, artist, album, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&asset.id)
        .bind(&asset.path)
        .bind(asset.kind.as_str())
        .bind(asset.duration_sec)
        .bind(asset.lufs)
        .bind(asset.true_peak_db)
        .bind(asset.energy.map(i64::from))
        .bind(&asset.title)
        .bind(&asset.artist)
        .bind(&asset.album)
        .bind(&asset.created_at)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let unique = e
                    .as_database_error()
                    .is_some_and(|d| d.is_unique_violation());
                if unique {
                    Err(StoreError::Duplicate(asset.id.clone()))
                } else {
                    Err(StoreError::Db(e))
                }
            }
        }
    }

    /// Looks up an asset by its absolute path.
    pub async fn asset_by_path(&self, path: &str) -> StoreResult<Option<Asset>> {
        let row: Option<AssetRow> = sqlx::query_as(&format!("{SELECT_ASSET} WHERE path = ?"))
            .bind(path)
            .fetch_optional(self.pool())
            .await?;
        row.map(Asset::try_from).transpose()
    }

    /// Looks up an asset by its content hash.
    pub async fn asset_by_id(&self, id: &str) -> StoreResult<Option<Asset>> {
        let row: Option<AssetRow> = sqlx::query_as(&format!("{SELECT_ASSET} WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Asset::try_from).transpose()
    }

    /// Returns every asset of a given kind.
    pub async fn assets_by_kind(&self, kind: AssetKind) -> StoreResult<Vec<Asset>> {
        let rows: Vec<AssetRow> = sqlx::query_as(&format!("{SELECT_ASSET} WHERE kind = ?"))
            .bind(kind.as_str())
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(Asset::try_from).collect()
    }

    /// Picks one asset of `kind` uniformly at random, excluding the given
    /// ids. Falls back to the full pool if the exclusion empties it.
    pub async fn random_asset(
        &self,
        kind: AssetKind,
        exclude: &[String],
    ) -> StoreResult<Option<Asset>> {
        use rand::seq::IndexedRandom;

        let all = self.assets_by_kind(kind).await?;
        if all.is_empty() {
            return Ok(None);
        }

        let eligible: Vec<&Asset> = all.iter().filter(|a| !exclude.contains(&a.id)).collect();
        let chosen = if eligible.is_empty() {
            // Exclusion must never leave us with nothing to play.
            all.choose(&mut rand::rng()).cloned()
        } else {
            eligible.choose(&mut rand::rng()).map(|a| (*a).clone())
        };
        Ok(chosen)
    }
}

/// Computes the sha256 content hash of a file, as lowercase hex.
///
/// This is the asset identity: the hash of the bytes at the path at ingest
/// time.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;
    use crate::utils::now_rfc3339;

    pub(crate) fn make_asset(id: &str, path: &str, kind: AssetKind) -> Asset {
        Asset {
            id: id.to_string(),
            path: path.to_string(),
            kind,
            duration_sec: 180.0,
            lufs: Some(-14.2),
            true_peak_db: Some(-1.1),
            energy: Some(60),
            title: Some("Test Track".to_string()),
            artist: Some("Test Artist".to_string()),
            album: None,
            created_at: now_rfc3339(),
        }
    }

    #[tokio::test]
    async fn insert_and_lookup_roundtrip() {
        let (_dir, store) = temp_store().await;
        let asset = make_asset("abc123", "/radio/assets/music/abc123.mp3", AssetKind::Music);
        store.insert_asset(&asset).await.unwrap();

        let by_id = store.asset_by_id("abc123").await.unwrap().unwrap();
        assert_eq!(by_id.path, asset.path);
        assert_eq!(by_id.kind, AssetKind::Music);
        assert_eq!(by_id.energy, Some(60));

        let by_path = store.asset_by_path(&asset.path).await.unwrap().unwrap();
        assert_eq!(by_path.id, "abc123");
    }

    #[tokio::test]
    async fn duplicate_hash_is_rejected() {
        let (_dir, store) = temp_store().await;
        let asset = make_asset("dup", "/a.mp3", AssetKind::Music);
        store.insert_asset(&asset).await.unwrap();

        let second = make_asset("dup", "/b.mp3", AssetKind::Music);
        match store.insert_asset(&second).await {
            Err(StoreError::Duplicate(id)) => assert_eq!(id, "dup"),
            other => panic!("expected Duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_positive_duration_is_invalid() {
        let (_dir, store) = temp_store().await;
        let mut asset = make_asset("bad", "/bad.mp3", AssetKind::Music);
        asset.duration_sec = 0.0;
        assert!(matches!(
            store.insert_asset(&asset).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn random_asset_respects_exclusion_until_pool_empties() {
        let (_dir, store) = temp_store().await;
        for i in 0..3 {
            store
                .insert_asset(&make_asset(
                    &format!("bumper{i}"),
                    &format!("/bumpers/{i}.mp3"),
                    AssetKind::Bumper,
                ))
                .await
                .unwrap();
        }

        // Excluding two leaves one deterministic choice.
        let exclude = vec!["bumper0".to_string(), "bumper1".to_string()];
        let picked = store
            .random_asset(AssetKind::Bumper, &exclude)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, "bumper2");

        // Excluding everything falls back to the full pool.
        let exclude_all = vec![
            "bumper0".to_string(),
            "bumper1".to_string(),
            "bumper2".to_string(),
        ];
        assert!(store
            .random_asset(AssetKind::Bumper, &exclude_all)
            .await
            .unwrap()
            .is_some());
    }

    #[test]
    fn hash_file_is_stable_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, b"some audio bytes").unwrap();

        let h1 = hash_file(&path).unwrap();
        let h2 = hash_file(&path).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
