//! Relational persistence for the control plane.
//!
//! A single-file SQLite database with WAL concurrency: writers are
//! serialized by the store, readers run concurrently with writers. This is
//! the sole source of truth for "has X already happened this hour" — all
//! idempotency checks go through [`Store::mark_scheduled`], never through
//! in-memory flags.
//!
//! All timestamps are RFC 3339 text with UTC offset; the store persists and
//! compares them but never interprets them.

mod asset;
mod history;
mod state;

pub use asset::{hash_file, Asset, AssetKind};
pub use history::{PlayRow, PlaySource, RecentPlay};
pub use state::{GenerationRun, RunStatus};

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An asset with this content hash (or path) already exists.
    #[error("duplicate asset: {0}")]
    Duplicate(String),

    /// The row failed validation (duration, kind).
    #[error("invalid asset: {0}")]
    Invalid(String),

    /// Underlying database failure.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Convenient Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to the station database.
///
/// Cheap to clone; all clones share one pool. The pool is kept small:
/// SQLite serializes writers anyway, and the WAL keeps readers off the
/// writer's back.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if necessary) the database at `path` and runs
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Fails if the parent directory cannot be created, the database cannot
    /// be opened, or a migration fails. Callers treat this as fatal.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Invalid(format!("cannot create db directory: {e}")))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Opens a store backed by a fresh temp-dir database.
    pub async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("radio.sqlite3"))
            .await
            .expect("open temp store");
        (dir, store)
    }
}
