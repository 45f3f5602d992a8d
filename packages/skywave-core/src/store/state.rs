//! Scheduler state and generation-run records.
//!
//! `mark_scheduled` is the one synchronization point between scheduler
//! runs: a linearizable set-if-absent that survives crashes and restarts.

use chrono::{DateTime, Utc};

use super::{Store, StoreResult};

/// Outcome of one content-generation job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Fail,
    Skipped,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Fail => "fail",
            Self::Skipped => "skipped",
        }
    }
}

/// One generation-run row.
#[derive(Debug, Clone)]
pub struct GenerationRun {
    pub job: String,
    pub started_at: String,
    pub finished_at: String,
    pub status: RunStatus,
    pub detail: Option<String>,
    pub output_path: Option<String>,
}

impl Store {
    /// Atomic "set if absent" on a scheduler-state key.
    ///
    /// Returns `true` iff this call wrote the key; `false` means another
    /// run (possibly in a previous process) already claimed it. This is the
    /// primitive that defeats double-scheduling.
    pub async fn mark_scheduled(&self, key: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO scheduler_state (key, value, updated_at) VALUES (?, 'scheduled', ?) \
             ON CONFLICT(key) DO NOTHING",
        )
        .bind(key)
        .bind(now.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Reads a scheduler-state value.
    pub async fn read_state(&self, key: &str) -> StoreResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM scheduler_state WHERE key = ?")
                .bind(key)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Deletes scheduler-state keys last touched before `cutoff`.
    ///
    /// Housekeeping only; the markers are meaningless once their hour has
    /// long passed.
    pub async fn prune_state_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM scheduler_state WHERE updated_at < ?")
            .bind(cutoff.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Records one generation-run row.
    pub async fn record_generation_run(&self, run: &GenerationRun) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO generation_runs (job, started_at, finished_at, status, detail, output_path) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.job)
        .bind(&run.started_at)
        .bind(&run.finished_at)
        .bind(run.status.as_str())
        .bind(&run.detail)
        .bind(&run.output_path)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Counts generation runs by status since `since` (metrics).
    pub async fn generation_run_counts_since(
        &self,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM generation_runs WHERE started_at >= ? GROUP BY status",
        )
        .bind(since.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn mark_scheduled_returns_true_exactly_once() {
        let (_dir, store) = temp_store().await;
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap();
        let key = "break:2025-06-01T14:00:00Z";

        assert!(store.mark_scheduled(key, now).await.unwrap());
        // Same period, any number of later attempts: always false.
        for _ in 0..5 {
            assert!(!store.mark_scheduled(key, now).await.unwrap());
        }

        // A different hour bucket is a fresh key.
        assert!(store
            .mark_scheduled("break:2025-06-01T15:00:00Z", now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn station_id_slots_are_independent_keys() {
        let (_dir, store) = temp_store().await;
        let now = Utc::now();
        assert!(store.mark_scheduled("station_id:2025-06-01T14:00:00Z:15", now).await.unwrap());
        assert!(store.mark_scheduled("station_id:2025-06-01T14:00:00Z:30", now).await.unwrap());
        assert!(!store.mark_scheduled("station_id:2025-06-01T14:00:00Z:15", now).await.unwrap());
    }

    #[tokio::test]
    async fn prune_removes_only_old_keys() {
        let (_dir, store) = temp_store().await;
        let old = Utc.with_ymd_and_hms(2025, 5, 30, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap();

        store.mark_scheduled("break:old", old).await.unwrap();
        store.mark_scheduled("break:new", new).await.unwrap();

        let pruned = store
            .prune_state_older_than(new - Duration::hours(48))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        assert!(store.read_state("break:old").await.unwrap().is_none());
        assert!(store.read_state("break:new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn generation_runs_record_and_count() {
        let (_dir, store) = temp_store().await;
        let started = Utc.with_ymd_and_hms(2025, 6, 1, 13, 50, 0).unwrap();
        for status in [RunStatus::Ok, RunStatus::Fail, RunStatus::Fail] {
            store
                .record_generation_run(&GenerationRun {
                    job: "break_generate".to_string(),
                    started_at: started.to_rfc3339(),
                    finished_at: (started + Duration::seconds(40)).to_rfc3339(),
                    status,
                    detail: None,
                    output_path: None,
                })
                .await
                .unwrap();
        }

        let counts = store
            .generation_run_counts_since(started - Duration::hours(1))
            .await
            .unwrap();
        let fails = counts.iter().find(|(s, _)| s == "fail").map(|(_, n)| *n);
        assert_eq!(fails, Some(2));
    }
}
