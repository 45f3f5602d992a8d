//! Hourly housekeeping: prune expired scheduler-state markers.
//!
//! `mark_scheduled` keys are meaningless once their hour is long past;
//! without pruning the table grows forever on a 24/7 host.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};

use super::{ScheduledTask, TaskOutcome};
use crate::constants::STATE_PRUNE_AGE;
use crate::store::Store;

pub struct HousekeepingTask {
    store: Store,
}

impl HousekeepingTask {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ScheduledTask for HousekeepingTask {
    fn name(&self) -> &'static str {
        "housekeeping"
    }

    async fn run(&self, _now: DateTime<Local>) -> TaskOutcome {
        let cutoff = Utc::now() - chrono::Duration::from_std(STATE_PRUNE_AGE).unwrap();
        match self.store.prune_state_older_than(cutoff).await {
            Ok(pruned) => {
                if pruned > 0 {
                    log::info!("[Housekeeping] pruned {pruned} scheduler-state keys");
                }
                TaskOutcome::Ok { output: None }
            }
            Err(e) => TaskOutcome::Fail {
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;

    #[tokio::test]
    async fn prunes_only_expired_markers() {
        let (_dir, store) = temp_store().await;
        let old = Utc::now() - chrono::Duration::hours(72);
        store.mark_scheduled("break:ancient", old).await.unwrap();
        store.mark_scheduled("break:current", Utc::now()).await.unwrap();

        let task = HousekeepingTask::new(store.clone());
        let outcome = task.run(Local::now()).await;
        assert!(matches!(outcome, TaskOutcome::Ok { .. }));

        assert!(store.read_state("break:ancient").await.unwrap().is_none());
        assert!(store.read_state("break:current").await.unwrap().is_some());
    }
}
