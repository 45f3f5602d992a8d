//! Trigger ownership, task isolation, and missed-fire catch-up.
//!
//! One tokio task per trigger sleeps until the next canonical instant and
//! fires. A task run is spawned and bounded by its deadline; a panic or
//! overrun is logged and the trigger keeps its schedule. The same task is
//! never run concurrently with itself: each trigger loop awaits the run
//! before sleeping again.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::clock::{missed_since, next_aligned, FireState, TriggerSpec};
use super::joblog::{JobLogger, JobRecord};
use super::{ScheduledTask, TaskOutcome};
use crate::utils::now_rfc3339;

struct Trigger {
    spec: TriggerSpec,
    task: Arc<dyn ScheduledTask>,
}

/// Owns the scheduling triggers and the persisted fire state.
pub struct Supervisor {
    triggers: Vec<Trigger>,
    fire_state: Mutex<FireState>,
    state_path: PathBuf,
    job_log: JobLogger,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(state_path: PathBuf, job_log: JobLogger, cancel: CancellationToken) -> Self {
        let fire_state = FireState::load(&state_path);
        Self {
            triggers: Vec::new(),
            fire_state: Mutex::new(fire_state),
            state_path,
            job_log,
            cancel,
        }
    }

    /// Registers a task under a trigger spec.
    pub fn register(&mut self, spec: TriggerSpec, task: Arc<dyn ScheduledTask>) {
        self.triggers.push(Trigger { spec, task });
    }

    /// Spawns one loop per trigger. The returned handles finish after the
    /// cancellation token fires and any in-flight run completes.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.triggers
            .iter()
            .map(|trigger| {
                let supervisor = Arc::clone(self);
                let spec = trigger.spec;
                let task = Arc::clone(&trigger.task);
                tokio::spawn(async move { supervisor.run_trigger(spec, task).await })
            })
            .collect()
    }

    async fn run_trigger(&self, spec: TriggerSpec, task: Arc<dyn ScheduledTask>) {
        let name = task.name();

        // Missed-fire semantics: downtime across K>=1 scheduled instants
        // earns exactly one catch-up fire at start.
        if spec.persistent {
            let now = Local::now();
            let missed = {
                let state = self.fire_state.lock();
                state
                    .last_fired(name)
                    .is_some_and(|last| missed_since(last, now, &spec))
            };
            if missed {
                log::info!("[Supervisor] {name}: catching up one missed fire");
                self.fire(&spec, &task, now).await;
            }
        }

        loop {
            let next = next_aligned(Local::now(), &spec);
            let sleep_for = (next - Local::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);

            tokio::select! {
                () = self.cancel.cancelled() => {
                    log::info!("[Supervisor] {name}: stopping");
                    return;
                }
                () = tokio::time::sleep(sleep_for) => {}
            }

            self.fire(&spec, &task, next).await;
        }
    }

    /// Runs the task once with isolation: its own tokio task, its own
    /// deadline, its panic contained.
    async fn fire(&self, _spec: &TriggerSpec, task: &Arc<dyn ScheduledTask>, now: DateTime<Local>) {
        let name = task.name();
        let deadline = task.deadline();
        let started = std::time::Instant::now();

        let run = Arc::clone(task);
        let mut handle = tokio::spawn(async move { run.run(now).await });

        let outcome = tokio::select! {
            result = &mut handle => match result {
                Ok(outcome) => outcome,
                Err(join_error) => TaskOutcome::Fail {
                    error: format!("task panicked: {join_error}"),
                },
            },
            () = tokio::time::sleep(deadline) => {
                handle.abort();
                TaskOutcome::Fail {
                    error: format!("deadline of {deadline:?} expired"),
                }
            }
        };

        // The fire is recorded regardless of outcome; catch-up semantics
        // are about instants, not successes.
        {
            let mut state = self.fire_state.lock();
            state.record(name, now);
            if let Err(e) = state.save(&self.state_path) {
                log::warn!("[Supervisor] could not persist fire state: {e}");
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            TaskOutcome::Ok { output } => {
                log::info!("[Supervisor] {name}: ok in {duration_ms}ms");
                self.job_log.append(&JobRecord {
                    ts: now_rfc3339(),
                    task: name.to_string(),
                    status: "ok".into(),
                    duration_ms,
                    error: None,
                    output_path: output.clone(),
                });
            }
            TaskOutcome::Skipped { reason } => {
                log::info!("[Supervisor] {name}: skipped ({reason})");
                self.job_log.append(&JobRecord {
                    ts: now_rfc3339(),
                    task: name.to_string(),
                    status: "skipped".into(),
                    duration_ms,
                    error: None,
                    output_path: None,
                });
            }
            TaskOutcome::Fail { error } => {
                log::warn!("[Supervisor] {name}: failed in {duration_ms}ms: {error}");
                self.job_log.append(&JobRecord {
                    ts: now_rfc3339(),
                    task: name.to_string(),
                    status: "fail".into(),
                    duration_ms,
                    error: Some(error.clone()),
                    output_path: None,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        fires: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledTask for CountingTask {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _now: DateTime<Local>) -> TaskOutcome {
            self.fires.fetch_add(1, Ordering::SeqCst);
            TaskOutcome::Ok { output: None }
        }
    }

    struct PanickingTask;

    #[async_trait]
    impl ScheduledTask for PanickingTask {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn run(&self, _now: DateTime<Local>) -> TaskOutcome {
            panic!("task blew up");
        }
    }

    const HOURLY: TriggerSpec = TriggerSpec {
        period_min: 60,
        offset_min: 0,
        persistent: true,
    };

    fn supervisor_in(dir: &tempfile::TempDir) -> Supervisor {
        Supervisor::new(
            dir.path().join("state/schedule.json"),
            JobLogger::new(dir.path().join("logs/jobs.jsonl")),
            CancellationToken::new(),
        )
    }

    async fn wait_for_fires(task: &Arc<CountingTask>, expected: usize) {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while task.fires.load(Ordering::SeqCst) < expected {
            assert!(
                tokio::time::Instant::now() < deadline,
                "task never reached {expected} fires"
            );
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn missed_instants_earn_exactly_one_catch_up_fire() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state/schedule.json");
        std::fs::create_dir_all(state_path.parent().unwrap()).unwrap();

        // Last fired three hours ago: K=3 missed instants.
        let mut state = FireState::default();
        state.record("counting", Local::now() - ChronoDuration::hours(3));
        state.save(&state_path).unwrap();

        let mut supervisor = supervisor_in(&dir);
        let task = Arc::new(CountingTask {
            fires: AtomicUsize::new(0),
        });
        supervisor.register(HOURLY, Arc::clone(&task) as Arc<dyn ScheduledTask>);

        let supervisor = Arc::new(supervisor);
        let handles = supervisor.start();

        wait_for_fires(&task, 1).await;
        // Give it a beat: there must be no second catch-up.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(task.fires.load(Ordering::SeqCst), 1);

        supervisor.cancel.cancel();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn no_catch_up_when_nothing_was_missed() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state/schedule.json");
        std::fs::create_dir_all(state_path.parent().unwrap()).unwrap();

        // Fired moments ago: the next instant has not passed.
        let mut state = FireState::default();
        state.record("counting", Local::now());
        state.save(&state_path).unwrap();

        let mut supervisor = supervisor_in(&dir);
        let task = Arc::new(CountingTask {
            fires: AtomicUsize::new(0),
        });
        supervisor.register(HOURLY, Arc::clone(&task) as Arc<dyn ScheduledTask>);

        let supervisor = Arc::new(supervisor);
        let handles = supervisor.start();

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(task.fires.load(Ordering::SeqCst), 0);

        supervisor.cancel.cancel();
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn a_panicking_task_is_contained_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state/schedule.json");
        std::fs::create_dir_all(state_path.parent().unwrap()).unwrap();

        let mut state = FireState::default();
        state.record("panicking", Local::now() - ChronoDuration::hours(1));
        state.save(&state_path).unwrap();

        let mut supervisor = supervisor_in(&dir);
        supervisor.register(HOURLY, Arc::new(PanickingTask) as Arc<dyn ScheduledTask>);

        let supervisor = Arc::new(supervisor);
        let handles = supervisor.start();

        // The catch-up fire panics; the supervisor must survive and log it.
        let job_log = dir.path().join("logs/jobs.jsonl");
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if let Ok(contents) = std::fs::read_to_string(&job_log) {
                if contents.contains("\"status\":\"fail\"") && contents.contains("panicked") {
                    break;
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "panic never logged");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        supervisor.cancel.cancel();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
