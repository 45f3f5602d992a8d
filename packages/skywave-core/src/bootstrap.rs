//! Application bootstrap and dependency wiring.
//!
//! The composition root: the single place where services are instantiated
//! and wired together. Both binaries (the supervisor daemon and the
//! on_track hook) build from here, so the wiring cannot drift between
//! them.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::config::RadioConfig;
use crate::content::BreakGenerator;
use crate::engine::EngineClient;
use crate::error::{RadioError, RadioResult};
use crate::fanout::Broadcaster;
use crate::now_playing::export::Exporter;
use crate::recorder::Recorder;
use crate::scheduler::breaks::{BreakGenerateTask, BreakScheduleTask};
use crate::scheduler::clock::TriggerSpec;
use crate::scheduler::export::ExportFallbackTask;
use crate::scheduler::housekeeping::HousekeepingTask;
use crate::scheduler::joblog::JobLogger;
use crate::scheduler::metrics::MetricsTask;
use crate::scheduler::music::MusicEnqueueTask;
use crate::scheduler::station_id::StationIdTask;
use crate::scheduler::supervisor::Supervisor;
use crate::scheduler::ScheduledTask;
use crate::store::Store;

/// Default timeout guard on the shared HTTP client. Individual calls set
/// tighter per-request timeouts.
const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Container for all bootstrapped services.
pub struct BootstrappedServices {
    /// Validated immutable configuration.
    pub config: Arc<RadioConfig>,
    /// Station database handle.
    pub store: Store,
    /// Audio engine control client.
    pub engine: EngineClient,
    /// Break content generator.
    pub generator: Arc<BreakGenerator>,
    /// Now-playing exporter.
    pub exporter: Arc<Exporter>,
    /// on_track handler.
    pub recorder: Arc<Recorder>,
    /// SSE fan-out.
    pub broadcaster: Broadcaster,
    /// Scheduling triggers.
    pub supervisor: Arc<Supervisor>,
    /// Cancellation token for graceful shutdown.
    pub cancel: CancellationToken,
    /// Shared HTTP client for connection pooling.
    http_client: Client,
}

impl BootstrappedServices {
    /// Returns the shared HTTP client.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Starts the scheduler trigger loops.
    pub fn start_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.supervisor.start()
    }

    /// Initiates graceful shutdown: the restarting broadcast goes out
    /// before anything stops, so clients see explanatory state while
    /// listeners shift to the fallback mount.
    pub async fn shutdown(&self, message: &str) {
        log::info!("[Bootstrap] beginning graceful shutdown");
        self.broadcaster.shutdown(message).await;
        self.cancel.cancel();
        log::info!("[Bootstrap] shutdown signaled");
    }
}

/// Creates the shared HTTP client used by providers, feeds, weather, the
/// streaming-server stats fetch, and notify POSTs.
fn create_http_client() -> Client {
    Client::builder()
        .timeout(HTTP_CLIENT_TIMEOUT)
        .build()
        .expect("Failed to create HTTP client")
}

/// Bootstraps all services with their dependencies.
///
/// Wiring order follows dependencies: store and engine client first, then
/// the generator and exporter over them, then the supervisor with its task
/// table.
pub async fn bootstrap_services(config: RadioConfig) -> RadioResult<BootstrappedServices> {
    let config = Arc::new(config);

    config
        .paths
        .ensure_layout()
        .map_err(|e| RadioError::Fatal(format!("cannot create station layout: {e}")))?;

    // The engine's last-resort fallback needs something evergreen to play.
    let safety_empty = std::fs::read_dir(config.paths.safety_dir())
        .map(|entries| entries.filter_map(Result::ok).next().is_none())
        .unwrap_or(true);
    if safety_empty {
        log::error!(
            "[Bootstrap] no safety assets under {}; the engine's last fallback tier is empty",
            config.paths.safety_dir().display()
        );
    }

    let http_client = create_http_client();

    let store = Store::open(&config.paths.db_path())
        .await
        .map_err(|e| RadioError::Fatal(format!("cannot open store: {e}")))?;

    let engine = EngineClient::new(
        config.engine.socket_path.clone(),
        config.engine.mount.clone(),
    );

    let broadcaster = Broadcaster::new();

    let generator = Arc::new(BreakGenerator::new(
        Arc::clone(&config),
        store.clone(),
        http_client.clone(),
    ));

    let exporter = Arc::new(Exporter::new(
        Arc::clone(&config),
        store.clone(),
        engine.clone(),
        http_client.clone(),
    ));

    let recorder = Arc::new(Recorder::new(
        Arc::clone(&config),
        store.clone(),
        Arc::clone(&exporter),
    ));

    let cancel = CancellationToken::new();
    let mut supervisor = Supervisor::new(
        config.paths.schedule_state(),
        JobLogger::new(config.paths.jobs_log()),
        cancel.clone(),
    );

    // The trigger table. Every trigger carries catch-up semantics; tasks
    // whose guards make a late fire meaningless just skip.
    let persistent = |period_min, offset_min| TriggerSpec {
        period_min,
        offset_min,
        persistent: true,
    };

    supervisor.register(
        persistent(config.schedule.music_enqueue_minutes, 0),
        Arc::new(MusicEnqueueTask::new(
            Arc::clone(&config),
            store.clone(),
            engine.clone(),
        )) as Arc<dyn ScheduledTask>,
    );
    supervisor.register(
        persistent(60, 50),
        Arc::new(BreakGenerateTask::new(Arc::clone(&generator))) as Arc<dyn ScheduledTask>,
    );
    supervisor.register(
        persistent(5, 0),
        Arc::new(BreakScheduleTask::new(
            Arc::clone(&config),
            store.clone(),
            engine.clone(),
        )) as Arc<dyn ScheduledTask>,
    );
    supervisor.register(
        persistent(1, 0),
        Arc::new(StationIdTask::new(
            Arc::clone(&config),
            store.clone(),
            engine.clone(),
        )) as Arc<dyn ScheduledTask>,
    );
    supervisor.register(
        persistent(2, 0),
        Arc::new(ExportFallbackTask::new(Arc::clone(&exporter))) as Arc<dyn ScheduledTask>,
    );
    supervisor.register(
        persistent(1, 0),
        Arc::new(MetricsTask::new(
            Arc::clone(&config),
            store.clone(),
            broadcaster.clone(),
            http_client.clone(),
        )) as Arc<dyn ScheduledTask>,
    );
    supervisor.register(
        persistent(60, 20),
        Arc::new(HousekeepingTask::new(store.clone())) as Arc<dyn ScheduledTask>,
    );

    Ok(BootstrappedServices {
        config,
        store,
        engine,
        generator,
        exporter,
        recorder,
        broadcaster,
        supervisor: Arc::new(supervisor),
        cancel,
        http_client,
    })
}

/// Minimal wiring for the on_track hook: store, engine client, exporter,
/// recorder — nothing else.
///
/// The hook runs once per track transition under a hard deadline; it never
/// uses the supervisor, the fan-out, or the generator, and wiring them
/// would spend the engine's patience on setup. The layout is not created
/// here either: the daemon owns it, and a hook firing before the daemon
/// ever ran has nothing useful to record anyway.
pub async fn bootstrap_recorder(config: RadioConfig) -> RadioResult<Arc<Recorder>> {
    let config = Arc::new(config);
    let http_client = create_http_client();

    let store = Store::open(&config.paths.db_path())
        .await
        .map_err(|e| RadioError::Fatal(format!("cannot open store: {e}")))?;

    let engine = EngineClient::new(
        config.engine.socket_path.clone(),
        config.engine.mount.clone(),
    );

    let exporter = Arc::new(Exporter::new(
        Arc::clone(&config),
        store.clone(),
        engine,
        http_client,
    ));

    Ok(Arc::new(Recorder::new(config, store, exporter)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_builds_layout_and_services() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            "station:\n  name: S\npaths:\n  base: {base}\n  hourly_bumper: {base}/b.mp3\n\
             engine:\n  socket_path: {base}/engine.sock\ncontent:\n  weather:\n    endpoint: http://127.0.0.1:1/\n    latitude: 0\n    longitude: 0\nannouncer:\n  persona: p\n",
            base = dir.path().display()
        );
        let config_path = dir.path().join("c.yaml");
        std::fs::write(&config_path, yaml).unwrap();
        let config = RadioConfig::load(&config_path).unwrap();

        let services = bootstrap_services(config).await.unwrap();
        assert!(services.config.paths.drops_processed_dir().is_dir());
        assert!(services.config.paths.db_path().exists());
        assert_eq!(services.broadcaster.client_count(), 0);
    }

    #[tokio::test]
    async fn recorder_bootstrap_is_minimal_but_records() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            "station:\n  name: S\npaths:\n  base: {base}\n  hourly_bumper: {base}/b.mp3\n\
             engine:\n  socket_path: {base}/engine.sock\ncontent:\n  weather:\n    endpoint: http://127.0.0.1:1/\n    latitude: 0\n    longitude: 0\nannouncer:\n  persona: p\n",
            base = dir.path().display()
        );
        let config_path = dir.path().join("c.yaml");
        std::fs::write(&config_path, yaml).unwrap();
        let config = RadioConfig::load(&config_path).unwrap();
        let db_path = config.paths.db_path();

        let recorder = bootstrap_recorder(config).await.unwrap();
        recorder
            .record_start("/radio/assets/breaks/next.mp3", "breaks")
            .await
            .unwrap();

        // The row is visible to any other store handle (the daemon's).
        let store = Store::open(&db_path).await.unwrap();
        let plays = store.recent_plays(5).await.unwrap();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].source, "break");
        assert_eq!(plays[0].asset_id, "next");
    }
}
