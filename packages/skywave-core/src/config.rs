//! Station configuration.
//!
//! A single immutable record, built by a loader that validates completeness
//! at startup. Missing required settings are fatal before any task starts;
//! the rest of the system never re-validates.
//!
//! Loaded from YAML. Provider API keys are pulled from the environment at
//! load time so secrets stay out of the config file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RadioError;

/// Root configuration for the Skywave control plane.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RadioConfig {
    /// Station identity and on-air texture.
    pub station: StationConfig,
    /// Filesystem layout.
    pub paths: PathsConfig,
    /// Audio engine control socket.
    pub engine: EngineConfig,
    /// Streaming server (listener stats).
    #[serde(default)]
    pub stream: StreamConfig,
    /// Content generation inputs and mixing.
    pub content: ContentConfig,
    /// Announcer persona fed to the script model.
    pub announcer: AnnouncerConfig,
    /// Script and TTS provider chains, in priority order.
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Push fan-out server.
    #[serde(default)]
    pub push: PushConfig,
    /// Scheduler tunables.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Station identity.
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    /// On-air station name; also the synthesized artist for breaks.
    pub name: String,
    /// Short tagline used in templated fallback scripts.
    #[serde(default)]
    pub tagline: String,
    /// Crossfade durations surfaced in the public snapshot.
    #[serde(default)]
    pub crossfade: CrossfadeConfig,
}

/// Crossfade durations (owned by the audio engine; we only report them).
#[derive(Debug, Clone, Deserialize)]
pub struct CrossfadeConfig {
    pub music_sec: f64,
    pub breaks_sec: f64,
}

impl Default for CrossfadeConfig {
    fn default() -> Self {
        Self {
            music_sec: 2.5,
            breaks_sec: 0.5,
        }
    }
}

/// Filesystem layout rooted at a single base directory.
///
/// Exact names under the base are contract with the audio engine scripts
/// and the web frontend; only the base moves between deployments.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Base directory for all station state.
    pub base: PathBuf,
    /// Hourly bumper used when no fresh break exists.
    pub hourly_bumper: PathBuf,
}

impl PathsConfig {
    pub fn music_dir(&self) -> PathBuf {
        self.base.join("assets/music")
    }

    pub fn breaks_dir(&self) -> PathBuf {
        self.base.join("assets/breaks")
    }

    pub fn bumpers_dir(&self) -> PathBuf {
        self.base.join("assets/bumpers")
    }

    pub fn beds_dir(&self) -> PathBuf {
        self.base.join("assets/beds")
    }

    pub fn safety_dir(&self) -> PathBuf {
        self.base.join("assets/safety")
    }

    /// The break the scheduler will play at the next top of hour.
    pub fn next_break(&self) -> PathBuf {
        self.breaks_dir().join("next.mp3")
    }

    /// The previous good break, kept as fallback.
    pub fn last_good_break(&self) -> PathBuf {
        self.breaks_dir().join("last_good.mp3")
    }

    pub fn break_archive_dir(&self) -> PathBuf {
        self.breaks_dir().join("archive")
    }

    pub fn drops_queue_dir(&self) -> PathBuf {
        self.base.join("drops/queue")
    }

    pub fn drops_processed_dir(&self) -> PathBuf {
        self.base.join("drops/queue/processed")
    }

    /// Touch file: force a break after the current track.
    pub fn force_break_trigger(&self) -> PathBuf {
        self.base.join("drops/force_break/trigger")
    }

    /// Touch file: disable content generation (stop burning API quota).
    pub fn kill_generation(&self) -> PathBuf {
        self.base.join("drops/kill_generation")
    }

    pub fn db_path(&self) -> PathBuf {
        self.base.join("db/radio.sqlite3")
    }

    pub fn now_playing(&self) -> PathBuf {
        self.base.join("public/now_playing.json")
    }

    pub fn jobs_log(&self) -> PathBuf {
        self.base.join("logs/jobs.jsonl")
    }

    pub fn schedule_state(&self) -> PathBuf {
        self.base.join("state/schedule.json")
    }

    pub fn metrics(&self) -> PathBuf {
        self.base.join("state/metrics.json")
    }

    pub fn phrase_log(&self) -> PathBuf {
        self.base.join("state/recent_phrases.log")
    }

    /// Creates every directory the layout requires.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        for dir in [
            self.music_dir(),
            self.breaks_dir(),
            self.bumpers_dir(),
            self.beds_dir(),
            self.safety_dir(),
            self.break_archive_dir(),
            self.drops_queue_dir(),
            self.drops_processed_dir(),
            self.base.join("drops/force_break"),
            self.base.join("db"),
            self.base.join("public"),
            self.base.join("logs"),
            self.base.join("state"),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Audio engine control socket.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Unix socket path exposed by the audio engine.
    pub socket_path: PathBuf,
    /// Name of the primary on-air source inside the engine.
    #[serde(default = "default_mount")]
    pub mount: String,
}

fn default_mount() -> String {
    "radio".to_string()
}

/// Streaming server stats endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StreamConfig {
    /// JSON status endpoint of the streaming server, if available.
    pub status_url: Option<String>,
    /// Mount path used to pick our source out of the status document.
    pub mount_path: String,
}

/// Content generation: external inputs and the mix step.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    /// Weather API endpoint and location.
    pub weather: WeatherConfig,
    /// RSS/Atom feeds polled for headlines, in preference order.
    #[serde(default)]
    pub feeds: Vec<String>,
    /// Accepted script length, in words.
    #[serde(default = "default_script_words")]
    pub script_words: WordRange,
    /// External mixer program (ffmpeg-compatible CLI).
    #[serde(default = "default_mixer")]
    pub mixer_program: String,
    /// Seconds of bed alone before the voice enters.
    #[serde(default = "default_bed_preroll")]
    pub bed_preroll_sec: f64,
    /// Bed fade-in / fade-out durations.
    #[serde(default = "default_fade")]
    pub fade_in_sec: f64,
    #[serde(default = "default_fade")]
    pub fade_out_sec: f64,
}

/// Weather fetch parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    /// Endpoint returning a `current_weather` JSON document.
    pub endpoint: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Inclusive word-count range for generated scripts.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WordRange {
    pub min: usize,
    pub max: usize,
}

fn default_script_words() -> WordRange {
    WordRange { min: 80, max: 220 }
}

fn default_mixer() -> String {
    "ffmpeg".to_string()
}

fn default_bed_preroll() -> f64 {
    2.0
}

fn default_fade() -> f64 {
    1.5
}

/// Announcer persona and tone rules for script synthesis.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnouncerConfig {
    /// Who is speaking.
    pub persona: String,
    /// The world the station broadcasts from.
    #[serde(default)]
    pub world_setting: String,
    /// 0-100: how far off the rails the script may go.
    #[serde(default = "default_chaos")]
    pub chaos_budget: u8,
    /// One-line humor policy.
    #[serde(default)]
    pub humor_policy: String,
    /// Phrases the model must never use.
    #[serde(default)]
    pub banned_phrases: Vec<String>,
    /// Additional tone rules, one per line of the system prompt.
    #[serde(default)]
    pub tone_rules: Vec<String>,
    /// Director prefix for voice synthesis (persona, scene, delivery).
    #[serde(default)]
    pub director_prefix: String,
}

fn default_chaos() -> u8 {
    25
}

/// Provider chains in priority order.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub script: Vec<ScriptProviderConfig>,
    pub tts: Vec<TtsProviderConfig>,
}

/// One script (LLM) provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptProviderConfig {
    pub name: String,
    /// Base URL of a chat-completions compatible API.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Populated from `api_key_env` at load time; never set in YAML.
    #[serde(skip)]
    pub api_key: String,
}

/// One TTS provider.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsProviderConfig {
    pub name: String,
    pub base_url: String,
    pub voice: String,
    pub api_key_env: String,
    #[serde(skip)]
    pub api_key: String,
}

/// Push fan-out server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Loopback port for the SSE server.
    pub port: u16,
    /// Origins allowed on `/api/stream`. Requests with a different Origin
    /// header get 403; a missing Origin (non-browser client) is permitted.
    pub allowed_origins: Vec<String>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            allowed_origins: Vec::new(),
        }
    }
}

/// Scheduler tunables (the trigger table itself is fixed policy).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Music enqueue cadence in minutes (2 or 5).
    pub music_enqueue_minutes: u32,
    /// Do nothing while the music queue holds at least this many tracks.
    pub music_queue_min: usize,
    /// Fill toward this many queued tracks.
    pub music_queue_target: usize,
    /// Bias music selection toward a time-of-day energy curve.
    pub energy_flow: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            music_enqueue_minutes: 5,
            music_queue_min: 3,
            music_queue_target: 8,
            energy_flow: true,
        }
    }
}

impl RadioConfig {
    /// Loads the configuration from a YAML file, resolves provider API keys
    /// from the environment, and validates completeness.
    ///
    /// # Errors
    ///
    /// Returns `RadioError::Fatal` if the file is missing, unparsable, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self, RadioError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RadioError::Fatal(format!("cannot read config {}: {e}", path.display()))
        })?;
        let mut config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            RadioError::Fatal(format!("cannot parse config {}: {e}", path.display()))
        })?;

        config.resolve_api_keys();
        config.validate()?;
        Ok(config)
    }

    /// Pulls provider API keys from the environment. Providers whose key is
    /// absent are dropped from the chain with a warning rather than failing
    /// startup; an empty chain still degrades cleanly at generation time.
    fn resolve_api_keys(&mut self) {
        self.providers.script.retain_mut(|p| {
            match std::env::var(&p.api_key_env) {
                Ok(key) if !key.is_empty() => {
                    p.api_key = key;
                    true
                }
                _ => {
                    log::warn!(
                        "[Config] script provider '{}' disabled: {} not set",
                        p.name,
                        p.api_key_env
                    );
                    false
                }
            }
        });
        self.providers.tts.retain_mut(|p| match std::env::var(&p.api_key_env) {
            Ok(key) if !key.is_empty() => {
                p.api_key = key;
                true
            }
            _ => {
                log::warn!(
                    "[Config] tts provider '{}' disabled: {} not set",
                    p.name,
                    p.api_key_env
                );
                false
            }
        });
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), RadioError> {
        if self.station.name.trim().is_empty() {
            return Err(RadioError::Fatal("station.name must not be empty".into()));
        }
        if self.paths.base.as_os_str().is_empty() {
            return Err(RadioError::Fatal("paths.base must not be empty".into()));
        }
        if let Some(parent) = self.engine.socket_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(RadioError::Fatal(format!(
                    "engine socket directory does not exist: {}",
                    parent.display()
                )));
            }
        }
        if self.content.script_words.min == 0
            || self.content.script_words.min >= self.content.script_words.max
        {
            return Err(RadioError::Fatal(
                "content.script_words must satisfy 0 < min < max".into(),
            ));
        }
        let m = self.schedule.music_enqueue_minutes;
        if m == 0 || 60 % m != 0 {
            return Err(RadioError::Fatal(
                "schedule.music_enqueue_minutes must divide 60".into(),
            ));
        }
        if self.schedule.music_queue_min >= self.schedule.music_queue_target {
            return Err(RadioError::Fatal(
                "schedule.music_queue_min must be below music_queue_target".into(),
            ));
        }
        Ok(())
    }
}
