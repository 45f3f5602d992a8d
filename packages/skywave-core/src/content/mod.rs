//! Break content generation.
//!
//! One run produces one finished break artifact and atomically publishes it
//! as `next.mp3`. Every step has an explicit fallback; the one thing a
//! failed run is never allowed to do is damage the previous artifacts.

pub mod inputs;
pub mod mixer;
pub mod phrases;
pub mod prompt;
pub mod publish;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RadioConfig;
use crate::constants::PHRASE_CONTEXT_LINES;
use crate::error::RadioError;
use crate::providers::{run_chain, HttpScriptProvider, HttpTtsProvider, ScriptProvider, TtsProvider};
use crate::store::{AssetKind, GenerationRun, RunStatus, Store};
use crate::utils::now_rfc3339;
use mixer::{MixSpec, Mixer};
use phrases::PhraseLog;

/// Result of one generation run.
#[derive(Debug)]
pub enum GenerationOutcome {
    /// A new break was published at this path.
    Published(PathBuf),
    /// The kill switch was present; nothing was attempted.
    Skipped,
    /// The run failed; `next` and `last_good` are untouched.
    Failed(RadioError),
}

/// Orchestrates input gathering, script and voice synthesis, the external
/// mix, and atomic publication.
pub struct BreakGenerator {
    config: Arc<RadioConfig>,
    store: Store,
    http: reqwest::Client,
    script_providers: Vec<Arc<dyn ScriptProvider>>,
    tts_providers: Vec<Arc<dyn TtsProvider>>,
    phrase_log: PhraseLog,
    mixer: Mixer,
}

impl BreakGenerator {
    /// Wires a generator from configuration. Provider chains keep the
    /// configured priority order.
    pub fn new(config: Arc<RadioConfig>, store: Store, http: reqwest::Client) -> Self {
        let script_providers: Vec<Arc<dyn ScriptProvider>> = config
            .providers
            .script
            .iter()
            .map(|c| Arc::new(HttpScriptProvider::from_config(http.clone(), c)) as Arc<dyn ScriptProvider>)
            .collect();
        let tts_providers: Vec<Arc<dyn TtsProvider>> = config
            .providers
            .tts
            .iter()
            .map(|c| Arc::new(HttpTtsProvider::from_config(http.clone(), c)) as Arc<dyn TtsProvider>)
            .collect();

        Self {
            phrase_log: PhraseLog::new(config.paths.phrase_log()),
            mixer: Mixer::from_config(&config.content),
            config,
            store,
            http,
            script_providers,
            tts_providers,
        }
    }

    /// Runs one generation cycle and records a generation-run row.
    pub async fn generate(&self) -> GenerationOutcome {
        let started_at = now_rfc3339();

        // The "stop burning API quota" control: checked before any
        // external call.
        if self.config.paths.kill_generation().exists() {
            log::info!("[Content] kill switch present; skipping generation");
            self.record_run(&started_at, RunStatus::Skipped, Some("kill switch"), None)
                .await;
            return GenerationOutcome::Skipped;
        }

        match self.run_pipeline().await {
            Ok(published) => {
                self.record_run(
                    &started_at,
                    RunStatus::Ok,
                    None,
                    Some(published.display().to_string()),
                )
                .await;
                GenerationOutcome::Published(published)
            }
            Err(e) => {
                log::warn!("[Content] generation failed: {e}");
                self.record_run(&started_at, RunStatus::Fail, Some(&e.to_string()), None)
                    .await;
                GenerationOutcome::Failed(e)
            }
        }
    }

    async fn run_pipeline(&self) -> Result<PathBuf, RadioError> {
        // 1. Inputs, in parallel. Only both sides failing aborts.
        let inputs = inputs::gather(&self.http, &self.config.content).await?;

        // 2. Negative context under a shared lock; a contended lock costs
        // us the context, not the break.
        let recent = self.phrase_log.recent(PHRASE_CONTEXT_LINES).unwrap_or_else(|e| {
            log::warn!("[Content] phrase log read failed: {e}");
            Vec::new()
        });

        // 3-4. Script with length validation.
        let script = self.synthesize_script(&inputs, &recent).await;

        // 5. Voice.
        let voice_path = self.synthesize_voice(&script).await?;

        // 6. Mix over a random bed.
        let bed = self.pick_bed().await?;
        let breaks_dir = self.config.paths.breaks_dir();
        let mixed = breaks_dir.join(format!(".tmp-break-{}.mp3", uuid::Uuid::new_v4().simple()));
        let mix_result = self
            .mixer
            .run(&MixSpec {
                voice: &voice_path,
                bed: &bed,
                output: &mixed,
            })
            .await;
        let _ = std::fs::remove_file(&voice_path);
        mix_result?;

        // 7. Atomic publish with last_good rotation.
        let published = publish::publish_break(
            &mixed,
            &self.config.paths.next_break(),
            &self.config.paths.last_good_break(),
        )?;

        // 8. Post-conditions: remember what we said.
        if let Err(e) = self.phrase_log.append(&extract_phrases(&script)) {
            log::warn!("[Content] phrase log append failed: {e}");
        }

        log::info!("[Content] published break at {}", published.display());
        Ok(published)
    }

    /// Runs the script chain with up to two stricter retries when the
    /// length validation rejects a draft. If the chain is exhausted, falls
    /// back to a templated script built from the inputs.
    async fn synthesize_script(
        &self,
        inputs: &inputs::GatheredInputs,
        recent: &[String],
    ) -> String {
        let words = self.config.content.script_words;
        let base = prompt::build_prompt(
            &self.config.station,
            &self.config.announcer,
            words,
            inputs,
            recent,
        );

        let mut bundle = base.clone();
        let mut closest: Option<(usize, String)> = None;

        for attempt in 0..3 {
            let request = bundle.clone();
            let result = run_chain("script", &self.script_providers, |p| {
                let request = request.clone();
                async move { p.generate(&request).await }
            })
            .await;

            match result {
                Ok(draft) => {
                    let count = prompt::word_count(&draft);
                    if count >= words.min && count <= words.max {
                        return draft;
                    }
                    log::info!(
                        "[Content] draft length {count} outside {}-{} (attempt {})",
                        words.min,
                        words.max,
                        attempt + 1
                    );
                    let distance = if count < words.min {
                        words.min - count
                    } else {
                        count - words.max
                    };
                    if closest.as_ref().is_none_or(|(best, _)| distance < *best) {
                        closest = Some((distance, draft));
                    }
                    bundle = prompt::tighten_for_retry(&base, words, attempt);
                }
                Err(e) => {
                    log::warn!("[Content] script chain exhausted: {e}");
                    break;
                }
            }
        }

        match closest {
            // Accept the closest off-length candidate over the canned text.
            Some((_, draft)) => draft,
            None => prompt::fallback_script(&self.config.station, inputs),
        }
    }

    /// Runs the TTS chain and lands the raw voice audio at a temp path.
    async fn synthesize_voice(&self, script: &str) -> Result<PathBuf, RadioError> {
        let director = self.config.announcer.director_prefix.clone();
        let script_owned = script.to_string();

        let audio = run_chain("tts", &self.tts_providers, |p| {
            let script = script_owned.clone();
            let director = director.clone();
            async move { p.synthesize(&script, &director).await }
        })
        .await?;

        let path = self
            .config
            .paths
            .breaks_dir()
            .join(format!(".tmp-voice-{}.mp3", uuid::Uuid::new_v4().simple()));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &audio)?;
        Ok(path)
    }

    /// Picks a bed: store assets first, then a directory scan.
    async fn pick_bed(&self) -> Result<PathBuf, RadioError> {
        if let Some(asset) = self.store.random_asset(AssetKind::Bed, &[]).await? {
            return Ok(PathBuf::from(asset.path));
        }
        mixer::random_bed_file(&self.config.paths.beds_dir())
            .ok_or_else(|| RadioError::MixFailed("no bed assets available".into()))
    }

    async fn record_run(
        &self,
        started_at: &str,
        status: RunStatus,
        detail: Option<&str>,
        output_path: Option<String>,
    ) {
        let run = GenerationRun {
            job: "break_generate".to_string(),
            started_at: started_at.to_string(),
            finished_at: now_rfc3339(),
            status,
            detail: detail.map(str::to_string),
            output_path,
        };
        if let Err(e) = self.store.record_generation_run(&run).await {
            log::warn!("[Content] could not record generation run: {e}");
        }
    }
}

/// Pulls the memorable sentences out of a script for the phrase log.
///
/// Short connective sentences make useless negative context; keep the
/// substantial ones, capped so one break cannot flood the log.
fn extract_phrases(script: &str) -> Vec<String> {
    script
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.split_whitespace().count() >= 5)
        .take(5)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;

    fn test_config(base: &std::path::Path) -> Arc<RadioConfig> {
        let yaml = format!(
            r#"
station:
  name: Skywave FM
paths:
  base: {base}
  hourly_bumper: {base}/assets/bumpers/top_of_hour.mp3
engine:
  socket_path: {base}/engine.sock
content:
  weather:
    endpoint: http://127.0.0.1:1/forecast
    latitude: 47.6
    longitude: -122.3
announcer:
  persona: test host
"#,
            base = base.display()
        );
        let path = base.join("skywave.yaml");
        std::fs::write(&path, yaml).unwrap();
        Arc::new(RadioConfig::load(&path).unwrap())
    }

    #[test]
    fn extract_phrases_keeps_substantial_sentences() {
        let script = "Good evening. The ferry schedule changes again this Friday night. \
                      Yes. Rain moving in from the west around eleven tonight! Stay dry.";
        let phrases = extract_phrases(script);
        assert_eq!(
            phrases,
            vec![
                "The ferry schedule changes again this Friday night",
                "Rain moving in from the west around eleven tonight",
            ]
        );
    }

    #[test]
    fn extract_phrases_caps_at_five() {
        let script = "one two three four five six. ".repeat(10);
        assert_eq!(extract_phrases(&script).len(), 5);
    }

    #[tokio::test]
    async fn kill_switch_skips_before_any_external_call() {
        let (dir, store) = temp_store().await;
        let config = test_config(dir.path());
        config.paths.ensure_layout().unwrap();
        std::fs::write(config.paths.kill_generation(), b"").unwrap();

        let generator = BreakGenerator::new(Arc::clone(&config), store.clone(), reqwest::Client::new());
        assert!(matches!(generator.generate().await, GenerationOutcome::Skipped));

        let counts = store
            .generation_run_counts_since(chrono::Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(counts, vec![("skipped".to_string(), 1)]);
    }

    #[tokio::test]
    async fn dead_inputs_fail_without_touching_artifacts() {
        let (dir, store) = temp_store().await;
        let config = test_config(dir.path());
        config.paths.ensure_layout().unwrap();

        // Seed prior artifacts; the failed run must leave them alone.
        std::fs::write(config.paths.next_break(), b"prior next").unwrap();
        std::fs::write(config.paths.last_good_break(), b"prior last_good").unwrap();

        // Weather points at a refused port and there are no feeds: NoInput.
        let generator = BreakGenerator::new(Arc::clone(&config), store.clone(), reqwest::Client::new());
        match generator.generate().await {
            GenerationOutcome::Failed(RadioError::NoInput) => {}
            other => panic!("expected NoInput failure, got {other:?}"),
        }

        assert_eq!(std::fs::read(config.paths.next_break()).unwrap(), b"prior next");
        assert_eq!(
            std::fs::read(config.paths.last_good_break()).unwrap(),
            b"prior last_good"
        );

        let counts = store
            .generation_run_counts_since(chrono::Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(counts, vec![("fail".to_string(), 1)]);
    }
}
