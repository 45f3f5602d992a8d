//! External mix invocation: voice over a ducked bed, normalized for air.
//!
//! The mix itself (sidechain ducking, fades, loudness normalization) is an
//! external command line's job; this module only constructs arguments,
//! runs the process at lowered priority, and interprets the exit code.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::ContentConfig;
use crate::constants::{BREAK_LUFS_TARGET, BREAK_SAMPLE_RATE, BREAK_TRUE_PEAK_DB};
use crate::error::RadioError;

/// Nice value for mix subprocesses. Audio-engine throughput must never be
/// starved by an encode.
const MIX_NICE: i32 = 10;

/// One mix job: voice plus bed into a finished break file.
#[derive(Debug)]
pub struct MixSpec<'a> {
    pub voice: &'a Path,
    pub bed: &'a Path,
    pub output: &'a Path,
}

/// Runs the external mixer.
#[derive(Debug, Clone)]
pub struct Mixer {
    program: String,
    bed_preroll_sec: f64,
    fade_in_sec: f64,
    fade_out_sec: f64,
}

impl Mixer {
    pub fn from_config(config: &ContentConfig) -> Self {
        Self {
            program: config.mixer_program.clone(),
            bed_preroll_sec: config.bed_preroll_sec,
            fade_in_sec: config.fade_in_sec,
            fade_out_sec: config.fade_out_sec,
        }
    }

    /// Builds the mixer argument list for a job.
    ///
    /// Filter graph: the bed fades in, ducks under the voice via sidechain
    /// compression, and fades out; the voice enters after the bed preroll;
    /// the sum is normalized to the break loudness target.
    fn build_args(&self, spec: &MixSpec<'_>) -> Vec<String> {
        let delay_ms = (self.bed_preroll_sec * 1000.0).round() as u64;
        let filter = format!(
            "[0:a]adelay={delay_ms}|{delay_ms},aformat=sample_rates={rate}[voice];\
             [1:a]afade=t=in:d={fade_in},aformat=sample_rates={rate}[bedin];\
             [bedin][voice]sidechaincompress=threshold=0.03:ratio=12:attack=80:release=600[ducked];\
             [ducked]afade=t=out:d={fade_out}[bedout];\
             [bedout][voice]amix=inputs=2:duration=longest:normalize=0,\
             loudnorm=I={lufs}:TP={tp}:LRA=9[mix]",
            rate = BREAK_SAMPLE_RATE,
            fade_in = self.fade_in_sec,
            fade_out = self.fade_out_sec,
            lufs = BREAK_LUFS_TARGET,
            tp = BREAK_TRUE_PEAK_DB,
        );

        vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            spec.voice.display().to_string(),
            "-i".into(),
            spec.bed.display().to_string(),
            "-filter_complex".into(),
            filter,
            "-map".into(),
            "[mix]".into(),
            "-ar".into(),
            BREAK_SAMPLE_RATE.to_string(),
            "-ac".into(),
            "2".into(),
            "-codec:a".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            "192k".into(),
            spec.output.display().to_string(),
        ]
    }

    /// Runs the mix, failing on any non-zero exit.
    pub async fn run(&self, spec: &MixSpec<'_>) -> Result<(), RadioError> {
        let args = self.build_args(spec);
        log::info!(
            "[Mixer] {} voice={} bed={}",
            self.program,
            spec.voice.display(),
            spec.bed.display()
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RadioError::MixFailed(format!("spawn {}: {e}", self.program)))?;

        lower_priority(child.id());

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RadioError::MixFailed(format!("wait: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join(" | ");
            Err(RadioError::MixFailed(format!(
                "{} exited {}: {tail}",
                self.program, output.status
            )))
        }
    }
}

/// Picks a random bed file from a directory (fallback when the store holds
/// no bed assets).
pub fn random_bed_file(beds_dir: &Path) -> Option<PathBuf> {
    use rand::seq::IndexedRandom;

    let beds: Vec<PathBuf> = std::fs::read_dir(beds_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()).is_some_and(|e| {
            matches!(e.to_ascii_lowercase().as_str(), "mp3" | "flac" | "wav" | "ogg")
        }))
        .collect();
    beds.choose(&mut rand::rng()).cloned()
}

/// Drops the subprocess's scheduling priority.
#[cfg(unix)]
fn lower_priority(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    // SAFETY: setpriority is a standard libc call; the pid is our child.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid, MIX_NICE) };
    if result == 0 {
        log::debug!("[Mixer] child {pid} priority set to nice {MIX_NICE}");
    } else {
        log::warn!(
            "[Mixer] failed to renice child {pid}: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn lower_priority(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer() -> Mixer {
        Mixer {
            program: "ffmpeg".into(),
            bed_preroll_sec: 2.0,
            fade_in_sec: 1.5,
            fade_out_sec: 1.5,
        }
    }

    #[test]
    fn args_carry_inputs_filter_and_output() {
        let spec = MixSpec {
            voice: Path::new("/tmp/voice.mp3"),
            bed: Path::new("/radio/assets/beds/midnight.mp3"),
            output: Path::new("/tmp/out.mp3"),
        };
        let args = mixer().build_args(&spec);

        let voice_pos = args.iter().position(|a| a == "/tmp/voice.mp3").unwrap();
        let bed_pos = args
            .iter()
            .position(|a| a == "/radio/assets/beds/midnight.mp3")
            .unwrap();
        assert!(voice_pos < bed_pos, "voice must be input 0");

        let filter = args
            .iter()
            .find(|a| a.contains("sidechaincompress"))
            .expect("filter graph present");
        assert!(filter.contains("adelay=2000|2000"));
        assert!(filter.contains("loudnorm=I=-18:TP=-1"));

        assert_eq!(args.last().unwrap(), "/tmp/out.mp3");
        assert!(args.windows(2).any(|w| w[0] == "-ar" && w[1] == "44100"));
        assert!(args.windows(2).any(|w| w[0] == "-b:a" && w[1] == "192k"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_mix_failed() {
        // `false` ignores its arguments and exits 1.
        let mixer = Mixer {
            program: "false".into(),
            bed_preroll_sec: 2.0,
            fade_in_sec: 1.0,
            fade_out_sec: 1.0,
        };
        let dir = tempfile::tempdir().unwrap();
        let voice = dir.path().join("v.mp3");
        let bed = dir.path().join("b.mp3");
        std::fs::write(&voice, b"v").unwrap();
        std::fs::write(&bed, b"b").unwrap();

        let spec = MixSpec {
            voice: &voice,
            bed: &bed,
            output: &dir.path().join("out.mp3"),
        };
        let err = mixer.run(&spec).await.unwrap_err();
        assert!(matches!(err, RadioError::MixFailed(_)));
    }

    #[tokio::test]
    async fn missing_program_is_mix_failed() {
        let mixer = Mixer {
            program: "definitely-not-a-real-mixer".into(),
            bed_preroll_sec: 2.0,
            fade_in_sec: 1.0,
            fade_out_sec: 1.0,
        };
        let dir = tempfile::tempdir().unwrap();
        let spec = MixSpec {
            voice: &dir.path().join("v.mp3"),
            bed: &dir.path().join("b.mp3"),
            output: &dir.path().join("out.mp3"),
        };
        assert!(matches!(
            mixer.run(&spec).await,
            Err(RadioError::MixFailed(_))
        ));
    }

    #[test]
    fn random_bed_skips_non_audio_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not audio").unwrap();
        assert!(random_bed_file(dir.path()).is_none());

        std::fs::write(dir.path().join("midnight.mp3"), b"audio").unwrap();
        let picked = random_bed_file(dir.path()).unwrap();
        assert!(picked.ends_with("midnight.mp3"));
    }
}
