//! Recent-phrase log: negative context for the script model.
//!
//! A plain on-disk text file, one phrase per line, newest last. Reads take
//! a shared advisory lock, appends take an exclusive one; the lock is the
//! only global in the system. Contention waits are bounded — a stuck lock
//! degrades the negative context, never the break.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::constants::{PHRASE_LOCK_WAIT, PHRASE_LOG_CAP_BYTES};
use crate::utils::write_atomic;

/// Handle to the on-disk phrase log.
#[derive(Debug, Clone)]
pub struct PhraseLog {
    path: PathBuf,
}

impl PhraseLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the most recent `k` phrases, oldest first.
    ///
    /// A missing log is an empty one.
    pub fn recent(&self, k: usize) -> std::io::Result<Vec<String>> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        lock_bounded(&file, LockKind::Shared)?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let lines: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        let start = lines.len().saturating_sub(k);
        Ok(lines[start..].to_vec())
    }

    /// Appends phrases under an exclusive lock, rotating the file when it
    /// outgrows its size cap.
    pub fn append(&self, phrases: &[String]) -> std::io::Result<()> {
        if phrases.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        lock_bounded(&file, LockKind::Exclusive)?;

        for phrase in phrases {
            let line = phrase.replace('\n', " ");
            writeln!(file, "{}", line.trim())?;
        }
        file.flush()?;

        let len = file.metadata()?.len();
        if len > PHRASE_LOG_CAP_BYTES {
            self.rotate()?;
        }
        Ok(())
    }

    /// Halves the log, keeping the newest lines. Called with the exclusive
    /// lock already held.
    fn rotate(&self) -> std::io::Result<()> {
        let contents = std::fs::read_to_string(&self.path)?;
        let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
        let keep = &lines[lines.len() / 2..];

        let mut rotated = keep.join("\n");
        rotated.push('\n');
        write_atomic(&self.path, rotated.as_bytes())?;
        log::info!(
            "[Phrases] rotated log: kept {} of {} lines",
            keep.len(),
            lines.len()
        );
        Ok(())
    }
}

enum LockKind {
    Shared,
    Exclusive,
}

/// Acquires an advisory lock, polling for at most the configured bound.
fn lock_bounded(file: &File, kind: LockKind) -> std::io::Result<()> {
    let deadline = Instant::now() + PHRASE_LOCK_WAIT;
    loop {
        let attempt = match kind {
            LockKind::Shared => file.try_lock_shared(),
            LockKind::Exclusive => file.try_lock(),
        };
        match attempt {
            Ok(()) => return Ok(()),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(std::io::Error::new(
                        ErrorKind::TimedOut,
                        "phrase log lock contention exceeded bound",
                    ));
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(TryLockError::Error(e)) => return Err(e),
        }
    }
}
