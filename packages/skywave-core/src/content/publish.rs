//! Atomic publication of break artifacts.
//!
//! The externally observable names are `next.mp3` and `last_good.mp3`.
//! Both only ever change via rename, so the scheduler can open either at
//! any moment and never see a partial file.

use std::path::{Path, PathBuf};

use crate::error::RadioError;

/// Sanity check: the file starts like an MP3 (ID3 tag or frame sync).
///
/// Not a decode; just enough to refuse publishing an error page or an
/// empty file as a break.
pub fn looks_like_mp3(path: &Path) -> bool {
    let Ok(bytes) = std::fs::read(path) else {
        return false;
    };
    if bytes.len() < 128 {
        return false;
    }
    bytes.starts_with(b"ID3") || (bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0)
}

/// Publishes a finished break.
///
/// The prior `next` (if any) rotates to `last_good` first, then the new
/// file renames over `next`. Both renames are same-filesystem and atomic;
/// a crash between them leaves a usable `last_good` and no `next`, which
/// the scheduler already handles.
pub fn publish_break(
    finished: &Path,
    next: &Path,
    last_good: &Path,
) -> Result<PathBuf, RadioError> {
    if !looks_like_mp3(finished) {
        return Err(RadioError::MixFailed(format!(
            "output failed audio header check: {}",
            finished.display()
        )));
    }

    if next.exists() {
        std::fs::rename(next, last_good).map_err(|e| {
            RadioError::MixFailed(format!("rotating next to last_good: {e}"))
        })?;
    }

    std::fs::rename(finished, next)
        .map_err(|e| RadioError::MixFailed(format!("publishing next: {e}")))?;
    Ok(next.to_path_buf())
}
