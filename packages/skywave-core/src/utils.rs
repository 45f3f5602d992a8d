//! General utilities shared across the application.

use std::io;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Timelike, Utc};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current UTC time as an RFC 3339 string with sub-second
/// precision and an explicit offset.
///
/// This is the canonical timestamp format everywhere in the system; the
/// store persists these strings without interpreting them.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Truncates a UTC instant to its hour bucket (`2025-06-01T14:00:00Z`).
#[must_use]
pub fn hour_bucket(at: DateTime<Utc>) -> String {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses an RFC 3339 timestamp back into a UTC instant.
pub fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

// ─────────────────────────────────────────────────────────────────────────────
// Atomic Publication
// ─────────────────────────────────────────────────────────────────────────────

/// Writes `contents` to `path` atomically.
///
/// The bytes land in a temp file in the same directory first, then a rename
/// makes them visible. Readers observe either the prior complete file or the
/// new complete file, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("path has no parent directory"))?;
    std::fs::create_dir_all(dir)?;

    let tmp = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact"),
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

/// Serializes `value` as pretty JSON and publishes it atomically.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let contents = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &contents)
}

// ─────────────────────────────────────────────────────────────────────────────
// Path Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the file-name stem of a path (`/a/b/next.mp3` -> `next`).
///
/// Breaks and bumpers are identified in play history by their stem rather
/// than a store row.
#[must_use]
pub fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}
