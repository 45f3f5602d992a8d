//! Structured job log: one JSON line per task run.
//!
//! Append-only; downstream tooling tails it. This is deliberately not the
//! log facade — the job log is a machine-read artifact with a fixed shape.

use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One task-run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// UTC RFC 3339 completion time.
    pub ts: String,
    pub task: String,
    /// "ok" | "fail" | "skipped"
    pub status: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

/// Appends job records to `logs/jobs.jsonl`.
#[derive(Debug, Clone)]
pub struct JobLogger {
    path: PathBuf,
}

impl JobLogger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Appends one record. Logging must never take a task down, so errors
    /// are reported on the log facade and swallowed.
    pub fn append(&self, record: &JobRecord) {
        if let Err(e) = self.try_append(record) {
            log::warn!("[JobLog] append failed: {e}");
        }
    }

    fn try_append(&self, record: &JobRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = JobLogger::new(dir.path().join("logs/jobs.jsonl"));

        logger.append(&JobRecord {
            ts: "2025-06-01T14:00:00Z".into(),
            task: "break_schedule".into(),
            status: "ok".into(),
            duration_ms: 120,
            error: None,
            output_path: Some("/radio/assets/breaks/next.mp3".into()),
        });
        logger.append(&JobRecord {
            ts: "2025-06-01T14:05:00Z".into(),
            task: "break_schedule".into(),
            status: "skipped".into(),
            duration_ms: 3,
            error: None,
            output_path: None,
        });

        let contents = std::fs::read_to_string(dir.path().join("logs/jobs.jsonl")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: JobRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.status, "ok");
        assert_eq!(first.duration_ms, 120);

        // Optional fields are omitted, not null.
        assert!(!lines[1].contains("error"));
        assert!(!lines[1].contains("output_path"));
    }
}
