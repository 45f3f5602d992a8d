//! Transport for the engine control socket.
//!
//! Every operation acquires a fresh socket connection; there is no
//! persistent client session. A refused connect is retried with exponential
//! backoff bounded at roughly two seconds of total wait, then surfaced as
//! `Unavailable`.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use super::protocol;
use super::EngineQueue;
use crate::constants::{ENGINE_CONNECT_DELAYS_MS, ENGINE_END_SENTINEL, ENGINE_OP_TIMEOUT};

/// Errors from engine socket operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine is not accepting connections (restart in progress,
    /// crashed, or socket path wrong). Retried at the next tick.
    #[error("engine unavailable at {0}")]
    Unavailable(String),

    /// Socket I/O failed mid-operation.
    #[error("engine socket i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The operation deadline expired.
    #[error("engine operation timed out")]
    Timeout,

    /// The engine's response did not match the protocol.
    #[error("engine protocol: {0}")]
    Protocol(String),
}

/// Convenient Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Client for the audio engine's line-protocol control socket.
#[derive(Debug, Clone)]
pub struct EngineClient {
    socket_path: PathBuf,
    /// Name of the primary on-air source (for `<source>.metadata`).
    mount: String,
}

impl EngineClient {
    pub fn new(socket_path: PathBuf, mount: String) -> Self {
        Self { socket_path, mount }
    }

    /// Returns the number of requests waiting in `queue`.
    pub async fn queue_length(&self, queue: EngineQueue) -> EngineResult<usize> {
        Ok(self.queue_list(queue).await?.len())
    }

    /// Lists the request ids waiting in `queue`, in play order.
    pub async fn queue_list(&self, queue: EngineQueue) -> EngineResult<Vec<String>> {
        let lines = self.command(&format!("{}.queue", queue.as_str())).await?;
        Ok(protocol::parse_rids(&lines))
    }

    /// Reads the metadata bag for a queued request.
    pub async fn request_metadata(&self, rid: &str) -> EngineResult<HashMap<String, String>> {
        let lines = self.command(&format!("request.metadata {rid}")).await?;
        Ok(protocol::parse_metadata(&lines))
    }

    /// Pushes a file into `queue`, returning the engine's request id.
    pub async fn push(&self, queue: EngineQueue, path: &str) -> EngineResult<String> {
        let lines = self
            .command(&format!("{}.push {path}", queue.as_str()))
            .await?;
        lines
            .first()
            .map(|line| line.trim().to_string())
            .filter(|rid| !rid.is_empty())
            .ok_or_else(|| EngineError::Protocol(format!("push returned no request id: {lines:?}")))
    }

    /// Skips the currently playing request of `queue`.
    pub async fn skip(&self, queue: EngineQueue) -> EngineResult<()> {
        self.command(&format!("{}.skip", queue.as_str())).await?;
        Ok(())
    }

    /// Drops every waiting request in `queue`.
    pub async fn clear(&self, queue: EngineQueue) -> EngineResult<()> {
        self.command(&format!("{}.clear", queue.as_str())).await?;
        Ok(())
    }

    /// Reads the primary mount's current metadata (filename, rid, tags).
    pub async fn current_metadata(&self) -> EngineResult<HashMap<String, String>> {
        let lines = self.command(&format!("{}.metadata", self.mount)).await?;
        Ok(protocol::parse_metadata(&lines))
    }

    /// Runs one command round-trip on a fresh connection.
    async fn command(&self, cmd: &str) -> EngineResult<Vec<String>> {
        let mut stream = self.connect_with_backoff().await?;

        let io = async {
            stream.write_all(cmd.as_bytes()).await?;
            stream.write_all(b"\n").await?;
            read_until_end(&mut stream).await
        };

        match tokio::time::timeout(ENGINE_OP_TIMEOUT, io).await {
            Ok(Ok(raw)) => Ok(protocol::payload_lines(&raw)),
            Ok(Err(e)) => Err(EngineError::Io(e)),
            Err(_) => Err(EngineError::Timeout),
        }
    }

    /// Connects to the engine socket, retrying refused connects with
    /// exponential backoff.
    async fn connect_with_backoff(&self) -> EngineResult<UnixStream> {
        let mut last_refused = None;
        for (attempt, &delay_ms) in std::iter::once(&0)
            .chain(ENGINE_CONNECT_DELAYS_MS.iter())
            .enumerate()
        {
            if attempt > 0 {
                log::debug!(
                    "[Engine] Reconnecting to {} (attempt {}/{}) after {}ms",
                    self.socket_path.display(),
                    attempt + 1,
                    ENGINE_CONNECT_DELAYS_MS.len() + 1,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => return Ok(stream),
                Err(e) if matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::NotFound) => {
                    last_refused = Some(e);
                }
                Err(e) => return Err(EngineError::Io(e)),
            }
        }

        log::warn!(
            "[Engine] Gave up connecting to {}: {}",
            self.socket_path.display(),
            last_refused
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        );
        Err(EngineError::Unavailable(
            self.socket_path.display().to_string(),
        ))
    }
}

/// Reads from the socket until the `END` sentinel line (or EOF).
async fn read_until_end(stream: &mut UnixStream) -> std::io::Result<String> {
    let mut raw = String::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(raw);
        }
        raw.push_str(&String::from_utf8_lossy(&buf[..n]));
        // The sentinel is always on its own line.
        if raw
            .lines()
            .any(|line| line.trim_end() == ENGINE_END_SENTINEL)
        {
            return Ok(raw);
        }
    }
}
