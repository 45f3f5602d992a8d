//! Centralized error types for the Skywave core library.
//!
//! Component-local errors (store, engine, provider chain) live next to their
//! modules; this module defines the crate-wide taxonomy they collapse into,
//! maps kinds to machine-readable codes, and implements `IntoResponse` for
//! the API layer.
//!
//! The taxonomy is deliberately about *kinds*, not call sites: every failure
//! in the system degrades locally, and the kind decides the disposition
//! (retry next tick, absorb, keep prior artifacts, refuse to start).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineError;
use crate::providers::ChainError;
use crate::store::StoreError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for logs and API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the Skywave control plane.
#[derive(Debug, Error)]
pub enum RadioError {
    /// Transient I/O: engine socket refused, feed timeout, store busy.
    /// Retried locally or at the next tick.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A provider's quota window is exhausted. Absorbed by the chain,
    /// never surfaced to listeners.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A provider asked us to slow down and the backoff budget ran out.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Malformed metadata or a bad path. Fatal for the request only.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A scheduling guard was already held. Expected, not an error:
    /// the calling task exits `skipped`.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Every external data source failed; generation aborts without
    /// touching prior artifacts.
    #[error("no usable input for content generation")]
    NoInput,

    /// The external mix command exited non-zero.
    #[error("mix command failed: {0}")]
    MixFailed(String),

    /// Unrecoverable setup problem (store unwritable, socket directory
    /// missing, incomplete configuration). The supervisor refuses to start
    /// the affected task; other tasks continue.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl RadioError {
    /// Returns a machine-readable code for this error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::RateLimited(_) => "rate_limited",
            Self::InvalidInput(_) => "invalid_input",
            Self::StateConflict(_) => "state_conflict",
            Self::NoInput => "no_input",
            Self::MixFailed(_) => "mix_failed",
            Self::Fatal(_) => "fatal",
        }
    }

    /// Maps the error to an HTTP status for the API layer.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::StateConflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) | Self::RateLimited(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ErrorCode for RadioError {
    fn code(&self) -> &'static str {
        RadioError::code(self)
    }
}

/// Convenient Result alias for application-wide operations.
pub type RadioResult<T> = Result<T, RadioError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for RadioError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for RadioError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(id) => Self::StateConflict(format!("asset already known: {id}")),
            StoreError::Invalid(msg) => Self::InvalidInput(msg),
            StoreError::Db(e) => Self::Unavailable(format!("store: {e}")),
        }
    }
}

impl From<EngineError> for RadioError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Protocol(msg) => Self::InvalidInput(format!("engine protocol: {msg}")),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<ChainError> for RadioError {
    fn from(err: ChainError) -> Self {
        Self::QuotaExceeded(err.to_string())
    }
}

impl From<std::io::Error> for RadioError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(format!("io: {err}"))
    }
}
