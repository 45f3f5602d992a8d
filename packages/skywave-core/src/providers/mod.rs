//! Multi-provider backends for generated content.
//!
//! A capability (script text, speech audio) is backed by an ordered list of
//! third-party providers. Each provider call returns a classified
//! [`ProviderOutcome`] rather than an error: the chain decides whether to
//! retry in place, move on, or give up, and callers only ever see either a
//! payload or [`ChainError::AllProvidersFailed`].
//!
//! Priority order is fixed per call and never mutated at runtime based on
//! past failures: quota windows reset, and a provider that failed ten
//! minutes ago may succeed now.

mod chain;
mod script;
mod tts;

pub use chain::{run_chain, ChainError};
pub use script::HttpScriptProvider;
pub use tts::HttpTtsProvider;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

/// Classified result of one provider invocation.
#[derive(Debug)]
pub enum ProviderOutcome<T> {
    /// The provider returned a usable payload.
    Ok(T),
    /// The provider's quota window is exhausted; do not retry this one.
    QuotaExceeded(String),
    /// The provider asked us to slow down.
    RateLimited {
        retry_after: Option<Duration>,
        detail: String,
    },
    /// Network trouble or a 5xx; worth an in-provider retry.
    Transient(String),
    /// Bad request or auth failure; retrying cannot help.
    Permanent(String),
}

/// Anything with a stable display name for chain logging.
pub trait Named {
    fn name(&self) -> &str;
}

/// The prompt handed to a script provider.
#[derive(Debug, Clone)]
pub struct PromptBundle {
    pub system: String,
    pub user: String,
}

/// Capability: turn a prompt into announcer copy.
#[async_trait]
pub trait ScriptProvider: Named + Send + Sync {
    async fn generate(&self, prompt: &PromptBundle) -> ProviderOutcome<String>;
}

/// Capability: turn announcer copy into voice audio.
#[async_trait]
pub trait TtsProvider: Named + Send + Sync {
    /// `director` is a configuration-driven delivery prefix (persona,
    /// scene, style); how it is transported is provider-specific.
    async fn synthesize(&self, script: &str, director: &str) -> ProviderOutcome<Bytes>;
}

/// Classifies a non-success HTTP status into a provider outcome.
pub(crate) fn classify_status<T>(
    status: StatusCode,
    retry_after: Option<Duration>,
    detail: String,
) -> ProviderOutcome<T> {
    match status {
        StatusCode::TOO_MANY_REQUESTS => match retry_after {
            Some(after) => ProviderOutcome::RateLimited {
                retry_after: Some(after),
                detail,
            },
            // A 429 with no guidance usually means the window is gone,
            // not that a short wait will help.
            None => ProviderOutcome::QuotaExceeded(detail),
        },
        StatusCode::PAYMENT_REQUIRED => ProviderOutcome::QuotaExceeded(detail),
        s if s.is_server_error() => ProviderOutcome::Transient(detail),
        _ => ProviderOutcome::Permanent(detail),
    }
}

/// Reads a `Retry-After` header as a delay, when present and numeric.
pub(crate) fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_with_retry_after_is_rate_limited() {
        let outcome: ProviderOutcome<()> = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(3)),
            "slow down".into(),
        );
        assert!(matches!(
            outcome,
            ProviderOutcome::RateLimited {
                retry_after: Some(d),
                ..
            } if d == Duration::from_secs(3)
        ));
    }

    #[test]
    fn status_429_without_retry_after_is_quota() {
        let outcome: ProviderOutcome<()> =
            classify_status(StatusCode::TOO_MANY_REQUESTS, None, "gone".into());
        assert!(matches!(outcome, ProviderOutcome::QuotaExceeded(_)));
    }

    #[test]
    fn server_errors_are_transient_and_client_errors_permanent() {
        let transient: ProviderOutcome<()> =
            classify_status(StatusCode::BAD_GATEWAY, None, "502".into());
        assert!(matches!(transient, ProviderOutcome::Transient(_)));

        let permanent: ProviderOutcome<()> =
            classify_status(StatusCode::UNAUTHORIZED, None, "401".into());
        assert!(matches!(permanent, ProviderOutcome::Permanent(_)));
    }
}
