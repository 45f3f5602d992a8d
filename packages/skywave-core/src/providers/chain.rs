//! Generic "try providers in priority order" execution.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::{Named, ProviderOutcome};
use crate::constants::{PROVIDER_RETRY_DELAYS_MS, RATE_LIMIT_BUDGET};

/// Terminal failure of a whole provider chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Every provider in the chain returned a non-ok outcome.
    #[error("all providers failed for capability '{capability}'")]
    AllProvidersFailed { capability: String },
}

/// Executes providers in order until one returns a payload.
///
/// Per provider: transient outcomes retry in place with exponential
/// backoff; rate-limit waits are honored up to a fixed budget and then
/// treated as quota exhaustion; quota and permanent outcomes move straight
/// to the next provider. The first payload wins.
pub async fn run_chain<T, P, F, Fut>(
    capability: &str,
    providers: &[Arc<P>],
    mut invoke: F,
) -> Result<T, ChainError>
where
    P: Named + ?Sized,
    F: FnMut(Arc<P>) -> Fut,
    Fut: Future<Output = ProviderOutcome<T>>,
{
    for provider in providers {
        if let Some(payload) = try_provider(capability, provider, &mut invoke).await {
            return Ok(payload);
        }
    }

    log::warn!(
        "[Providers] {}: all {} provider(s) failed",
        capability,
        providers.len()
    );
    Err(ChainError::AllProvidersFailed {
        capability: capability.to_string(),
    })
}

/// Runs one provider with its in-provider retry policy.
///
/// Returns `Some(payload)` on success, `None` when the chain should move on.
async fn try_provider<T, P, F, Fut>(
    capability: &str,
    provider: &Arc<P>,
    invoke: &mut F,
) -> Option<T>
where
    P: Named + ?Sized,
    F: FnMut(Arc<P>) -> Fut,
    Fut: Future<Output = ProviderOutcome<T>>,
{
    let name = provider.name().to_string();
    let mut transient_retries = 0usize;
    let mut rate_limit_waited = Duration::ZERO;

    loop {
        match invoke(Arc::clone(provider)).await {
            ProviderOutcome::Ok(payload) => {
                log::info!("[Providers] {capability}: {name} ok");
                return Some(payload);
            }
            ProviderOutcome::QuotaExceeded(detail) => {
                log::warn!("[Providers] {capability}: {name} quota exceeded: {detail}");
                return None;
            }
            ProviderOutcome::Permanent(detail) => {
                log::warn!("[Providers] {capability}: {name} permanent failure: {detail}");
                return None;
            }
            ProviderOutcome::Transient(detail) => {
                let Some(&delay_ms) = PROVIDER_RETRY_DELAYS_MS.get(transient_retries) else {
                    log::warn!(
                        "[Providers] {capability}: {name} still failing after {} retries: {detail}",
                        PROVIDER_RETRY_DELAYS_MS.len()
                    );
                    return None;
                };
                transient_retries += 1;
                log::info!(
                    "[Providers] {capability}: {name} transient ({detail}); retry {transient_retries} in {delay_ms}ms"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            ProviderOutcome::RateLimited { retry_after, detail } => {
                let wait = retry_after.unwrap_or(Duration::from_secs(2));
                if rate_limit_waited + wait > RATE_LIMIT_BUDGET {
                    // The deadline exceeds our budget: same disposition as
                    // a spent quota window.
                    log::warn!(
                        "[Providers] {capability}: {name} rate-limit wait exceeds budget; \
                         treating as quota exceeded: {detail}"
                    );
                    return None;
                }
                rate_limit_waited += wait;
                log::info!(
                    "[Providers] {capability}: {name} rate limited; waiting {}ms",
                    wait.as_millis()
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}
