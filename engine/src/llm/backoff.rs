//! Exponential backoff for rate-limited oracle calls
//!
//! Only [`LLMError::RateLimitExceeded`] is retried here. Every other error is
//! returned to the caller on the first occurrence, because the search loop
//! treats those as a reason to abandon the current generation.

use super::{JsonObject, LLMError, Oracle, OracleRequest, Result};
use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Retry schedule for rate-limited calls
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: 10,
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_retries: config.max_retries,
        }
    }

    /// Upper bound of the delay before retry number `attempt` (0-based)
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Delay with jitter in `[ceiling / 2, ceiling]`
    fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
        Duration::from_millis(millis)
    }
}

/// Call the oracle, sleeping and retrying while it reports rate limiting
///
/// After `max_retries` retries the last `RateLimitExceeded` is returned.
pub async fn complete_with_backoff(
    oracle: &dyn Oracle,
    request: &OracleRequest,
    policy: &BackoffPolicy,
) -> Result<JsonObject> {
    let mut attempt = 0u32;
    loop {
        match oracle.complete_json(request).await {
            Err(LLMError::RateLimitExceeded) if attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    oracle = oracle.name(),
                    model = %request.model,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Oracle rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
