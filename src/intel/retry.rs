// src/intel/retry.rs
use std::future::Future;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::intel::error::{FetchError, FetchFailure};

/// Exponential backoff budget for one (source, topic) fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `base << retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Run `op` until it succeeds, fails permanently or the attempt budget runs out.
/// `op` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, FetchFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = match &error {
                    FetchError::RateLimited {
                        retry_after: Some(ra),
                    } => (*ra).min(policy.max_delay()),
                    _ => policy.delay_for(attempt - 1),
                };
                tracing::warn!(
                    target: "intel",
                    source = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient fetch failure, backing off"
                );
                counter!("intel_fetch_retries_total").increment(1);
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(FetchFailure {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}
