//! Rate-limit aware retry for remote rewrite calls.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::RemoteError;

/// Retry budget for a single remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_retries: u32,
    /// Wait before the second attempt; doubles on every further attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff before the attempt following `attempt` (1-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Run `call` until it succeeds, retrying only rate-limited failures.
///
/// Attempts are 1-indexed. After a rate-limited failure on attempt `n` where
/// `n < max_retries`, waits `base_delay * 2^(n-1)` and tries again. Any other
/// failure, or a rate-limited failure on the last attempt, is returned as is.
pub async fn invoke<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut call: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let max_attempts = policy.max_retries.max(1);
    let mut attempt = 1;

    loop {
        let started = Instant::now();
        let result = call().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                tracing::debug!(label, attempt, elapsed_ms, "Remote call succeeded");
                return Ok(value);
            }
            Err(err) if err.is_rate_limited() && attempt < max_attempts => {
                let wait = policy.backoff(attempt);
                tracing::warn!(
                    label,
                    attempt,
                    elapsed_ms,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(
                    label,
                    attempt,
                    elapsed_ms,
                    rate_limited = err.is_rate_limited(),
                    status = ?err.status(),
                    error = %err,
                    "Remote call failed"
                );
                return Err(err);
            }
        }
    }
}
