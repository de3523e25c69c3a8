//! Bounded retry for writes that lose a race.
//!
//! Only `MessagingError::ConflictOrRace` is retried. Every other error is
//! returned on the first attempt. A retried write runs from scratch: the
//! failed attempt's transaction has already been rolled back.

use std::future::Future;
use std::time::Duration;

use parley_types::config::MessagingConfig;
use parley_types::error::MessagingError;
use tracing::warn;

/// How many times, and how patiently, to retry a conflicting write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. 1 disables retrying.
    pub max_attempts: u32,
    /// Linear backoff step: attempt `n` waits `n * backoff`.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &MessagingConfig) -> Self {
        Self {
            max_attempts: config.conflict_retry_attempts.max(1),
            backoff: Duration::from_millis(config.conflict_retry_backoff_ms),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(&self, attempt: u32, error: &MessagingError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&MessagingConfig::default())
    }
}

/// Run `op`, retrying on write conflicts according to `policy`.
pub async fn retry_on_conflict<T, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, MessagingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MessagingError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if policy.should_retry(attempt, &e) => {
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Write conflict, retrying"
                );
                tokio::time::sleep(policy.delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
