//! Bounded retry with exponential backoff for storage network calls
//!
//! Attempt `n` (1-based) that fails is followed by a wait of
//! `base_delay * 2^(n-1)` unless it was the last allowed attempt, in which
//! case its error is returned immediately. Each call owns its own counter;
//! nothing is shared between concurrent retries.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

/// Per-call retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

    /// `max_attempts` counts the first call; 0 is treated as 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn from_config(cfg: &cairn_core::config::RetryConfig) -> Self {
        Self::new(cfg.max_attempts, Duration::from_millis(cfg.base_delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Wait before retry number `retry_index` (0 for the first retry).
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BASE_DELAY)
    }
}

/// Run `op` under `policy`, waiting with `tokio::time::sleep` between tries.
///
/// Dropping the returned future during a backoff wait cancels the wait and
/// no further attempt is made.
pub async fn run_with_retry<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    run_with_retry_with(policy, tokio::time::sleep, op).await
}

/// [`run_with_retry`] with a caller-supplied wait.
///
/// Returns the first success, or exactly the error of the last attempt.
pub async fn run_with_retry_with<T, E, F, Fut, S, SFut>(
    policy: &RetryPolicy,
    mut sleep: S,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, max_attempts, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                if max_attempts > 1 {
                    error!(attempt, max_attempts, error = %e, "operation failed, retries exhausted");
                }
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = saturating_millis(delay),
                    error = %e,
                    "operation failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
