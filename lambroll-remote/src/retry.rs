//! Retrying remote calls that failed for transient reasons.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use lambroll_core::error::{is_transient, Error};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 30,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt`
    /// (counting from 0): doubling from `min_delay`, capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.min_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the attempts run
/// out. Cancelling `cancel` interrupts both the call and the wait between
/// calls.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Interrupted.into()),
            result = operation() => result,
        };
        match result {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay(attempt);
                attempt += 1;
                tracing::warn!(
                    operation = %name,
                    attempt = attempt,
                    delay = ?delay,
                    "retrying: {:#}",
                    err
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Interrupted.into()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}
