use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

use crate::error::ScrapeError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// `retry_count` extra attempts after the first one; zero means a single call.
    pub fn new(retry_count: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: retry_count.saturating_add(1),
            initial_delay,
            multiplier,
        }
    }

    /// Wait before the retry that follows failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        self.initial_delay.mul_f64(factor)
    }
}

/// Runs `op` until it succeeds, fails with an error `retryable` rejects, or runs out of
/// attempts.
pub async fn retry_with_backoff<T, R, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    retryable: R,
    mut op: F,
) -> Result<T, ScrapeError>
where
    R: Fn(&ScrapeError) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if retryable(&err) && attempt + 1 < policy.max_attempts => {
                let wait = policy.delay_for(attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    %err,
                    "retrying after failure"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

const JITTER: f64 = 0.1;

/// Sleeps `base` give or take 10%.
pub async fn sleep_with_jitter(base: Duration) {
    if base.is_zero() {
        return;
    }
    tokio::time::sleep(jittered(base)).await;
}

fn jittered(base: Duration) -> Duration {
    let jitter = rand::rng().random_range(-JITTER..=JITTER);
    base.mul_f64(1.0 + jitter)
}
