use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::time::sleep;

use crate::errors::CustomError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Exponential backoff for upstream calls that hit rate limits.
///
/// Only `CustomError::RateLimited` is retried. Every other failure is
/// returned straight away, and the last rate-limit failure is returned
/// unchanged once `max_attempts` tries have been used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY_MS)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delay after the failed `attempt` (counted from 1): `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    pub async fn run<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, CustomError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CustomError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "[{}] rate limited on attempt {}/{}, retrying in {}ms",
                        operation_name,
                        attempt,
                        self.max_attempts,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
