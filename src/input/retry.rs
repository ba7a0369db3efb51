//! Retry policy with exponential backoff

use crate::error::ExtractionError;
use log::{info, warn};
use std::future::Future;
use std::time::Duration;

/// Errors that know whether another attempt is worthwhile.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ExtractionError {
    fn is_retryable(&self) -> bool {
        ExtractionError::is_retryable(self)
    }
}

/// Longest pause between two attempts, whatever the policy says.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// How often and how patiently to retry an operation.
///
/// The delay after attempt `n` (0-based) is `base_delay * multiplier^n`,
/// capped at [`MAX_RETRY_DELAY`]; no delay follows the final attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            multiplier: 2.0,
        }
    }
}

/// Final result of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: multiplier.max(1.0),
        }
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error or
    /// the attempts are exhausted. The closure receives the 0-based attempt.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> RetryOutcome<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                    }
                }
                Err(err) => {
                    warn!(
                        "{}: attempt {}/{} failed: {}",
                        label,
                        attempt + 1,
                        max_attempts,
                        err
                    );

                    if attempt + 1 >= max_attempts || !err.is_retryable() {
                        return RetryOutcome {
                            result: Err(err),
                            attempts: attempt + 1,
                        };
                    }

                    let delay = self.delay_after(attempt);
                    info!("{}: retrying in {:?}", label, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
