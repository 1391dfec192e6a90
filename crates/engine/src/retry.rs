//! Retry with exponential backoff
//!
//! Storage operations that fail with a transient error are retried by the
//! coordinator on the worker thread. The atomic store itself never retries.

use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound on any delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after failed attempt `attempt` (0-indexed), doubling each time
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// runs out of attempts, or `keep_going` returns false between attempts
    ///
    /// Returns the result together with the number of attempts made.
    pub fn run<T, E, F, R, K>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: R,
        keep_going: K,
    ) -> (Result<T, E>, u32)
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        K: Fn() -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(target: "savestate::pipeline", op = label, attempt, "Retry succeeded");
                    }
                    return (Ok(value), attempt);
                }
                Err(e) if attempt < max_attempts && is_retryable(&e) && keep_going() => {
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        target: "savestate::pipeline",
                        op = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, will retry"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}
