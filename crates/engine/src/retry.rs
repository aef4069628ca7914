//! Retry on transient failure
//!
//! Wraps any fallible operation and re-runs it while the backend classifies
//! the error as transient (deadlock victim, lock timeout). Every other error
//! is returned unchanged on the first occurrence.
//!
//! The delay between attempts follows an exponential backoff bounded by
//! `max_delay`. The default configuration retries immediately, which suits
//! contention that resolves as soon as the competing transaction finishes.

use std::time::Duration;

use dataaccess_core::{DataError, DataResult};
use tracing::{debug, warn};

/// Default number of attempts, including the first one
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Configuration for retry behavior
///
/// # Example
/// ```
/// use std::time::Duration;
/// use dataaccess_engine::RetryConfig;
///
/// let config = RetryConfig::new()
///     .with_max_attempts(4)
///     .with_base_delay(Duration::from_millis(5))
///     .with_max_delay(Duration::from_millis(40));
/// assert_eq!(config.delay_for(1), Duration::from_millis(5));
/// assert_eq!(config.delay_for(3), Duration::from_millis(20));
/// assert_eq!(config.delay_for(9), Duration::from_millis(40));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one (0 behaves like 1)
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

impl RetryConfig {
    /// Create a new RetryConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the operation exactly once
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Set the total number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base delay for exponential backoff
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the maximum delay between attempts
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Cap the shift to prevent overflow
        let shift = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay.max(self.base_delay))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `operation`, retrying while `is_transient` accepts its error
///
/// # Returns
/// * `Ok(T)` - as soon as one attempt succeeds
/// * `Err(e)` - the original error of the first non-transient failure
/// * `Err(DataError::RetryExhausted)` - every attempt failed transiently;
///   the last error is kept as the source
pub fn retry_on_transient_failure<T, F, P>(
    config: &RetryConfig,
    operation: &str,
    is_transient: P,
    mut op: F,
) -> DataResult<T>
where
    F: FnMut() -> DataResult<T>,
    P: Fn(&DataError) -> bool,
{
    let max_attempts = config.attempts();
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        target: "dataaccess::retry",
                        operation,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) if !is_transient(&e) => return Err(e),
            Err(e) if attempt >= max_attempts => {
                warn!(
                    target: "dataaccess::retry",
                    operation,
                    attempts = attempt,
                    error = %e,
                    "Giving up after transient failures"
                );
                return Err(DataError::RetryExhausted {
                    attempts: attempt,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                let delay = config.delay_for(attempt);
                warn!(
                    target: "dataaccess::retry",
                    operation,
                    attempt,
                    max_attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}
