// 🔁 Retry - exponential backoff around store fetches
//
// Only the I/O boundary retries. Validation, conflict and not-found
// errors are returned on the first attempt.

use crate::error::{DuesError, Result};
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, first one included (default: 3)
    pub max_attempts: u32,
    /// Delay before the second attempt (default: 50ms)
    pub initial_delay: Duration,
    /// Upper bound for any single delay (default: 2s)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Policy that never sleeps, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// delay = `initial_delay` * multiplier ^ attempt, capped at `max_delay`
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempts run out. Returns the last error in the latter case.
pub fn retry_with_backoff<T, F>(policy: &RetryPolicy, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(what, attempt = attempt + 1, "Fetch succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_retryable() && attempt + 1 < attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    what,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Fetch failed, retrying"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(error) => return Err(log_final(what, error)),
        }
    }
}

fn log_final(what: &str, error: DuesError) -> DuesError {
    if error.is_retryable() {
        tracing::error!(what, error = %error, "Fetch failed after all retries");
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn busy() -> DuesError {
        DuesError::Storage(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ))
    }

    #[test]
    fn test_retries_transient_failures() {
        let calls = Cell::new(0);
        let result = retry_with_backoff(&RetryPolicy::immediate(3), "members", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(busy())
            } else {
                Ok(7)
            }
        });

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<()> = retry_with_backoff(&RetryPolicy::immediate(2), "payments", || {
            calls.set(calls.get() + 1);
            Err(busy())
        });

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_validation_is_never_retried() {
        let calls = Cell::new(0);
        let result: Result<()> = retry_with_backoff(&RetryPolicy::immediate(5), "period", || {
            calls.set(calls.get() + 1);
            Err(DuesError::invalid("month", "out of range", "Period"))
        });

        assert!(result.unwrap_err().is_validation());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(2));
    }
}
