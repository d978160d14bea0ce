//! Bounded exponential backoff for transient failures.
//!
//! Only errors for which [`Error::is_retryable`] holds are retried. Auth and
//! content failures are returned on the first attempt.

use crate::error::Error;
use std::time::Duration;
use tracing::warn;

/// Retry settings for the extraction stage and for send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Returns `true` if `error`, raised on attempt number `attempt` (1-based), should be retried.
    #[must_use]
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }

    /// Delay after the failed attempt number `attempt` (1-based). Doubles each time.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Logs the failure and sleeps for the backoff of `attempt`.
    pub(crate) async fn pause(&self, operation: &str, attempt: u32, error: &Error) {
        let delay = self.backoff(attempt);
        warn!(
            operation,
            attempt,
            max_attempts = self.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> Error {
        Error::TcpConnect {
            target: "imap.gmail.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn test_should_retry_bounds() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&transient(), 1));
        assert!(policy.should_retry(&transient(), 2));
        assert!(!policy.should_retry(&transient(), 3));
        assert!(!RetryPolicy::none().should_retry(&transient(), 1));
    }

    #[test]
    fn test_permanent_errors_not_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(&Error::MissingRefreshToken, 1));
        let err = Error::NoMatchingMessages {
            sender_label: "Citi".into(),
        };
        assert!(!policy.should_retry(&err, 1));
    }
}
