//! Retry policy for identity API requests.

use std::time::Duration;

/// Default number of attempts per request.
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// Default pause between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Whether a status is worth another attempt: server-class errors only.
pub fn is_server_error(status: u16) -> bool {
    (500..600).contains(&status)
}

/// How often and how patiently to retry a request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Fixed pause before each retry
    pub delay: Duration,
    /// Statuses that trigger a retry
    pub retry_on: fn(u16) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
            retry_on: is_server_error,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            ..Self::default()
        }
    }

    /// Retry without pausing.
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }

    /// Send each request exactly once.
    pub fn none() -> Self {
        Self::immediate(1)
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    pub fn should_retry(&self, status: u16) -> bool {
        (self.retry_on)(status)
    }
}

/// Blocks the calling thread between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real sleeping via `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 10);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[test]
    fn test_retries_only_server_errors() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(500));
        assert!(policy.should_retry(503));
        assert!(!policy.should_retry(200));
        assert!(!policy.should_retry(404));
        assert!(!policy.should_retry(401));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }

    #[test]
    fn test_custom_predicate() {
        let policy = RetryPolicy {
            retry_on: |status| status == 429 || is_server_error(status),
            ..RetryPolicy::immediate(3)
        };
        assert!(policy.should_retry(429));
        assert!(policy.should_retry(502));
        assert!(!policy.should_retry(404));
    }
}
