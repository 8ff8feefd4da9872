//! Exponential backoff for transient daemon failures.

use std::time::Duration;

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Cap on the delay between attempts.
    pub max_backoff: Duration,
    /// Growth factor applied on each retry.
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

/// Stateless retry policy. Computes the next delay given the attempt number.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(RetryConfig {
            max_retries: 0,
            ..Default::default()
        })
    }

    /// Delay before the `attempt`-th retry (1-based), or `None` once the
    /// retry budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let factor = self.config.multiplier.max(1).saturating_pow(attempt - 1);
        let delay = self.config.initial_backoff.saturating_mul(factor);
        Some(delay.min(self.config.max_backoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32, max_backoff_ms: u64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(max_backoff_ms),
            multiplier: 2,
        })
    }

    #[test]
    fn delays_double() {
        let p = policy(3, 30_000);
        assert_eq!(p.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(p.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(p.next_delay(3), Some(Duration::from_millis(400)));
        assert_eq!(p.next_delay(4), None);
    }

    #[test]
    fn delay_capped_at_max() {
        let p = policy(40, 500);
        assert_eq!(p.next_delay(10), Some(Duration::from_millis(500)));
        assert_eq!(p.next_delay(40), Some(Duration::from_millis(500)));
    }

    #[test]
    fn none_never_retries() {
        assert_eq!(RetryPolicy::none().next_delay(1), None);
    }
}
