//! Retry policy: decides backoff delays for requeued keys.

use std::time::Duration;

use rand::Rng;

/// Capped exponential backoff with a little jitter.
///
/// The queue tracks consecutive failures per key and resets the count on
/// success, so the delay table is explicit state rather than incidental
/// queue behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Ceiling no delay exceeds (before jitter).
    pub max_delay: Duration,

    /// Backoff multiplier between consecutive failures.
    pub multiplier: f64,

    /// Fraction of the delay added as uniform random jitter (0.0 disables).
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn default_dispatch() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    /// Delay before redelivering a key that has now failed `failures`
    /// consecutive times (1-indexed).
    pub fn next_delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(32) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jitter = if self.jitter > 0.0 {
            capped * self.jitter * rand::thread_rng().r#gen::<f64>()
        } else {
            0.0
        };
        Duration::from_secs_f64(capped + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default_dispatch()
        }
    }

    #[test]
    fn backoff_doubles_until_the_cap() {
        let policy = no_jitter();
        assert_eq!(policy.next_delay(1), Duration::from_millis(500));
        assert_eq!(policy.next_delay(2), Duration::from_secs(1));
        assert_eq!(policy.next_delay(3), Duration::from_secs(2));
    }

    #[test]
    fn cap_is_respected_for_large_failure_counts() {
        let policy = no_jitter();
        assert_eq!(policy.next_delay(30), Duration::from_secs(60));
        assert_eq!(policy.next_delay(1000), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_its_fraction() {
        let policy = RetryPolicy::default_dispatch();
        for _ in 0..100 {
            let d = policy.next_delay(4);
            assert!(d >= Duration::from_secs(4));
            assert!(d <= Duration::from_secs_f64(4.0 * 1.1));
        }
    }
}
