//! Linear retry backoff.

use std::time::Duration;

/// Linear backoff: the n-th retry waits `initial_delay * n`.
///
/// With the defaults (3s, 5 attempts) the waits are 3s, 6s, 9s, 12s, 15s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    initial_delay: Duration,
    max_retries: u32,
}

impl LinearBackoff {
    pub fn new(initial_delay: Duration, max_retries: u32) -> Self {
        Self {
            initial_delay,
            max_retries,
        }
    }

    /// Number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// retry budget is spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        Some(self.initial_delay.saturating_mul(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delays() {
        let backoff = LinearBackoff::new(Duration::from_secs(3), 5);
        let delays: Vec<_> = (1..=5).filter_map(|n| backoff.delay(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(3),
                Duration::from_secs(6),
                Duration::from_secs(9),
                Duration::from_secs(12),
                Duration::from_secs(15),
            ]
        );
    }

    #[test]
    fn test_budget_exhausted() {
        let backoff = LinearBackoff::new(Duration::from_millis(100), 2);
        assert_eq!(backoff.delay(0), None);
        assert_eq!(backoff.delay(3), None);
        assert_eq!(backoff.max_retries(), 2);
    }

    #[test]
    fn test_zero_retries() {
        let backoff = LinearBackoff::new(Duration::from_secs(1), 0);
        assert_eq!(backoff.delay(1), None);
    }
}
