//! Scoped restart backoff and circuit breaker.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use pagecast_ipc::RestartSettings;

/// Decides how long to wait before restarting the encoder and when to give up.
///
/// Failures are counted inside a sliding window. The n-th failure in the
/// window waits `base_delay * 2^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    settings: RestartSettings,
    failures: VecDeque<Instant>,
}

impl RestartPolicy {
    /// Create a policy with no recorded failures.
    pub fn new(settings: RestartSettings) -> Self {
        Self {
            settings,
            failures: VecDeque::new(),
        }
    }

    /// Record a failure at `now` and return the count inside the window.
    pub fn record_failure(&mut self, now: Instant) -> u32 {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) > self.settings.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        self.failures.push_back(now);
        self.failures.len() as u32
    }

    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.checked_pow(attempt.saturating_sub(1));
        multiplier
            .and_then(|m| self.settings.base_delay.checked_mul(m))
            .map_or(self.settings.max_delay, |d| d.min(self.settings.max_delay))
    }

    /// Check if another restart is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.settings.max_failures.map_or(true, |max| attempt <= max)
    }

    /// The settings this policy was built from.
    pub fn settings(&self) -> &RestartSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_failures: Option<u32>) -> RestartSettings {
        RestartSettings {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_failures,
            window: Duration::from_secs(600),
        }
    }

    #[test]
    fn test_restart_policy_delays() {
        let policy = RestartPolicy::new(settings(None));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_secs(60));
    }

    #[test]
    fn test_restart_policy_should_retry() {
        let policy = RestartPolicy::new(settings(Some(3)));

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));

        let unbounded = RestartPolicy::new(settings(None));
        assert!(unbounded.should_retry(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_age_out_of_window() {
        let mut policy = RestartPolicy::new(settings(Some(3)));

        assert_eq!(policy.record_failure(Instant::now()), 1);
        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(policy.record_failure(Instant::now()), 2);

        tokio::time::advance(Duration::from_secs(301)).await;
        // The first failure is now older than the window.
        assert_eq!(policy.record_failure(Instant::now()), 2);
    }
}
