//! Retry pacing for upstream calls.

use std::time::Duration;

/// Retries allowed after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Jitter ceiling as a fraction of the computed delay.
const JITTER_FRACTION: f64 = 0.3;

/// Attempt ceiling and backoff shape for retryable failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (zero-based).
    ///
    /// A server-supplied hint is used verbatim; server pacing outranks our
    /// own. Otherwise the delay doubles per attempt with up to 30% added
    /// jitter, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint;
        }
        let exponential = self.base_delay.as_millis() as f64 * 2f64.powi(attempt as i32);
        let jitter = exponential * JITTER_FRACTION * rand::random::<f64>();
        let delay = (exponential + jitter).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_with_bounded_jitter() {
        let config = RetryConfig::default();

        for (attempt, base_ms) in [(0u32, 1000u64), (1, 2000), (2, 4000)] {
            let delay = config.backoff(attempt, None).as_millis() as u64;
            assert!(
                (base_ms..base_ms + base_ms * 3 / 10 + 1).contains(&delay),
                "attempt {}: {}ms outside [{}ms, {}ms]",
                attempt,
                delay,
                base_ms,
                base_ms + base_ms * 3 / 10
            );
        }
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let config = RetryConfig::default();
        let delay = config.backoff(10, None);
        assert_eq!(delay, config.max_delay);
    }

    #[test]
    fn test_server_hint_is_used_verbatim() {
        let config = RetryConfig::default();
        let delay = config.backoff(0, Some(Duration::from_millis(12345)));
        assert_eq!(delay, Duration::from_millis(12345));
    }
}
