use std::time::Duration;

use crate::constants::{FB_RATE_LIMIT_CODES, RETRY_BASE_DELAY_SECS, RETRY_MAX_ATTEMPTS};

/// Backoff policy shared by every outbound Graph API call site.
///
/// Attempts are numbered from zero; the delay before retry `n` is
/// `base_delay << n` (1s, 2s, 4s, ...). After `max_attempts` tries the
/// caller gives up and surfaces the last error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub retryable_codes: &'static [i64],
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(RETRY_BASE_DELAY_SECS),
            retryable_codes: FB_RATE_LIMIT_CODES,
        }
    }
}

impl RetryPolicy {
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    pub fn is_retryable_code(&self, code: i64) -> bool {
        self.retryable_codes.contains(&code)
    }

    /// True when `attempt` was the final allowed try.
    pub fn is_last_attempt(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delays_double_per_attempt() {
        let policy = RetryPolicy::default();
        let delays: Vec<Duration> = (0..policy.max_attempts)
            .map(|a| policy.backoff_delay(a))
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
        for pair in delays.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn gives_up_after_exactly_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };

        let mut attempts = 0;
        for attempt in 0.. {
            attempts += 1;
            if policy.is_last_attempt(attempt) {
                break;
            }
        }
        assert_eq!(attempts, 3);
    }

    #[test]
    fn only_rate_limit_codes_are_retryable() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable_code(4));
        assert!(policy.is_retryable_code(368));
        assert!(!policy.is_retryable_code(190));
        assert!(!policy.is_retryable_code(100));
    }
}
