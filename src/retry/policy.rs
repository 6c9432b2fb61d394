//! Error categories and per-category retry policies.

use rand::Rng as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Floor applied to every computed delay.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Failure taxonomy. Every error the manager sees is mapped onto exactly one
/// of these, and each carries its own backoff policy and circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Network,
    Timeout,
    Server,
    RateLimit,
    Cors,
    Permission,
    NotFound,
    Extension,
    Memory,
    Validation,
    Default,
}

impl ErrorCategory {
    pub const ALL: [Self; 11] = [
        Self::Network,
        Self::Timeout,
        Self::Server,
        Self::RateLimit,
        Self::Cors,
        Self::Permission,
        Self::NotFound,
        Self::Extension,
        Self::Memory,
        Self::Validation,
        Self::Default,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Server => "server",
            Self::RateLimit => "rate-limit",
            Self::Cors => "cors",
            Self::Permission => "permission",
            Self::NotFound => "not-found",
            Self::Extension => "extension",
            Self::Memory => "memory",
            Self::Validation => "validation",
            Self::Default => "default",
        }
    }
}

/// Backoff policy for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Full jitter: the actual wait is drawn uniformly from [0, delay].
    pub jitter: bool,
    pub retryable: bool,
}

impl RetryPolicy {
    /// The built-in policy table.
    #[must_use]
    pub fn for_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Network => Self {
                max_attempts: 5,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(60),
                backoff_multiplier: 2.0,
                jitter: true,
                retryable: true,
            },
            ErrorCategory::Timeout => Self {
                max_attempts: 4,
                base_delay: Duration::from_secs(3),
                max_delay: Duration::from_secs(45),
                backoff_multiplier: 1.8,
                jitter: true,
                retryable: true,
            },
            ErrorCategory::Server => Self {
                max_attempts: 4,
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(120),
                backoff_multiplier: 2.5,
                jitter: true,
                retryable: true,
            },
            ErrorCategory::RateLimit => Self {
                max_attempts: 6,
                base_delay: Duration::from_secs(10),
                max_delay: Duration::from_secs(300),
                backoff_multiplier: 3.0,
                jitter: true,
                retryable: true,
            },
            ErrorCategory::Cors => Self {
                max_attempts: 2,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(5),
                backoff_multiplier: 1.5,
                jitter: false,
                retryable: true,
            },
            ErrorCategory::Extension => Self {
                max_attempts: 2,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(10),
                backoff_multiplier: 2.0,
                jitter: false,
                retryable: true,
            },
            ErrorCategory::Permission
            | ErrorCategory::NotFound
            | ErrorCategory::Memory
            | ErrorCategory::Validation => Self {
                max_attempts: 0,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                backoff_multiplier: 1.0,
                jitter: false,
                retryable: false,
            },
            ErrorCategory::Default => Self {
                max_attempts: 3,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(30),
                backoff_multiplier: 2.0,
                jitter: true,
                retryable: true,
            },
        }
    }

    /// Delay before attempt `attempt` (1-based):
    /// `min(max_delay, base · mult^(attempt-1))`, uniformly jittered when
    /// configured, never below 100 ms.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let raw = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_millis() as f64).max(0.0);
        let drawn = if self.jitter && capped > 0.0 {
            rand::rng().random_range(0.0..=capped)
        } else {
            capped
        };
        let millis = (drawn as u64)
            .max(MIN_RETRY_DELAY.as_millis() as u64)
            .min((self.max_delay.as_millis() as u64).max(MIN_RETRY_DELAY.as_millis() as u64));
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_stays_within_bounds() {
        let policy = RetryPolicy::for_category(ErrorCategory::Network);
        for attempt in 1..=policy.max_attempts {
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt);
                assert!(delay >= Duration::from_millis(100), "attempt {attempt}: {delay:?}");
                assert!(delay <= policy.max_delay, "attempt {attempt}: {delay:?}");
            }
        }
    }

    #[test]
    fn test_no_jitter_is_deterministic_and_capped() {
        let policy = RetryPolicy::for_category(ErrorCategory::Cors);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        // 1s · 1.5 = 1.5s
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1500));
        // 1s · 1.5^10 would exceed the 5s cap.
        assert_eq!(policy.delay_for_attempt(11), Duration::from_secs(5));
    }

    #[test]
    fn test_non_retryable_categories() {
        for category in [
            ErrorCategory::Permission,
            ErrorCategory::NotFound,
            ErrorCategory::Memory,
            ErrorCategory::Validation,
        ] {
            let policy = RetryPolicy::for_category(category);
            assert!(!policy.retryable);
            assert_eq!(policy.max_attempts, 0);
        }
    }
}
