//! Per-category circuit breakers.
//!
//! Each error category gets an independent breaker tracking consecutive
//! failures:
//! - Closed: attempts proceed
//! - Open: attempts blocked until the cooldown elapses
//! - HalfOpen: one probe allowed; success closes, failure re-opens
//!
//! An Open breaker that sits past `reset_timeout` is force-reset to Closed so
//! a long-idle category never stays wedged.

use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::policy::ErrorCategory;
use crate::ports::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker thresholds shared by every category.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub threshold: u32,
    pub cooldown: Duration,
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(300),
        }
    }
}

/// State transition worth broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerTransition {
    Opened {
        category: ErrorCategory,
        consecutive_failures: u32,
    },
    Reset {
        category: ErrorCategory,
    },
}

#[derive(Debug, Clone)]
struct Breaker {
    state: BreakerState,
    consecutive_failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            successes: 0,
            opened_at: None,
        }
    }
}

/// Serializable view for the persisted snapshot. `opened_at` is monotonic
/// and cannot survive a restart; restored Open breakers restart their
/// cooldown from the restore instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub category: ErrorCategory,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub successes: u32,
}

/// All category breakers behind one handle.
pub struct BreakerBank {
    breakers: DashMap<ErrorCategory, Breaker>,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
}

impl BreakerBank {
    #[must_use]
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            clock,
        }
    }

    /// Whether a task in this category may execute now. Performs the
    /// Open→HalfOpen and force-reset transitions as a side effect.
    pub fn should_attempt(&self, category: ErrorCategory) -> bool {
        let mut breaker = self.breakers.entry(category).or_insert_with(Breaker::new);
        match breaker.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let Some(opened_at) = breaker.opened_at else {
                    // Open without a timestamp cannot happen through this
                    // API; stay conservative.
                    return false;
                };
                let elapsed = self.clock.now().saturating_duration_since(opened_at);
                if elapsed >= self.config.reset_timeout {
                    info!("circuit breaker force-reset for {}", category.as_str());
                    breaker.state = BreakerState::Closed;
                    breaker.consecutive_failures = 0;
                    breaker.opened_at = None;
                    true
                } else if elapsed >= self.config.cooldown {
                    info!("circuit breaker half-open for {}", category.as_str());
                    breaker.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a success. Any success in HalfOpen closes the breaker and
    /// zeroes the failure count.
    pub fn record_success(&self, category: ErrorCategory) -> Option<BreakerTransition> {
        let mut breaker = self.breakers.entry(category).or_insert_with(Breaker::new);
        breaker.consecutive_failures = 0;
        breaker.successes += 1;
        if breaker.state == BreakerState::HalfOpen {
            breaker.state = BreakerState::Closed;
            breaker.opened_at = None;
            info!("circuit breaker closed for {}", category.as_str());
            return Some(BreakerTransition::Reset { category });
        }
        None
    }

    /// Record a failure. Opens the breaker at the threshold, and re-opens
    /// (restarting the cooldown) on a HalfOpen failure.
    pub fn record_failure(&self, category: ErrorCategory) -> Option<BreakerTransition> {
        let mut breaker = self.breakers.entry(category).or_insert_with(Breaker::new);
        breaker.consecutive_failures += 1;

        let reopen = breaker.state == BreakerState::HalfOpen;
        let threshold_hit = breaker.state == BreakerState::Closed
            && breaker.consecutive_failures >= self.config.threshold;
        if reopen || threshold_hit {
            breaker.state = BreakerState::Open;
            breaker.opened_at = Some(self.clock.now());
            warn!(
                "circuit breaker opened for {} after {} consecutive failure(s)",
                category.as_str(),
                breaker.consecutive_failures
            );
            return Some(BreakerTransition::Opened {
                category,
                consecutive_failures: breaker.consecutive_failures,
            });
        }
        debug!(
            "failure {}/{} for {}",
            breaker.consecutive_failures,
            self.config.threshold,
            category.as_str()
        );
        None
    }

    #[must_use]
    pub fn state(&self, category: ErrorCategory) -> BreakerState {
        self.breakers
            .get(&category)
            .map_or(BreakerState::Closed, |b| b.state)
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.config.cooldown
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut out: Vec<BreakerSnapshot> = self
            .breakers
            .iter()
            .map(|entry| BreakerSnapshot {
                category: *entry.key(),
                state: entry.value().state,
                consecutive_failures: entry.value().consecutive_failures,
                successes: entry.value().successes,
            })
            .collect();
        out.sort_by_key(|s| s.category.as_str());
        out
    }

    /// Restore breakers from a snapshot. Open breakers restart their
    /// cooldown now.
    pub fn restore(&self, snapshots: Vec<BreakerSnapshot>) {
        for snapshot in snapshots {
            let opened_at =
                (snapshot.state == BreakerState::Open).then(|| self.clock.now());
            self.breakers.insert(
                snapshot.category,
                Breaker {
                    state: snapshot.state,
                    consecutive_failures: snapshot.consecutive_failures,
                    successes: snapshot.successes,
                    opened_at,
                },
            );
        }
    }
}
