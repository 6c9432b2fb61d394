//! Fluent builder for `ScanConfig` with build-time validation.

use anyhow::{Result, anyhow};

use super::types::ScanConfig;
use crate::retry::{ErrorCategory, RetryPolicy};
use crate::scoring::SignalWeights;

/// How far the signal weight sum may drift from 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Builder over a default [`ScanConfig`]. Every setter is optional; `build`
/// checks the invariants the components rely on.
#[derive(Debug, Clone, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signal_weights(mut self, weights: SignalWeights) -> Self {
        self.config.scoring.weights = weights;
        self
    }

    #[must_use]
    pub fn min_pattern_items(mut self, items: usize) -> Self {
        self.config.patterns.min_pattern_items = items;
        self
    }

    #[must_use]
    pub fn max_pages(mut self, pages: u32) -> Self {
        self.config.pagination.max_pages = pages;
        self
    }

    #[must_use]
    pub fn page_delay_ms(mut self, min: u64, max: u64) -> Self {
        self.config.pagination.delay_min_ms = min;
        self.config.pagination.delay_max_ms = max;
        self
    }

    #[must_use]
    pub fn wait_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.pagination.wait_timeout_ms = timeout;
        self
    }

    #[must_use]
    pub fn hash_guard(mut self, enabled: bool) -> Self {
        self.config.pagination.hash_guard_enabled = enabled;
        self
    }

    #[must_use]
    pub fn prefer_numeric_next(mut self, prefer: bool) -> Self {
        self.config.pagination.prefer_numeric_next = prefer;
        self
    }

    #[must_use]
    pub fn strip_query(mut self, strip: bool) -> Self {
        self.config.strip_query = strip;
        self
    }

    #[must_use]
    pub fn image_extensions(mut self, extensions: Vec<String>) -> Self {
        self.config.image_extensions = extensions;
        self
    }

    #[must_use]
    pub fn message_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.router.message_timeout_ms = timeout;
        self
    }

    #[must_use]
    pub fn max_concurrent_retries(mut self, max: usize) -> Self {
        self.config.retry.max_concurrent_retries = max;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, category: ErrorCategory, policy: RetryPolicy) -> Self {
        self.config.retry.policy_overrides.insert(category, policy);
        self
    }

    /// Validate and produce the configuration.
    ///
    /// # Errors
    /// Returns an error when signal weights do not sum to 1 (± 0.01), when
    /// delay bounds are inverted, when level thresholds are not descending,
    /// or when a pattern minimum is zero.
    pub fn build(self) -> Result<ScanConfig> {
        let config = self.config;

        let sum = config.scoring.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(anyhow!(
                "signal weights must sum to 1.0 ± {WEIGHT_SUM_TOLERANCE}, got {sum:.4}"
            ));
        }

        if config.pagination.delay_min_ms > config.pagination.delay_max_ms {
            return Err(anyhow!(
                "delay_min_ms ({}) exceeds delay_max_ms ({})",
                config.pagination.delay_min_ms,
                config.pagination.delay_max_ms
            ));
        }

        let s = &config.scoring;
        if !(s.low_threshold < s.medium_threshold && s.medium_threshold < s.high_threshold) {
            return Err(anyhow!(
                "confidence thresholds must be strictly ascending: low {} < medium {} < high {}",
                s.low_threshold,
                s.medium_threshold,
                s.high_threshold
            ));
        }

        if config.patterns.min_pattern_items == 0 {
            return Err(anyhow!("min_pattern_items must be at least 1"));
        }

        if config.patterns.min_container_area >= config.patterns.max_container_area {
            return Err(anyhow!("container area range is empty"));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() -> Result<()> {
        let config = ScanConfigBuilder::new().build()?;
        assert_eq!(config.pagination.delay_min_ms, 2000);
        assert_eq!(config.pagination.delay_max_ms, 5000);
        assert_eq!(config.scoring.max_analysis_time_ms, 100);
        assert_eq!(config.retry.breaker_threshold, 5);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_weights() {
        let weights = SignalWeights {
            url_pattern: 0.9,
            ..SignalWeights::default()
        };
        assert!(ScanConfigBuilder::new().signal_weights(weights).build().is_err());
    }

    #[test]
    fn test_rejects_inverted_delays() {
        assert!(
            ScanConfigBuilder::new()
                .page_delay_ms(5000, 2000)
                .build()
                .is_err()
        );
    }
}
