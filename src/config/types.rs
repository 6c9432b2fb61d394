//! Configuration types for the discovery and traversal engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::retry::{ErrorCategory, RetryPolicy};
use crate::scoring::SignalWeights;
use crate::urlnorm::IMAGE_EXTENSIONS;

/// Root configuration shared by every component of one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub collector: CollectorConfig,
    pub scoring: ScoringConfig,
    pub patterns: PatternConfig,
    pub pagination: PaginationConfig,
    pub retry: RetryConfig,
    pub router: RouterConfig,

    /// Strip query strings when canonicalizing URLs.
    pub strip_query: bool,
    /// Path extensions treated as image-bearing.
    pub image_extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            scoring: ScoringConfig::default(),
            patterns: PatternConfig::default(),
            pagination: PaginationConfig::default(),
            retry: RetryConfig::default(),
            router: RouterConfig::default(),
            strip_query: false,
            image_extensions: IMAGE_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Image collection knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Upper bound on elements examined by the computed-style background
    /// sweep. That sweep touches computed style for arbitrary elements, which
    /// is the most expensive discovery method.
    pub max_style_scan: usize,
    /// Records scoring at or above this go into the high-confidence bucket.
    pub high_confidence_threshold: f64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_style_scan: 200,
            high_confidence_threshold: 0.7,
        }
    }
}

/// Confidence scoring knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: SignalWeights,
    /// Level thresholds: High, Medium, Low. Anything below `low` is VeryLow.
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub low_threshold: f64,
    /// Deadline for one full scoring pass. Signals not computed in time
    /// default to 0.3.
    pub max_analysis_time_ms: u64,
    /// LRU entries kept for `(selector, url, count)` score reuse.
    pub cache_capacity: usize,
    /// Alignment tolerance for row/column clustering.
    pub grid_tolerance_px: f64,
    /// Dimension thresholds for the image-size signal.
    pub min_dimension_px: f64,
    pub optimal_dimension_px: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            high_threshold: 0.75,
            medium_threshold: 0.50,
            low_threshold: 0.25,
            max_analysis_time_ms: 100,
            cache_capacity: 256,
            grid_tolerance_px: 10.0,
            min_dimension_px: 50.0,
            optimal_dimension_px: 200.0,
        }
    }
}

/// Gallery pattern recognition knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Minimum image-bearing descendants for a candidate container.
    pub min_pattern_items: usize,
    /// Layout-specific minima applied at classification time.
    pub grid_min_items: usize,
    pub list_min_items: usize,
    pub carousel_min_items: usize,
    pub masonry_min_items: usize,
    /// Accepted container area range in px².
    pub min_container_area: f64,
    pub max_container_area: f64,
    /// Combined layout/indicator/framework score a container must reach.
    pub composite_threshold: f64,
    /// Shared-axis tolerance for list classification.
    pub axis_tolerance_px: f64,
    /// Row/column clustering tolerance for grid classification.
    pub grid_tolerance_px: f64,
    /// Height variance above which column-aligned items read as masonry.
    pub masonry_height_variance: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_pattern_items: 3,
            grid_min_items: 4,
            list_min_items: 3,
            carousel_min_items: 3,
            masonry_min_items: 6,
            min_container_area: 10_000.0,
            max_container_area: 2_000_000.0,
            composite_threshold: 0.3,
            axis_tolerance_px: 20.0,
            grid_tolerance_px: 10.0,
            masonry_height_variance: 100.0,
        }
    }
}

/// Pagination detection and traversal knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Pages traversed per session unless the caller overrides.
    pub max_pages: u32,
    /// Inter-page delay bounds; a fresh uniform draw per step.
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    /// How long to wait for document growth after click/AJAX navigation.
    pub wait_timeout_ms: u64,
    /// Navigation history ring size.
    pub history_cap: usize,
    /// Reject pages whose main-content digest was already seen.
    pub hash_guard_enabled: bool,
    /// In numbered pagination, prefer the numeric next link over a glyph link
    /// when both follow the current page.
    pub prefer_numeric_next: bool,
    /// Learned per-host URL templates expire after this many days unused.
    pub learned_ttl_days: i64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            delay_min_ms: 2000,
            delay_max_ms: 5000,
            wait_timeout_ms: 5000,
            history_cap: 50,
            hash_guard_enabled: true,
            prefer_numeric_next: true,
            learned_ttl_days: 7,
        }
    }
}

/// Retry and circuit-breaker knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive failures before a category breaker opens.
    pub breaker_threshold: u32,
    /// How long an open breaker blocks its category.
    pub breaker_cooldown_secs: u64,
    /// An Open breaker older than this force-resets.
    pub breaker_reset_secs: u64,
    /// Tasks allowed to execute attempts concurrently; excess tasks wait.
    pub max_concurrent_retries: usize,
    /// Submissions rejected beyond this queue depth.
    pub max_queue: usize,
    /// Per-category policy overrides; unset categories use the built-in table.
    pub policy_overrides: HashMap<ErrorCategory, RetryPolicy>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            breaker_threshold: 5,
            breaker_cooldown_secs: 60,
            breaker_reset_secs: 300,
            max_concurrent_retries: 10,
            max_queue: 1000,
            policy_overrides: HashMap::new(),
        }
    }
}

/// Message routing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Requests unanswered after this fail with a timeout response.
    pub message_timeout_ms: u64,
    /// Broadcast channel capacity.
    pub bus_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            message_timeout_ms: 30_000,
            bus_capacity: 1024,
        }
    }
}
