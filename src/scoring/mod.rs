//! Gallery confidence scoring.
//!
//! Combines six independent signals into a single [0, 1] score with an
//! attached rationale. The scorer is pure for a given input and caches by
//! `(selector, page_url, item_count)`; a deadline bounds the whole pass so a
//! pathological document cannot stall a scan, with missed signals defaulting
//! to a neutral 0.3.

pub mod signals;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::ScoringConfig;
use crate::dom::{DomAdapter, ElementHandle};
use crate::ports::{Clock, TokioClock};

/// Relative importance of each signal. Must sum to 1 ± 0.01; the config
/// builder enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub url_pattern: f64,
    pub selector_stability: f64,
    pub layout_consistency: f64,
    pub image_dimensions: f64,
    pub lazy_load_readiness: f64,
    pub element_count: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            url_pattern: 0.20,
            selector_stability: 0.25,
            layout_consistency: 0.20,
            image_dimensions: 0.15,
            lazy_load_readiness: 0.10,
            element_count: 0.10,
        }
    }
}

impl SignalWeights {
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.url_pattern
            + self.selector_stability
            + self.layout_consistency
            + self.image_dimensions
            + self.lazy_load_readiness
            + self.element_count
    }
}

/// Bucketed translation of the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    #[must_use]
    pub fn from_score(score: f64, config: &ScoringConfig) -> Self {
        if score >= config.high_threshold {
            Self::High
        } else if score >= config.medium_threshold {
            Self::Medium
        } else if score >= config.low_threshold {
            Self::Low
        } else {
            Self::VeryLow
        }
    }
}

/// One signal's contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalScore {
    pub score: f64,
    pub detail: String,
}

/// All six signals, named.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub url_pattern: SignalScore,
    pub selector_stability: SignalScore,
    pub layout_consistency: SignalScore,
    pub image_dimensions: SignalScore,
    pub lazy_load_readiness: SignalScore,
    pub element_count: SignalScore,
}

/// Scorer output: the combined score, its level, the per-signal breakdown,
/// and advisory text for whoever reads the export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub score: f64,
    pub level: ConfidenceLevel,
    pub signals: SignalBreakdown,
    pub rationale: String,
    pub recommendations: Vec<String>,
}

/// Borrowed view of a candidate pattern for scoring.
pub struct ScoreInput<'a> {
    pub dom: &'a dyn DomAdapter,
    pub container: ElementHandle,
    pub items: &'a [ElementHandle],
    pub selector: &'a str,
    pub page_url: &'a Url,
}

type CacheKey = (String, String, usize);

/// Weighted-mean scorer with a bounded result cache.
pub struct ConfidenceScorer {
    config: ScoringConfig,
    clock: Arc<dyn Clock>,
    cache: Mutex<LruCache<CacheKey, ConfidenceReport>>,
}

impl ConfidenceScorer {
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    #[must_use]
    pub fn with_clock(config: ScoringConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1))
            .expect("BUG: cache capacity clamped to at least 1");
        Self {
            config,
            clock,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Score a candidate pattern.
    ///
    /// Signals are computed in a fixed order; once the analysis deadline
    /// passes, remaining signals fall back to 0.3 and say so in their detail.
    pub fn score(&self, input: &ScoreInput<'_>) -> ConfidenceReport {
        let key: CacheKey = (
            input.selector.to_string(),
            input.page_url.to_string(),
            input.items.len(),
        );
        if let Some(hit) = self.cache.lock().get(&key) {
            return hit.clone();
        }

        let deadline = self.clock.now() + Duration::from_millis(self.config.max_analysis_time_ms);
        let mut timed_out = false;
        let mut guarded = |f: &dyn Fn() -> SignalScore| -> SignalScore {
            if self.clock.now() >= deadline {
                timed_out = true;
                SignalScore {
                    score: 0.3,
                    detail: "analysis deadline exceeded".to_string(),
                }
            } else {
                f()
            }
        };

        let breakdown = SignalBreakdown {
            url_pattern: guarded(&|| signals::url_pattern(input.page_url)),
            selector_stability: guarded(&|| signals::selector_stability(input.selector)),
            layout_consistency: guarded(&|| {
                signals::layout_consistency(input, self.config.grid_tolerance_px)
            }),
            image_dimensions: guarded(&|| {
                signals::image_dimensions(
                    input,
                    self.config.min_dimension_px,
                    self.config.optimal_dimension_px,
                )
            }),
            lazy_load_readiness: guarded(&|| signals::lazy_load_readiness(input)),
            element_count: guarded(&|| signals::element_count(input.items.len())),
        };

        let weights = &self.config.weights;
        let score = (breakdown.url_pattern.score * weights.url_pattern
            + breakdown.selector_stability.score * weights.selector_stability
            + breakdown.layout_consistency.score * weights.layout_consistency
            + breakdown.image_dimensions.score * weights.image_dimensions
            + breakdown.lazy_load_readiness.score * weights.lazy_load_readiness
            + breakdown.element_count.score * weights.element_count)
            .clamp(0.0, 1.0);

        let level = ConfidenceLevel::from_score(score, &self.config);
        let report = ConfidenceReport {
            score,
            level,
            rationale: build_rationale(&breakdown, timed_out),
            recommendations: build_recommendations(&breakdown),
            signals: breakdown,
        };

        if timed_out {
            log::debug!(
                "scoring deadline hit for selector {:?}; partial signals defaulted",
                input.selector
            );
        } else {
            // Only deterministic, fully-computed results are cacheable.
            self.cache.lock().put(key, report.clone());
        }
        report
    }
}

fn build_rationale(signals: &SignalBreakdown, timed_out: bool) -> String {
    let mut named: Vec<(&str, &SignalScore)> = vec![
        ("url pattern", &signals.url_pattern),
        ("selector stability", &signals.selector_stability),
        ("layout consistency", &signals.layout_consistency),
        ("image dimensions", &signals.image_dimensions),
        ("lazy-load readiness", &signals.lazy_load_readiness),
        ("element count", &signals.element_count),
    ];
    named.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let strongest = &named[0];
    let weakest = &named[named.len() - 1];
    let mut rationale = format!(
        "strongest signal: {} ({:.2}, {}); weakest: {} ({:.2}, {})",
        strongest.0, strongest.1.score, strongest.1.detail, weakest.0, weakest.1.score,
        weakest.1.detail
    );
    if timed_out {
        rationale.push_str("; analysis truncated by deadline");
    }
    rationale
}

fn build_recommendations(signals: &SignalBreakdown) -> Vec<String> {
    let mut out = Vec::new();
    if signals.selector_stability.score < 0.5 {
        out.push("selector relies on unstable classes; prefer data-* attributes".to_string());
    }
    if signals.image_dimensions.score < 0.5 {
        out.push("item dimensions below the optimal thumbnail size".to_string());
    }
    if signals.layout_consistency.score < 0.5 {
        out.push("item geometry is irregular; verify the container selector".to_string());
    }
    out
}
