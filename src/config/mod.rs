//! Engine configuration.
//!
//! [`ScanConfig`] gathers every tunable knob under one root with defaults
//! matching the documented behavior of each component. Construct one with
//! [`ScanConfigBuilder`], which validates cross-field invariants (signal
//! weights summing to one, delay ordering) at build time so the hot paths
//! never re-check them.

mod builder;
mod types;

pub use builder::ScanConfigBuilder;
pub use types::{
    CollectorConfig, PaginationConfig, PatternConfig, RetryConfig, RouterConfig, ScanConfig,
    ScoringConfig,
};
