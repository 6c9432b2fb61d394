//! Pagination detection and traversal.
//!
//! [`PaginationDetector`] classifies how a page paginates and proposes the
//! next move; [`PaginationEngine`] drives the traversal with loop guards,
//! inter-page delays, and failure isolation; [`PatternStore`] remembers the
//! URL shapes that worked per host so later pages skip detection entirely.

mod detector;
mod engine;
mod learning;
mod state;
mod strategy;
pub mod text_patterns;

pub use detector::PaginationDetector;
pub use engine::{PaginationEngine, StepOutcome, StopHandle, TerminationReason, TraversalOutcome};
pub use learning::{LearnedKind, LearnedPattern, PatternStore};
pub use state::{
    NavigationRecord, PaginationSnapshot, PaginationState, content_hash, main_content_text,
};
pub use strategy::{PaginationDetection, PaginationKind, PaginationTarget, Strategy, StrategyKind};
