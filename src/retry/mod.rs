//! Failure-isolated retrying.
//!
//! [`RetryManager`] owns the retry queue, the per-category
//! [`BreakerBank`], and the [`ErrorClassifier`] that maps raw failure
//! surfaces onto the category table in [`RetryPolicy`].

mod breaker;
mod classifier;
mod manager;
mod policy;

pub use breaker::{BreakerBank, BreakerConfig, BreakerSnapshot, BreakerState, BreakerTransition};
pub use classifier::{ErrorClassifier, ErrorSurface};
pub use manager::{
    CategoryStats, OperationRegistry, PersistedTask, RetryError, RetryManager, RetryOperation,
    RetryOptions, RetrySnapshot,
};
pub use policy::{ErrorCategory, RetryPolicy};
