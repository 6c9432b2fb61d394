//! Broadcast event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collector::ScanStats;
use crate::pagination::{PaginationSnapshot, StrategyKind, TerminationReason};
use crate::retry::ErrorCategory;

/// Why the bus is going away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShutdownReason {
    Completed,
    Error(String),
    Cancelled,
}

/// Fieldless event discriminant used by subscription filters. The string
/// forms are the stable action-style names collaborators subscribe with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ScanStarted,
    ScanComplete,
    ScanError,
    DownloadProgress,
    PaginationProgress,
    PaginationStateUpdate,
    RetryAttempt,
    RetryFailure,
    CircuitBreakerOpened,
    CircuitBreakerReset,
    Shutdown,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ScanStarted => "SCAN_STARTED",
            Self::ScanComplete => "SCAN_COMPLETE",
            Self::ScanError => "SCAN_ERROR",
            Self::DownloadProgress => "DOWNLOAD_PROGRESS",
            Self::PaginationProgress => "PAGINATION_PROGRESS",
            Self::PaginationStateUpdate => "PAGINATION_STATE_UPDATE",
            Self::RetryAttempt => "RETRY_ATTEMPT",
            Self::RetryFailure => "RETRY_FAILURE",
            Self::CircuitBreakerOpened => "CIRCUIT_BREAKER_OPENED",
            Self::CircuitBreakerReset => "CIRCUIT_BREAKER_RESET",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let all = [
            Self::ScanStarted,
            Self::ScanComplete,
            Self::ScanError,
            Self::DownloadProgress,
            Self::PaginationProgress,
            Self::PaginationStateUpdate,
            Self::RetryAttempt,
            Self::RetryFailure,
            Self::CircuitBreakerOpened,
            Self::CircuitBreakerReset,
            Self::Shutdown,
        ];
        all.into_iter().find(|kind| kind.as_str() == value)
    }
}

/// Events broadcast to subscribers during scans, traversal, and retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    ScanStarted {
        session: String,
        url: String,
        timestamp: DateTime<Utc>,
    },
    ScanComplete {
        session: String,
        stats: ScanStats,
        timestamp: DateTime<Utc>,
    },
    ScanError {
        session: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    DownloadProgress {
        session: String,
        url: String,
        completed: u64,
        total: Option<u64>,
        timestamp: DateTime<Utc>,
    },
    PaginationProgress {
        session: String,
        page: u32,
        url: Option<String>,
        strategy: Option<StrategyKind>,
        /// Present on the final event of a traversal.
        terminal: Option<TerminationReason>,
        timestamp: DateTime<Utc>,
    },
    PaginationStateUpdate {
        session: String,
        snapshot: PaginationSnapshot,
        timestamp: DateTime<Utc>,
    },
    RetryAttempt {
        task_id: String,
        attempt: u32,
        category: ErrorCategory,
        /// Backoff that preceded this attempt.
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },
    RetryFailure {
        task_id: String,
        attempts: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    CircuitBreakerOpened {
        category: ErrorCategory,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },
    CircuitBreakerReset {
        category: ErrorCategory,
        timestamp: DateTime<Utc>,
    },
    Shutdown {
        reason: ShutdownReason,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ScanStarted { .. } => EventKind::ScanStarted,
            Self::ScanComplete { .. } => EventKind::ScanComplete,
            Self::ScanError { .. } => EventKind::ScanError,
            Self::DownloadProgress { .. } => EventKind::DownloadProgress,
            Self::PaginationProgress { .. } => EventKind::PaginationProgress,
            Self::PaginationStateUpdate { .. } => EventKind::PaginationStateUpdate,
            Self::RetryAttempt { .. } => EventKind::RetryAttempt,
            Self::RetryFailure { .. } => EventKind::RetryFailure,
            Self::CircuitBreakerOpened { .. } => EventKind::CircuitBreakerOpened,
            Self::CircuitBreakerReset { .. } => EventKind::CircuitBreakerReset,
            Self::Shutdown { .. } => EventKind::Shutdown,
        }
    }

    #[must_use]
    pub fn scan_started(session: String, url: String) -> Self {
        Self::ScanStarted {
            session,
            url,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn scan_complete(session: String, stats: ScanStats) -> Self {
        Self::ScanComplete {
            session,
            stats,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn scan_error(session: String, error: String) -> Self {
        Self::ScanError {
            session,
            error,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn download_progress(
        session: String,
        url: String,
        completed: u64,
        total: Option<u64>,
    ) -> Self {
        Self::DownloadProgress {
            session,
            url,
            completed,
            total,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn pagination_progress(
        session: String,
        page: u32,
        url: Option<String>,
        strategy: Option<StrategyKind>,
        terminal: Option<TerminationReason>,
    ) -> Self {
        Self::PaginationProgress {
            session,
            page,
            url,
            strategy,
            terminal,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn pagination_state_update(session: String, snapshot: PaginationSnapshot) -> Self {
        Self::PaginationStateUpdate {
            session,
            snapshot,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn retry_attempt(
        task_id: String,
        attempt: u32,
        category: ErrorCategory,
        delay_ms: u64,
    ) -> Self {
        Self::RetryAttempt {
            task_id,
            attempt,
            category,
            delay_ms,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn retry_failure(task_id: String, attempts: u32, reason: String) -> Self {
        Self::RetryFailure {
            task_id,
            attempts,
            reason,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn circuit_breaker_opened(category: ErrorCategory, consecutive_failures: u32) -> Self {
        Self::CircuitBreakerOpened {
            category,
            consecutive_failures,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn circuit_breaker_reset(category: ErrorCategory) -> Self {
        Self::CircuitBreakerReset {
            category,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn shutdown(reason: ShutdownReason) -> Self {
        Self::Shutdown {
            reason,
            timestamp: Utc::now(),
        }
    }
}
