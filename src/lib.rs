pub mod collector;
pub mod config;
pub mod dom;
pub mod pagination;
pub mod patterns;
pub mod ports;
pub mod retry;
pub mod router;
pub mod scoring;
pub mod urlnorm;

pub use collector::{CollectedImages, CollectorError, DiscoveryMethod, ImageCategory, ImageCollector, ImageRecord, ScanStats};
pub use config::{ScanConfig, ScanConfigBuilder};
pub use dom::{ComputedStyle, DomAdapter, DomError, ElementHandle, Rect, StaticDomAdapter};
pub use pagination::{
    PaginationDetection, PaginationDetector, PaginationEngine, PaginationKind,
    PaginationSnapshot, PaginationState, PaginationTarget, PatternStore, StepOutcome, StopHandle,
    Strategy, StrategyKind, TerminationReason, TraversalOutcome,
};
pub use patterns::{GalleryLayout, GalleryPattern, Orientation, PatternRecognizer};
pub use ports::{
    CancelToken, Clock, DownloadSink, ExportSink, FetchError, FetchNavigator, FetchRequest,
    FetchResponse, Fetcher, HttpFetcher, ManualClock, MemoryStore, NavError, NavigationOutcome,
    Navigator, PersistSink, TokioClock,
};
pub use retry::{
    BreakerBank, BreakerState, CategoryStats, ErrorCategory, ErrorClassifier, ErrorSurface,
    OperationRegistry, RetryError, RetryManager, RetryOperation, RetryOptions, RetryPolicy,
    RetrySnapshot,
};
pub use router::{
    Action, EngineEvent, EventBus, EventFilter, EventKind, RequestEnvelope, ResponseEnvelope,
    Router, ShutdownReason, Subscription,
};
pub use scoring::{ConfidenceLevel, ConfidenceReport, ConfidenceScorer, SignalScore, SignalWeights};
pub use urlnorm::UrlCanonicalizer;
