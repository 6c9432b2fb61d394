//! Collaborator ports.
//!
//! Everything the engine cannot do headlessly lives behind one of these
//! traits: fetching bytes, performing navigation, exporting and downloading,
//! session-scoped persistence, and time. The engine only ever holds `Arc<dyn …>`
//! handles; hosts decide what actually satisfies them. Bundled implementations
//! cover the headless case: [`HttpFetcher`] (reqwest), [`FetchNavigator`]
//! (fetch + static DOM), [`MemoryStore`], and [`TokioClock`].

mod clock;
mod http;
mod memory;

pub use clock::{ManualClock, TokioClock};
pub use http::{FetchNavigator, HttpFetcher};
pub use memory::MemoryStore;

use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use url::Url;

use crate::dom::{DomAdapter, ElementHandle};

/// Cooperative cancellation handle shared between a caller and an in-flight
/// operation. Cancelling is idempotent and wakes every waiter.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// A single HTTP exchange request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// Fully-buffered HTTP response. Streaming is not part of the contract.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub final_url: Url,
}

impl FetchResponse {
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Transport for document and resource fetches. Implementations own
/// credentials, cookies, and TLS; the engine never sees them.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        request: FetchRequest,
        cancel: CancelToken,
    ) -> BoxFuture<'_, Result<FetchResponse, FetchError>>;
}

/// Result of a navigation. A URL load yields a fresh adapter for the new
/// document; a click may mutate the current document in place, in which case
/// `dom` is `None` and the caller re-observes the existing adapter.
pub struct NavigationOutcome {
    pub dom: Option<Arc<dyn DomAdapter>>,
    pub final_url: Option<Url>,
}

#[derive(Debug, thiserror::Error)]
pub enum NavError {
    #[error("navigation failed: {0}")]
    Failed(String),
    #[error("navigation timed out")]
    Timeout,
    #[error("navigation not supported: {0}")]
    Unsupported(String),
}

/// Page transition capability. `click` is the only way the engine interacts
/// with an element; how a trusted click is synthesized is the adapter's
/// business.
pub trait Navigator: Send + Sync {
    fn click(&self, handle: ElementHandle) -> BoxFuture<'_, Result<NavigationOutcome, NavError>>;
    fn load(&self, url: Url) -> BoxFuture<'_, Result<NavigationOutcome, NavError>>;
}

/// Sink for serialized scan output.
pub trait ExportSink: Send + Sync {
    fn write(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'_, anyhow::Result<()>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Overwrite,
    Uniquify,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Complete,
    Interrupted,
}

/// Sink for image file downloads.
pub trait DownloadSink: Send + Sync {
    fn enqueue(
        &self,
        url: &Url,
        filename: &str,
        conflict: ConflictPolicy,
    ) -> BoxFuture<'_, anyhow::Result<DownloadId>>;
    fn on_completion(&self, id: DownloadId) -> BoxFuture<'_, anyhow::Result<DownloadOutcome>>;
}

/// Session-scoped string-keyed persistence for retry and pagination snapshots.
pub trait PersistSink: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'_, anyhow::Result<Option<String>>>;
    fn set(&self, key: &str, value: String) -> BoxFuture<'_, anyhow::Result<()>>;
    fn delete(&self, key: &str) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Monotonic time and suspension. Tests substitute [`ManualClock`] so backoff
/// schedules are observable without real waiting.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}
