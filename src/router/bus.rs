//! Broadcast event bus with filtered subscriptions and metrics.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, broadcast};

use super::events::{EngineEvent, EventKind, ShutdownReason};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// No active subscribers when publishing.
    #[error("no active subscribers")]
    NoSubscribers,
    /// Receiver couldn't keep up, missed messages.
    #[error("receiver lagged behind, missed {0} messages")]
    Lagged(u64),
    #[error("event bus shutdown")]
    Shutdown,
}

/// Which events a subscriber wants.
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    Kinds(HashSet<EventKind>),
}

impl EventFilter {
    /// Build a filter from subscription strings; `"*"` anywhere means all.
    /// Unknown names are ignored so stale subscribers degrade gracefully.
    #[must_use]
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut kinds = HashSet::new();
        for name in names {
            if name == "*" {
                return Self::All;
            }
            if let Some(kind) = EventKind::parse(name) {
                kinds.insert(kind);
            } else {
                log::debug!("ignoring unknown event subscription {name:?}");
            }
        }
        Self::Kinds(kinds)
    }

    #[must_use]
    pub fn accepts(&self, event: &EngineEvent) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => kinds.contains(&event.kind()),
        }
    }
}

/// Lock-free publish/drop/failure counters.
#[derive(Debug, Default)]
pub struct BusMetrics {
    published: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    subscribers: AtomicUsize,
    peak_subscribers: AtomicUsize,
}

#[derive(Debug, Clone, Copy)]
pub struct BusMetricsSnapshot {
    pub published: u64,
    pub dropped: u64,
    pub failed: u64,
    pub subscribers: usize,
    pub peak_subscribers: usize,
}

impl BusMetrics {
    fn record_publish(&self, subscriber_count: usize) {
        self.published.fetch_add(1, Ordering::SeqCst);
        self.subscribers.store(subscriber_count, Ordering::SeqCst);
        let _ = self
            .peak_subscribers
            .fetch_max(subscriber_count, Ordering::SeqCst);
        if subscriber_count == 0 {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> BusMetricsSnapshot {
        BusMetricsSnapshot {
            published: self.published.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            subscribers: self.subscribers.load(Ordering::SeqCst),
            peak_subscribers: self.peak_subscribers.load(Ordering::SeqCst),
        }
    }
}

/// Named, filtered event receiver. Buffered non-matching events are skipped
/// in place; no matching event is lost between `recv` calls.
pub struct Subscription {
    pub channel: String,
    receiver: broadcast::Receiver<EngineEvent>,
    filter: EventFilter,
}

impl Subscription {
    /// Next event passing the filter.
    pub async fn recv(&mut self) -> Result<EngineEvent, BusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.accepts(&event) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Shutdown),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    return Err(BusError::Lagged(missed));
                }
            }
        }
    }

    /// Non-blocking variant; `Ok(None)` when nothing matching is buffered.
    pub fn try_recv(&mut self) -> Result<Option<EngineEvent>, BusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.accepts(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => return Err(BusError::Shutdown),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    return Err(BusError::Lagged(missed));
                }
            }
        }
    }
}

/// Clonable broadcast bus. All clones share one channel, one metrics block,
/// and one shutdown signal.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
    metrics: Arc<BusMetrics>,
    shutdown: Arc<Notify>,
    shutdown_flag: Arc<AtomicBool>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            metrics: Arc::new(BusMetrics::default()),
            shutdown: Arc::new(Notify::new()),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Publish to all subscribers; returns how many received it.
    pub async fn publish(&self, event: EngineEvent) -> Result<usize, BusError> {
        if self.is_shutdown() {
            return Err(BusError::Shutdown);
        }
        match self.sender.send(event) {
            Ok(subscriber_count) => {
                self.metrics.record_publish(subscriber_count);
                Ok(subscriber_count)
            }
            Err(_) => {
                self.metrics.failed.fetch_add(1, Ordering::SeqCst);
                Err(BusError::NoSubscribers)
            }
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Subscribe under a channel name with an event-type filter.
    #[must_use]
    pub fn subscribe_channel(&self, channel: impl Into<String>, filter: EventFilter) -> Subscription {
        Subscription {
            channel: channel.into(),
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn metrics(&self) -> &BusMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown.notified().await;
    }

    /// Broadcast a `Shutdown` event, give subscribers a moment to drain, and
    /// wake anything blocked on [`wait_for_shutdown`](Self::wait_for_shutdown).
    /// Idempotent.
    pub async fn shutdown_gracefully(&self, reason: ShutdownReason) {
        if self.shutdown_flag.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.sender.send(EngineEvent::shutdown(reason));
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.shutdown.notify_waiters();
        log::debug!("event bus shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() -> anyhow::Result<()> {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::scan_started(
            "doc-1".to_string(),
            "https://ex.com/".to_string(),
        ))
        .await?;
        let event = rx.recv().await?;
        assert_eq!(event.kind(), EventKind::ScanStarted);
        assert_eq!(bus.metrics().snapshot().published, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_filtered_subscription() -> anyhow::Result<()> {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe_channel(
            "progress-panel",
            EventFilter::from_names(["PAGINATION_PROGRESS"]),
        );

        bus.publish(EngineEvent::scan_started(
            "doc-1".to_string(),
            "https://ex.com/".to_string(),
        ))
        .await?;
        bus.publish(EngineEvent::pagination_progress(
            "doc-1".to_string(),
            2,
            None,
            None,
            None,
        ))
        .await?;

        let event = sub.recv().await.map_err(|e| anyhow::anyhow!("{e}"))?;
        assert_eq!(event.kind(), EventKind::PaginationProgress);
        Ok(())
    }

    #[tokio::test]
    async fn test_wildcard_filter() {
        let filter = EventFilter::from_names(["SCAN_STARTED", "*"]);
        assert!(filter.accepts(&EngineEvent::scan_started(String::new(), String::new())));
        assert!(filter.accepts(&EngineEvent::retry_failure(String::new(), 1, String::new())));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let bus = EventBus::new(16);
        let result = bus
            .publish(EngineEvent::scan_started(String::new(), String::new()))
            .await;
        assert!(matches!(result, Err(BusError::NoSubscribers)));
    }
}
