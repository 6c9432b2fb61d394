//! Message-routed orchestration.
//!
//! The [`Router`] sits between collaborators (UI panels, exporters, hosts)
//! and the engine: it validates inbound envelopes, resolves the target
//! document, dispatches to the matching handler, and answers every request
//! exactly once, under a timeout. Lifecycle events fan out through the
//! broadcast [`EventBus`] with per-subscriber filters.

mod bus;
mod events;
mod messages;

pub use bus::{BusError, BusMetrics, BusMetricsSnapshot, EventBus, EventFilter, Subscription};
pub use events::{EngineEvent, EventKind, ShutdownReason};
pub use messages::{Action, RequestEnvelope, ResponseEnvelope};

use dashmap::DashMap;
use log::{debug, warn};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use url::Url;

use crate::collector::{CollectedImages, ImageCollector};
use crate::config::ScanConfig;
use crate::dom::DomAdapter;
use crate::pagination::{
    PaginationDetection, PaginationDetector, PaginationEngine, PaginationState, PaginationTarget,
    PatternStore, StepOutcome, StopHandle, TerminationReason,
};
use crate::patterns::PatternRecognizer;
use crate::ports::{CancelToken, Clock, ExportSink, Navigator, PersistSink, TokioClock};
use crate::retry::{RetryManager, RetryOptions};
use crate::scoring::ConfidenceScorer;
use crate::urlnorm::UrlCanonicalizer;

/// One registered document: an adapter plus the URL it was loaded from.
#[derive(Clone)]
pub struct DocumentContext {
    pub dom: Arc<dyn DomAdapter>,
    pub url: Url,
}

struct RouterInner {
    config: Arc<ScanConfig>,
    bus: EventBus,
    urls: UrlCanonicalizer,
    scorer: ConfidenceScorer,
    retry: RetryManager,
    learned: Arc<PatternStore>,
    documents: DashMap<String, DocumentContext>,
    last_active: parking_lot::Mutex<Option<String>>,
    scans: DashMap<String, CollectedImages>,
    scan_cancels: DashMap<String, CancelToken>,
    pagination_states: DashMap<String, Arc<AsyncMutex<PaginationState>>>,
    pagination_stops: DashMap<String, StopHandle>,
    navigator: Option<Arc<dyn Navigator>>,
    export: Option<Arc<dyn ExportSink>>,
    persist: Option<Arc<dyn PersistSink>>,
    clock: Arc<dyn Clock>,
}

/// The control-surface entry point.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    #[must_use]
    pub fn new(config: ScanConfig, retry: RetryManager, bus: EventBus) -> Self {
        Self::with_clock(config, retry, bus, Arc::new(TokioClock))
    }

    #[must_use]
    pub fn with_clock(
        config: ScanConfig,
        retry: RetryManager,
        bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let urls = UrlCanonicalizer::new(config.strip_query)
            .with_image_extensions(config.image_extensions.clone());
        let scorer = ConfidenceScorer::with_clock(config.scoring.clone(), Arc::clone(&clock));
        let learned = Arc::new(PatternStore::new(config.pagination.learned_ttl_days));
        Self {
            inner: Arc::new(RouterInner {
                config: Arc::new(config),
                bus,
                urls,
                scorer,
                retry,
                learned,
                documents: DashMap::new(),
                last_active: parking_lot::Mutex::new(None),
                scans: DashMap::new(),
                scan_cancels: DashMap::new(),
                pagination_states: DashMap::new(),
                pagination_stops: DashMap::new(),
                navigator: None,
                export: None,
                persist: None,
                clock,
            }),
        }
    }

    #[must_use]
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("BUG: with_navigator called after the router was shared");
        inner.navigator = Some(navigator);
        self
    }

    #[must_use]
    pub fn with_export(mut self, export: Arc<dyn ExportSink>) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("BUG: with_export called after the router was shared");
        inner.export = Some(export);
        self
    }

    #[must_use]
    pub fn with_persist(mut self, persist: Arc<dyn PersistSink>) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("BUG: with_persist called after the router was shared");
        inner.persist = Some(persist);
        self
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    #[must_use]
    pub fn retry(&self) -> &RetryManager {
        &self.inner.retry
    }

    /// Register (or replace) a document and make it the active one.
    pub fn register_document(&self, id: impl Into<String>, dom: Arc<dyn DomAdapter>, url: Url) {
        let id = id.into();
        self.inner
            .documents
            .insert(id.clone(), DocumentContext { dom, url });
        *self.inner.last_active.lock() = Some(id);
    }

    pub fn remove_document(&self, id: &str) {
        self.inner.documents.remove(id);
        let mut last_active = self.inner.last_active.lock();
        if last_active.as_deref() == Some(id) {
            *last_active = None;
        }
    }

    /// Handle one inbound message. Always produces exactly one response;
    /// handler time is bounded by the configured message timeout.
    pub async fn handle(&self, raw: Value) -> ResponseEnvelope {
        let envelope: RequestEnvelope = match serde_json::from_value(raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                return ResponseEnvelope::failure("", format!("malformed request: {error}"));
            }
        };
        if envelope.request_id.trim().is_empty() {
            return ResponseEnvelope::failure("", "request_id is required");
        }
        let request_id = envelope.request_id.clone();

        let Some(action) = Action::parse(&envelope.action) else {
            return ResponseEnvelope::failure(
                request_id,
                format!("unknown action {:?}", envelope.action),
            );
        };

        let timeout = Duration::from_millis(self.inner.config.router.message_timeout_ms);
        match tokio::time::timeout(timeout, self.dispatch(action, envelope)).await {
            Ok(Ok(data)) => ResponseEnvelope::success(request_id, data),
            Ok(Err(error)) => ResponseEnvelope::failure(request_id, error),
            Err(_) => ResponseEnvelope::failure(request_id, "Timeout"),
        }
    }

    /// Stop everything and announce shutdown on the bus.
    pub async fn shutdown(&self, reason: ShutdownReason) {
        for stop in self.inner.pagination_stops.iter() {
            stop.value().stop();
        }
        for cancel in self.inner.scan_cancels.iter() {
            cancel.value().cancel();
        }
        self.inner.bus.shutdown_gracefully(reason).await;
    }

    async fn dispatch(&self, action: Action, envelope: RequestEnvelope) -> Result<Value, String> {
        debug!("routing {} ({})", action.as_str(), envelope.request_id);
        match action {
            Action::ScanStart => {
                let (id, ctx) = self.resolve_document(&envelope)?;
                self.inner.scan_document(&id, &ctx).await
            }
            Action::ScanStop => {
                let (id, _) = self.resolve_document(&envelope)?;
                let stopped = self
                    .inner
                    .scan_cancels
                    .get(&id)
                    .map(|cancel| {
                        cancel.cancel();
                        true
                    })
                    .unwrap_or(false);
                Ok(json!({ "stopped": stopped }))
            }
            Action::PaginationDetect => {
                let (id, ctx) = self.resolve_document(&envelope)?;
                let state_slot = self.inner.state_for(&id);
                let state = state_slot.lock().await;
                let detector = self.inner.make_detector();
                let detection = detector
                    .detect_best(&*ctx.dom, &ctx.url, &state)
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "detection": detection.as_ref().map(detection_to_json) }))
            }
            Action::PaginationNavigateNext => {
                let (id, ctx) = self.resolve_document(&envelope)?;
                self.inner.navigate_next(&id, &ctx).await
            }
            Action::PaginationStart => {
                let (id, ctx) = self.resolve_document(&envelope)?;
                let max_pages = envelope
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("max_pages"))
                    .and_then(Value::as_u64)
                    .map(|n| n as u32);
                RouterInner::start_traversal(&self.inner, id, ctx, max_pages)
            }
            Action::PaginationStop => {
                let (id, _) = self.resolve_document(&envelope)?;
                let stopped = self
                    .inner
                    .pagination_stops
                    .get(&id)
                    .map(|handle| {
                        handle.value().stop();
                        true
                    })
                    .unwrap_or(false);
                Ok(json!({ "stopped": stopped }))
            }
            Action::PaginationReset => {
                let (id, _) = self.resolve_document(&envelope)?;
                let history_cap = self.inner.config.pagination.history_cap;
                self.inner
                    .pagination_states
                    .insert(id, Arc::new(AsyncMutex::new(PaginationState::new(history_cap))));
                Ok(json!({ "reset": true }))
            }
            Action::PaginationGetState => {
                let (id, _) = self.resolve_document(&envelope)?;
                let state_slot = self.inner.state_for(&id);
                let state = state_slot.lock().await;
                let snapshot =
                    serde_json::to_value(state.snapshot()).map_err(|e| e.to_string())?;
                let learned = serde_json::to_value(self.inner.learned.snapshot())
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "state": snapshot, "learned_patterns": learned }))
            }
            Action::RetrySubmit => {
                let payload = envelope.payload.as_ref().ok_or("payload is required")?;
                let task_id = payload
                    .get("task_id")
                    .and_then(Value::as_str)
                    .ok_or("payload.task_id is required")?;
                let operation = payload
                    .get("operation")
                    .and_then(Value::as_str)
                    .ok_or("payload.operation is required")?;
                let category = payload
                    .get("category")
                    .map(|v| serde_json::from_value(v.clone()).map_err(|e| e.to_string()))
                    .transpose()?;
                self.inner
                    .retry
                    .submit_named(
                        task_id,
                        operation,
                        RetryOptions {
                            category,
                            ..RetryOptions::default()
                        },
                    )
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "queued": true, "task_id": task_id }))
            }
            Action::RetryCancel => {
                let payload = envelope.payload.as_ref().ok_or("payload is required")?;
                let task_id = payload
                    .get("task_id")
                    .and_then(Value::as_str)
                    .ok_or("payload.task_id is required")?;
                Ok(json!({ "cancelled": self.inner.retry.cancel(task_id) }))
            }
            Action::ExportData => {
                let (id, _) = self.resolve_document(&envelope)?;
                let filename = envelope
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("filename"))
                    .and_then(Value::as_str)
                    .unwrap_or("gallery-scout-export.json")
                    .to_string();
                self.inner.export_scan(&id, &filename).await
            }
        }
    }

    /// Explicit document id → last active → error.
    fn resolve_document(
        &self,
        envelope: &RequestEnvelope,
    ) -> Result<(String, DocumentContext), String> {
        let explicit = envelope.document_id.clone().or_else(|| {
            envelope
                .payload
                .as_ref()
                .and_then(|p| p.get("document_id"))
                .and_then(Value::as_str)
                .map(String::from)
        });

        let id = match explicit {
            Some(id) => id,
            None => self
                .inner
                .last_active
                .lock()
                .clone()
                .ok_or("no active document")?,
        };

        let ctx = self
            .inner
            .documents
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| format!("unknown document {id:?}"))?;
        *self.inner.last_active.lock() = Some(id.clone());
        Ok((id, ctx))
    }
}

impl RouterInner {
    fn state_for(&self, id: &str) -> Arc<AsyncMutex<PaginationState>> {
        Arc::clone(
            self.pagination_states
                .entry(id.to_string())
                .or_insert_with(|| {
                    Arc::new(AsyncMutex::new(PaginationState::new(
                        self.config.pagination.history_cap,
                    )))
                })
                .value(),
        )
    }

    fn make_detector(&self) -> PaginationDetector {
        PaginationDetector::new(
            self.urls.clone(),
            self.config.pagination.clone(),
            Arc::clone(&self.learned),
        )
    }

    fn make_engine(&self, session: &str) -> Result<PaginationEngine, String> {
        let navigator = self
            .navigator
            .as_ref()
            .ok_or("no navigator configured")?
            .clone();
        let mut engine = PaginationEngine::new(
            session,
            self.make_detector(),
            navigator,
            Arc::clone(&self.clock),
            self.config.pagination.clone(),
        )
        .with_bus(self.bus.clone())
        .with_retry(self.retry.clone());
        if let Some(persist) = &self.persist {
            engine = engine.with_persist(Arc::clone(persist));
        }
        Ok(engine)
    }

    /// Scan one document: collect, recognize, merge into the session's
    /// record set, and broadcast the lifecycle events.
    async fn scan_document(&self, id: &str, ctx: &DocumentContext) -> Result<Value, String> {
        let cancel = CancelToken::new();
        self.scan_cancels.insert(id.to_string(), cancel.clone());
        self.publish(EngineEvent::scan_started(
            id.to_string(),
            ctx.url.to_string(),
        ))
        .await;

        let collector =
            ImageCollector::new(&*ctx.dom, &self.urls, &self.config.collector, &ctx.url);
        let collected = collector.collect(Some(&cancel));
        self.scan_cancels.remove(id);

        let collected = match collected {
            Ok(collected) => collected,
            Err(error) => {
                self.publish(EngineEvent::scan_error(id.to_string(), error.to_string()))
                    .await;
                return Err(error.to_string());
            }
        };

        let recognizer =
            PatternRecognizer::new(&*ctx.dom, &self.scorer, &self.config.patterns, &ctx.url);
        let patterns = match recognizer.detect() {
            Ok(patterns) => patterns,
            Err(error) => {
                self.publish(EngineEvent::scan_error(id.to_string(), error.to_string()))
                    .await;
                return Err(error.to_string());
            }
        };

        self.publish(EngineEvent::scan_complete(id.to_string(), collected.stats))
            .await;
        self.merge_scan(id, &collected);

        let records = serde_json::to_value(&collected.records).map_err(|e| e.to_string())?;
        let patterns = serde_json::to_value(&patterns).map_err(|e| e.to_string())?;
        let stats = serde_json::to_value(collected.stats).map_err(|e| e.to_string())?;
        Ok(json!({ "records": records, "patterns": patterns, "stats": stats }))
    }

    /// Accumulate a page's records into the session set, deduplicating by
    /// canonical URL across pages.
    fn merge_scan(&self, id: &str, collected: &CollectedImages) {
        let mut entry = self.scans.entry(id.to_string()).or_default();
        let existing: std::collections::HashSet<String> = entry
            .records
            .iter()
            .map(|r| r.url.to_string())
            .collect();
        for record in &collected.records {
            if !existing.contains(&record.url.to_string()) {
                entry.records.push(record.clone());
            }
        }
        entry.stats.records = entry.records.len();
        entry.stats.duplicates += collected.stats.duplicates;
        entry.stats.element_errors += collected.stats.element_errors;
    }

    /// One engine step on behalf of PAGINATION_NAVIGATE_NEXT.
    async fn navigate_next(&self, id: &str, ctx: &DocumentContext) -> Result<Value, String> {
        let engine = self.make_engine(id)?;
        let state_slot = self.state_for(id);
        let mut state = state_slot.lock().await;

        let mut dom = Arc::clone(&ctx.dom);
        let mut url = ctx.url.clone();
        engine.prime(&mut state, &dom, &url);

        match engine.step(&mut state, &mut dom, &mut url).await {
            StepOutcome::Advanced => {
                self.documents.insert(
                    id.to_string(),
                    DocumentContext {
                        dom,
                        url: url.clone(),
                    },
                );
                Ok(json!({
                    "advanced": true,
                    "page": state.current_page(),
                    "url": url.to_string(),
                }))
            }
            StepOutcome::StrategyFailed => Ok(json!({ "advanced": false, "retryable": true })),
            StepOutcome::Terminal(reason) => {
                engine.finish(&mut state, reason).await;
                let reason = serde_json::to_value(reason).map_err(|e| e.to_string())?;
                Ok(json!({ "advanced": false, "terminal": reason }))
            }
        }
    }

    /// Spawn the scan → paginate loop for PAGINATION_START.
    fn start_traversal(
        inner: &Arc<Self>,
        id: String,
        ctx: DocumentContext,
        max_pages: Option<u32>,
    ) -> Result<Value, String> {
        if inner.pagination_stops.contains_key(&id) {
            return Err(format!("pagination already running for {id:?}"));
        }
        let engine = inner.make_engine(&id)?;
        inner
            .pagination_stops
            .insert(id.clone(), engine.stop_handle());

        let inner = Arc::clone(inner);
        let max_pages = max_pages.unwrap_or(inner.config.pagination.max_pages);
        tokio::spawn(async move {
            let state_slot = inner.state_for(&id);
            let mut dom = ctx.dom;
            let mut url = ctx.url;

            {
                let mut state = state_slot.lock().await;
                engine.prime(&mut state, &dom, &url);
            }
            if let Err(error) = inner
                .scan_document(&id, &DocumentContext { dom: Arc::clone(&dom), url: url.clone() })
                .await
            {
                warn!("[{id}] initial scan failed: {error}");
            }

            // The state lock is taken per step, not for the whole run, so
            // state queries stay answerable mid-traversal.
            let reason = loop {
                let mut state = state_slot.lock().await;
                if state.current_page() >= max_pages {
                    break TerminationReason::MaxPages;
                }
                match engine.step(&mut state, &mut dom, &mut url).await {
                    StepOutcome::Advanced => {
                        drop(state);
                        let context = DocumentContext {
                            dom: Arc::clone(&dom),
                            url: url.clone(),
                        };
                        inner.documents.insert(id.clone(), context.clone());
                        if let Err(error) = inner.scan_document(&id, &context).await {
                            warn!("[{id}] page scan failed: {error}");
                        }
                    }
                    StepOutcome::StrategyFailed => {}
                    StepOutcome::Terminal(reason) => break reason,
                }
            };
            let mut state = state_slot.lock().await;
            engine.finish(&mut state, reason).await;
            inner.pagination_stops.remove(&id);
        });

        Ok(json!({ "started": true, "max_pages": max_pages }))
    }

    async fn export_scan(&self, id: &str, filename: &str) -> Result<Value, String> {
        let export = self.export.as_ref().ok_or("no export sink configured")?;
        let collected = self
            .scans
            .get(id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let bytes =
            serde_json::to_vec_pretty(&collected).map_err(|e| e.to_string())?;
        let size = bytes.len() as u64;
        export
            .write(filename, "application/json", bytes)
            .await
            .map_err(|e| e.to_string())?;
        self.publish(EngineEvent::download_progress(
            id.to_string(),
            filename.to_string(),
            size,
            Some(size),
        ))
        .await;
        Ok(json!({
            "filename": filename,
            "records": collected.records.len(),
        }))
    }

    async fn publish(&self, event: EngineEvent) {
        if let Err(error) = self.bus.publish(event).await {
            debug!("broadcast skipped: {error}");
        }
    }
}

fn detection_to_json(detection: &PaginationDetection) -> Value {
    let (target_kind, url, element) = match &detection.target {
        PaginationTarget::Url(url) => ("url", Some(url.to_string()), None),
        PaginationTarget::ElementClick { handle, target_url } => (
            "click",
            target_url.as_ref().map(Url::to_string),
            Some(handle.raw()),
        ),
    };
    json!({
        "strategy": detection.strategy.clone(),
        "kind": detection.kind,
        "confidence": detection.confidence,
        "target": { "type": target_kind, "url": url, "element": element },
    })
}
