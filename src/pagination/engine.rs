//! Traversal state machine.
//!
//! Drives detect → guard → navigate → wait → validate → record until a
//! terminal condition. One `Navigator` call per step, strictly serial; every
//! await is a cancellation point checked against the stop flag. [`step`]
//! performs exactly one transition so an orchestrator can interleave per-page
//! work; [`run`] loops it to a page limit.
//!
//! [`step`]: PaginationEngine::step
//! [`run`]: PaginationEngine::run

use log::{debug, info, warn};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

use super::detector::PaginationDetector;
use super::state::{PaginationState, content_hash, main_content_text};
use super::strategy::{PaginationDetection, PaginationTarget};
use crate::config::PaginationConfig;
use crate::dom::DomAdapter;
use crate::ports::{Clock, Navigator, PersistSink};
use crate::retry::{ErrorClassifier, ErrorSurface, RetryManager};
use crate::router::{EngineEvent, EventBus};

/// Why a traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    MaxPages,
    Stopped,
    NoNext,
    LoopDetected,
    DuplicatePage,
    Exhausted,
}

/// Result of one engine step.
#[derive(Debug)]
pub enum StepOutcome {
    /// Navigation succeeded; the caller's dom/url bindings were updated.
    Advanced,
    /// The chosen strategy failed and was retired for this session; the next
    /// step falls through to the next-best strategy.
    StrategyFailed,
    /// The traversal cannot continue.
    Terminal(TerminationReason),
}

/// Result of a full traversal: the reason plus where it ended up.
pub struct TraversalOutcome {
    pub reason: TerminationReason,
    pub dom: Arc<dyn DomAdapter>,
    pub url: Url,
}

/// Cooperative stop signal for a running traversal.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Poll cadence while waiting for AJAX-driven document growth.
const GROWTH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Storage key for the persisted traversal snapshot.
const PERSIST_KEY: &str = "pagination_state";

/// Drives pagination for one document session.
pub struct PaginationEngine {
    session: String,
    detector: PaginationDetector,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    config: PaginationConfig,
    bus: Option<EventBus>,
    persist: Option<Arc<dyn PersistSink>>,
    retry: Option<RetryManager>,
    stop: Arc<AtomicBool>,
}

impl PaginationEngine {
    #[must_use]
    pub fn new(
        session: impl Into<String>,
        detector: PaginationDetector,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        config: PaginationConfig,
    ) -> Self {
        Self {
            session: session.into(),
            detector,
            navigator,
            clock,
            config,
            bus: None,
            persist: None,
            retry: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn with_persist(mut self, persist: Arc<dyn PersistSink>) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Share breaker state with a retry manager so navigation failures count
    /// against the matching category.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryManager) -> Self {
        self.retry = Some(retry);
        self
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    #[must_use]
    pub fn detector(&self) -> &PaginationDetector {
        &self.detector
    }

    /// Seed the visited sets with the starting page so the traversal can
    /// never come back to it. Idempotent.
    pub fn prime(&self, state: &mut PaginationState, dom: &Arc<dyn DomAdapter>, url: &Url) {
        state.mark_visited(url);
        if self.config.hash_guard_enabled {
            state.mark_content_hash(content_hash(&main_content_text(&**dom)));
        }
    }

    /// Traverse until `max_pages` (defaulting to the configured limit) or a
    /// terminal condition, and report where the traversal ended.
    pub async fn run(
        &self,
        state: &mut PaginationState,
        dom: Arc<dyn DomAdapter>,
        start_url: Url,
        max_pages: Option<u32>,
    ) -> TraversalOutcome {
        let max_pages = max_pages.unwrap_or(self.config.max_pages);
        let mut dom = dom;
        let mut current_url = start_url;
        self.prime(state, &dom, &current_url);

        let reason = loop {
            if state.current_page() >= max_pages {
                break TerminationReason::MaxPages;
            }
            match self.step(state, &mut dom, &mut current_url).await {
                StepOutcome::Advanced | StepOutcome::StrategyFailed => {}
                StepOutcome::Terminal(reason) => break reason,
            }
        };

        self.finish(state, reason).await;
        TraversalOutcome {
            reason,
            dom,
            url: current_url,
        }
    }

    /// Perform exactly one detect → guard → navigate → validate → record
    /// transition. On `Advanced`, `dom` and `current_url` point at the new
    /// page. Terminal outcomes are NOT broadcast here; drivers call
    /// [`finish`](Self::finish) once when they stop stepping.
    pub async fn step(
        &self,
        state: &mut PaginationState,
        dom: &mut Arc<dyn DomAdapter>,
        current_url: &mut Url,
    ) -> StepOutcome {
        if self.stop.load(Ordering::SeqCst) {
            return StepOutcome::Terminal(TerminationReason::Stopped);
        }

        let detections = match self.detector.detect_all(&**dom, current_url, state) {
            Ok(detections) => detections,
            Err(error) => {
                warn!("[{}] detection aborted: {error}", self.session);
                return StepOutcome::Terminal(TerminationReason::Exhausted);
            }
        };
        let Some(best) = detections.into_iter().next() else {
            let reason = if state.failed_strategies().is_empty() {
                TerminationReason::NoNext
            } else {
                TerminationReason::Exhausted
            };
            return StepOutcome::Terminal(reason);
        };
        debug!(
            "[{}] page {} candidate: {:?} (confidence {:.2})",
            self.session,
            state.current_page(),
            best.strategy.kind(),
            best.confidence
        );

        // Loop guard: a known URL is never handed to the navigator.
        if let Some(url) = best.target.url()
            && state.is_visited(url)
        {
            info!("[{}] loop detected at {url}", self.session);
            return StepOutcome::Terminal(TerminationReason::LoopDetected);
        }

        self.inter_page_delay().await;
        if self.stop.load(Ordering::SeqCst) {
            return StepOutcome::Terminal(TerminationReason::Stopped);
        }

        match self.navigate(dom, current_url, &best).await {
            Ok((new_dom, new_url)) => {
                if self.config.hash_guard_enabled {
                    let digest = content_hash(&main_content_text(&*new_dom));
                    if !state.mark_content_hash(digest) {
                        info!("[{}] duplicate page content, stopping", self.session);
                        return StepOutcome::Terminal(TerminationReason::DuplicatePage);
                    }
                }

                if let Some(new_url) = &new_url {
                    self.detector.learned_patterns().learn(current_url, new_url);
                }
                state.record_navigation(new_url.clone(), best.strategy.kind());
                self.persist_snapshot(state).await;
                self.publish(EngineEvent::pagination_progress(
                    self.session.clone(),
                    state.current_page(),
                    new_url.as_ref().map(Url::to_string),
                    Some(best.strategy.kind()),
                    None,
                ))
                .await;
                self.publish(EngineEvent::pagination_state_update(
                    self.session.clone(),
                    state.snapshot(),
                ))
                .await;

                if let Some(new_url) = new_url {
                    *current_url = new_url;
                }
                *dom = new_dom;
                StepOutcome::Advanced
            }
            Err(error) => {
                warn!(
                    "[{}] {:?} navigation failed: {error}",
                    self.session,
                    best.strategy.kind()
                );
                if let Some(retry) = &self.retry {
                    let category =
                        ErrorClassifier.classify(&ErrorSurface::from_message(error.clone()));
                    retry.record_external_failure(category).await;
                }
                state.mark_strategy_failed(best.strategy.kind());
                self.publish(EngineEvent::pagination_progress(
                    self.session.clone(),
                    state.current_page(),
                    best.target.url().map(Url::to_string),
                    Some(best.strategy.kind()),
                    None,
                ))
                .await;
                StepOutcome::StrategyFailed
            }
        }
    }

    /// Persist and broadcast a terminal outcome. Call once per traversal.
    pub async fn finish(&self, state: &mut PaginationState, reason: TerminationReason) {
        info!(
            "[{}] pagination terminated after {} page(s): {reason:?}",
            self.session,
            state.current_page()
        );
        self.persist_snapshot(state).await;
        self.publish(EngineEvent::pagination_progress(
            self.session.clone(),
            state.current_page(),
            None,
            state.last_successful_strategy(),
            Some(reason),
        ))
        .await;
    }

    /// Perform one navigation. URL targets load a fresh document; click
    /// targets dispatch through the navigator and then wait for either a
    /// replacement document or in-place growth.
    async fn navigate(
        &self,
        dom: &Arc<dyn DomAdapter>,
        current_url: &Url,
        detection: &PaginationDetection,
    ) -> Result<(Arc<dyn DomAdapter>, Option<Url>), String> {
        match &detection.target {
            PaginationTarget::Url(url) => {
                let outcome = self
                    .navigator
                    .load(url.clone())
                    .await
                    .map_err(|e| e.to_string())?;
                let new_dom = outcome
                    .dom
                    .ok_or_else(|| "navigator returned no document".to_string())?;
                Ok((new_dom, Some(outcome.final_url.unwrap_or_else(|| url.clone()))))
            }
            PaginationTarget::ElementClick { handle, target_url } => {
                let initial_height = dom.document_height();
                let outcome = self
                    .navigator
                    .click(*handle)
                    .await
                    .map_err(|e| e.to_string())?;

                if let Some(new_dom) = outcome.dom {
                    let url = outcome.final_url.or_else(|| target_url.clone());
                    return Ok((new_dom, url));
                }

                // AJAX path: same document, watch for height growth.
                let deadline =
                    self.clock.now() + Duration::from_millis(self.config.wait_timeout_ms);
                loop {
                    self.clock.sleep(GROWTH_POLL_INTERVAL).await;
                    if dom.document_height() > initial_height {
                        let url = outcome.final_url.clone().or_else(|| target_url.clone());
                        return Ok((Arc::clone(dom), url));
                    }
                    if self.clock.now() >= deadline {
                        return Err(format!(
                            "timed out after {}ms waiting for document growth (height {} at {})",
                            self.config.wait_timeout_ms, initial_height, current_url
                        ));
                    }
                    if self.stop.load(Ordering::SeqCst) {
                        return Err("stopped while waiting for document growth".to_string());
                    }
                }
            }
        }
    }

    async fn inter_page_delay(&self) {
        let min = self.config.delay_min_ms;
        let max = self.config.delay_max_ms.max(min);
        let millis = if max > min {
            rand::rng().random_range(min..=max)
        } else {
            min
        };
        self.clock.sleep(Duration::from_millis(millis)).await;
    }

    async fn persist_snapshot(&self, state: &PaginationState) {
        let Some(persist) = &self.persist else {
            return;
        };
        let learned = self.detector.learned_patterns().snapshot();
        let payload = serde_json::to_value(state.snapshot()).and_then(|mut value| {
            value["learned_patterns"] = serde_json::to_value(learned)?;
            Ok(value)
        });
        match payload {
            Ok(value) => {
                if let Err(error) = persist.set(PERSIST_KEY, value.to_string()).await {
                    warn!(
                        "[{}] failed to persist pagination state: {error}",
                        self.session
                    );
                }
            }
            Err(error) => {
                warn!(
                    "[{}] failed to serialize pagination state: {error}",
                    self.session
                );
            }
        }
    }

    async fn publish(&self, event: EngineEvent) {
        if let Some(bus) = &self.bus
            && let Err(error) = bus.publish(event).await
        {
            debug!("[{}] event publish failed: {error}", self.session);
        }
    }
}
