//! Retry queue with per-category backoff, circuit breaking, and persistence.
//!
//! Each submitted task gets its own driver: attempts are strictly serial per
//! task, concurrency across tasks is capped by a semaphore, and every wait is
//! a scheduled wake-up that a `cancel` can cut short. Queue, breaker, and
//! pause state snapshot to the `PersistSink` on every mutation (coalesced);
//! live operations are not serializable, so restarts re-attach them through
//! the [`OperationRegistry`].

use dashmap::{DashMap, DashSet};
use futures::future::BoxFuture;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use super::breaker::{BreakerBank, BreakerConfig, BreakerSnapshot, BreakerState, BreakerTransition};
use super::classifier::{ErrorClassifier, ErrorSurface};
use super::policy::{ErrorCategory, RetryPolicy};
use crate::config::RetryConfig;
use crate::ports::{CancelToken, Clock, PersistSink};
use crate::router::{EngineEvent, EventBus};

/// Storage key for the persisted retry snapshot.
const PERSIST_KEY: &str = "retry_state";

/// Debounce window for snapshot writes.
const PERSIST_COALESCE: Duration = Duration::from_millis(50);

/// A re-runnable unit of work. Implementations must be re-entrant values;
/// every attempt calls `run` afresh.
pub trait RetryOperation: Send + Sync {
    fn run(&self) -> BoxFuture<'static, Result<serde_json::Value, ErrorSurface>>;
}

impl<F> RetryOperation for F
where
    F: Fn() -> BoxFuture<'static, Result<serde_json::Value, ErrorSurface>> + Send + Sync,
{
    fn run(&self) -> BoxFuture<'static, Result<serde_json::Value, ErrorSurface>> {
        (self)()
    }
}

/// Named operations that survive restarts.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    inner: Arc<DashMap<String, Arc<dyn RetryOperation>>>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, operation: Arc<dyn RetryOperation>) {
        self.inner.insert(name.into(), operation);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn RetryOperation>> {
        self.inner.get(name).map(|entry| Arc::clone(entry.value()))
    }
}

/// Per-submission knobs.
#[derive(Default, Clone)]
pub struct RetryOptions {
    /// Fixed category; otherwise each failure is classified from its surface.
    pub category: Option<ErrorCategory>,
    /// Policy override; otherwise the category table (with config overrides)
    /// applies.
    pub policy: Option<RetryPolicy>,
    /// Registry name for re-registration after restart.
    pub operation_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("task {0:?} is already queued")]
    DuplicateTask(String),
    #[error("retry queue is full ({0} tasks)")]
    QueueFull(usize),
    #[error("no operation registered under {0:?}")]
    UnknownOperation(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTask {
    pub task_id: String,
    pub operation_name: Option<String>,
    pub category: ErrorCategory,
    pub attempt: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrySnapshot {
    pub queue: Vec<PersistedTask>,
    pub breakers: Vec<BreakerSnapshot>,
    pub paused: Vec<ErrorCategory>,
    pub stats: HashMap<String, CategoryStats>,
}

#[derive(Clone)]
struct TaskEntry {
    category: ErrorCategory,
    attempt: u32,
    last_error: Option<String>,
    operation_name: Option<String>,
    cancel: CancelToken,
}

struct Inner {
    config: RetryConfig,
    tasks: DashMap<String, TaskEntry>,
    breakers: BreakerBank,
    classifier: ErrorClassifier,
    registry: OperationRegistry,
    paused: DashSet<ErrorCategory>,
    semaphore: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
    bus: Option<EventBus>,
    persist: Option<Arc<dyn PersistSink>>,
    stats: DashMap<ErrorCategory, CategoryStats>,
    save_pending: AtomicBool,
}

/// Process-lifetime retry coordinator.
#[derive(Clone)]
pub struct RetryManager {
    inner: Arc<Inner>,
}

impl RetryManager {
    #[must_use]
    pub fn new(config: RetryConfig, clock: Arc<dyn Clock>) -> Self {
        let breaker_config = BreakerConfig {
            threshold: config.breaker_threshold,
            cooldown: Duration::from_secs(config.breaker_cooldown_secs),
            reset_timeout: Duration::from_secs(config.breaker_reset_secs),
        };
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_retries.max(1)));
        Self {
            inner: Arc::new(Inner {
                breakers: BreakerBank::new(breaker_config, Arc::clone(&clock)),
                classifier: ErrorClassifier,
                registry: OperationRegistry::new(),
                tasks: DashMap::new(),
                paused: DashSet::new(),
                semaphore,
                clock,
                bus: None,
                persist: None,
                stats: DashMap::new(),
                save_pending: AtomicBool::new(false),
                config,
            }),
        }
    }

    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("BUG: with_bus called after the manager was shared");
        inner.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn with_persist(mut self, persist: Arc<dyn PersistSink>) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("BUG: with_persist called after the manager was shared");
        inner.persist = Some(persist);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &OperationRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.tasks.len()
    }

    #[must_use]
    pub fn breaker_state(&self, category: ErrorCategory) -> BreakerState {
        self.inner.breakers.state(category)
    }

    #[must_use]
    pub fn is_paused(&self, category: ErrorCategory) -> bool {
        self.inner.paused.contains(&category)
    }

    #[must_use]
    pub fn stats(&self, category: ErrorCategory) -> CategoryStats {
        self.inner
            .stats
            .get(&category)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Queue a task. Rejected when the id is taken or the queue is full.
    pub fn submit(
        &self,
        task_id: impl Into<String>,
        operation: Arc<dyn RetryOperation>,
        options: RetryOptions,
    ) -> Result<(), RetryError> {
        self.submit_with_attempt(task_id.into(), operation, options, 0)
    }

    /// Queue a task by registry name.
    pub fn submit_named(
        &self,
        task_id: impl Into<String>,
        operation_name: &str,
        mut options: RetryOptions,
    ) -> Result<(), RetryError> {
        let operation = self
            .inner
            .registry
            .get(operation_name)
            .ok_or_else(|| RetryError::UnknownOperation(operation_name.to_string()))?;
        options.operation_name = Some(operation_name.to_string());
        self.submit(task_id, operation, options)
    }

    fn submit_with_attempt(
        &self,
        task_id: String,
        operation: Arc<dyn RetryOperation>,
        options: RetryOptions,
        starting_attempt: u32,
    ) -> Result<(), RetryError> {
        if self.inner.tasks.contains_key(&task_id) {
            return Err(RetryError::DuplicateTask(task_id));
        }
        if self.inner.tasks.len() >= self.inner.config.max_queue {
            return Err(RetryError::QueueFull(self.inner.tasks.len()));
        }

        let cancel = CancelToken::new();
        self.inner.tasks.insert(
            task_id.clone(),
            TaskEntry {
                category: options.category.unwrap_or(ErrorCategory::Default),
                attempt: starting_attempt,
                last_error: None,
                operation_name: options.operation_name.clone(),
                cancel: cancel.clone(),
            },
        );
        Inner::persist_soon(&self.inner);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            Inner::drive(inner, task_id, operation, options, cancel, starting_attempt).await;
        });
        Ok(())
    }

    /// Cancel a queued task. Idempotent: returns false when the id is not
    /// queued (already terminal or never submitted).
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.inner.tasks.get(task_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn pause(&self, category: ErrorCategory) {
        info!("retry category {} paused", category.as_str());
        self.inner.paused.insert(category);
        Inner::persist_soon(&self.inner);
    }

    pub fn resume(&self, category: ErrorCategory) {
        info!("retry category {} resumed", category.as_str());
        self.inner.paused.remove(&category);
        Inner::persist_soon(&self.inner);
    }

    pub fn pause_all(&self) {
        for category in ErrorCategory::ALL {
            self.inner.paused.insert(category);
        }
        Inner::persist_soon(&self.inner);
    }

    pub fn resume_all(&self) {
        self.inner.paused.clear();
        Inner::persist_soon(&self.inner);
    }

    #[must_use]
    pub fn snapshot(&self) -> RetrySnapshot {
        self.inner.build_snapshot()
    }

    /// Record a failure observed outside the retry queue (a navigation
    /// timeout, a fetch error handled elsewhere) against the category's
    /// breaker and stats.
    pub async fn record_external_failure(&self, category: ErrorCategory) {
        if let Some(BreakerTransition::Opened {
            category,
            consecutive_failures,
        }) = self.inner.breakers.record_failure(category)
        {
            self.inner
                .emit(EngineEvent::circuit_breaker_opened(
                    category,
                    consecutive_failures,
                ))
                .await;
        }
        self.inner.bump_stats(category, |s| s.failures += 1);
        Inner::persist_soon(&self.inner);
    }

    /// Counterpart of [`record_external_failure`](Self::record_external_failure).
    pub async fn record_external_success(&self, category: ErrorCategory) {
        if let Some(BreakerTransition::Reset { category }) =
            self.inner.breakers.record_success(category)
        {
            self.inner
                .emit(EngineEvent::circuit_breaker_reset(category))
                .await;
        }
        self.inner.bump_stats(category, |s| s.successes += 1);
        Inner::persist_soon(&self.inner);
    }

    /// Restore queue, breaker, pause, and stats state from the persist sink.
    /// Tasks whose operation is registered are resubmitted with their attempt
    /// counters; the rest are dropped with a warning. Returns how many tasks
    /// were resubmitted.
    pub async fn restore(&self) -> anyhow::Result<usize> {
        let Some(persist) = &self.inner.persist else {
            return Ok(0);
        };
        let Some(raw) = persist.get(PERSIST_KEY).await? else {
            return Ok(0);
        };
        let snapshot: RetrySnapshot = serde_json::from_str(&raw)?;

        self.inner.breakers.restore(snapshot.breakers);
        for category in snapshot.paused {
            self.inner.paused.insert(category);
        }
        for (name, stats) in snapshot.stats {
            if let Some(category) = ErrorCategory::ALL.iter().find(|c| c.as_str() == name) {
                self.inner.stats.insert(*category, stats);
            }
        }

        let mut resubmitted = 0usize;
        for task in snapshot.queue {
            let Some(name) = &task.operation_name else {
                warn!("dropping persisted task {:?}: no operation name", task.task_id);
                continue;
            };
            let Some(operation) = self.inner.registry.get(name) else {
                warn!(
                    "dropping persisted task {:?}: operation {name:?} not re-registered",
                    task.task_id
                );
                continue;
            };
            let options = RetryOptions {
                category: Some(task.category),
                policy: None,
                operation_name: Some(name.clone()),
            };
            if let Err(error) =
                self.submit_with_attempt(task.task_id.clone(), operation, options, task.attempt)
            {
                warn!("failed to resubmit {:?}: {error}", task.task_id);
            } else {
                resubmitted += 1;
            }
        }
        info!("restored retry state: {resubmitted} task(s) resubmitted");
        Ok(resubmitted)
    }
}

impl Inner {
    async fn drive(
        inner: Arc<Self>,
        task_id: String,
        operation: Arc<dyn RetryOperation>,
        options: RetryOptions,
        cancel: CancelToken,
        starting_attempt: u32,
    ) {
        let mut attempt = starting_attempt;
        let mut category = options.category.unwrap_or(ErrorCategory::Default);
        let mut pending_delay_ms: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                Inner::finish_cancelled(&inner, &task_id, attempt).await;
                return;
            }

            // Paused categories and open breakers defer the task by one
            // cooldown rather than executing it. Paused never auto-resumes;
            // the loop just keeps waiting.
            while inner.paused.contains(&category) || !inner.breakers.should_attempt(category) {
                tokio::select! {
                    () = inner.clock.sleep(inner.breakers.cooldown()) => {}
                    () = cancel.cancelled() => {}
                }
                if cancel.is_cancelled() {
                    Inner::finish_cancelled(&inner, &task_id, attempt).await;
                    return;
                }
            }

            let Ok(permit) = Arc::clone(&inner.semaphore).acquire_owned().await else {
                return;
            };

            attempt += 1;
            inner.update_task(&task_id, |entry| entry.attempt = attempt);
            inner
                .emit(EngineEvent::retry_attempt(
                    task_id.clone(),
                    attempt,
                    category,
                    pending_delay_ms,
                ))
                .await;
            Self::persist_soon(&inner);

            let result = tokio::select! {
                result = operation.run() => result,
                () = cancel.cancelled() => {
                    drop(permit);
                    Inner::finish_cancelled(&inner, &task_id, attempt).await;
                    return;
                }
            };
            drop(permit);
            inner.bump_stats(category, |s| s.attempts += 1);

            match result {
                Ok(_) => {
                    if let Some(BreakerTransition::Reset { category }) =
                        inner.breakers.record_success(category)
                    {
                        inner
                            .emit(EngineEvent::circuit_breaker_reset(category))
                            .await;
                    }
                    inner.bump_stats(category, |s| s.successes += 1);
                    inner.tasks.remove(&task_id);
                    Self::persist_soon(&inner);
                    debug!("task {task_id:?} succeeded on attempt {attempt}");
                    return;
                }
                Err(surface) => {
                    category = options
                        .category
                        .unwrap_or_else(|| inner.classifier.classify(&surface));
                    let message = surface.to_string();
                    inner.update_task(&task_id, |entry| {
                        entry.category = category;
                        entry.last_error = Some(message.clone());
                    });
                    if let Some(BreakerTransition::Opened {
                        category,
                        consecutive_failures,
                    }) = inner.breakers.record_failure(category)
                    {
                        inner
                            .emit(EngineEvent::circuit_breaker_opened(
                                category,
                                consecutive_failures,
                            ))
                            .await;
                    }
                    inner.bump_stats(category, |s| s.failures += 1);

                    let policy = inner.policy_for(category, &options);
                    if !policy.retryable || attempt >= policy.max_attempts {
                        let reason = if policy.retryable {
                            "Max retry attempts exceeded".to_string()
                        } else {
                            format!("{} errors are not retryable", category.as_str())
                        };
                        // Terminal tasks leave the queue before anyone hears
                        // about them.
                        inner.tasks.remove(&task_id);
                        inner
                            .emit(EngineEvent::retry_failure(task_id.clone(), attempt, reason))
                            .await;
                        Self::persist_soon(&inner);
                        return;
                    }

                    let delay = policy.delay_for_attempt(attempt);
                    pending_delay_ms = delay.as_millis() as u64;
                    debug!(
                        "task {task_id:?} attempt {attempt} failed ({message}); retrying in {delay:?}"
                    );
                    Self::persist_soon(&inner);
                    tokio::select! {
                        () = inner.clock.sleep(delay) => {}
                        () = cancel.cancelled() => {}
                    }
                }
            }
        }
    }

    async fn finish_cancelled(inner: &Arc<Self>, task_id: &str, attempts: u32) {
        inner.tasks.remove(task_id);
        inner
            .emit(EngineEvent::retry_failure(
                task_id.to_string(),
                attempts,
                "cancelled".to_string(),
            ))
            .await;
        Self::persist_soon(inner);
        debug!("task {task_id:?} cancelled after {attempts} attempt(s)");
    }

    fn update_task(&self, task_id: &str, update: impl FnOnce(&mut TaskEntry)) {
        if let Some(mut entry) = self.tasks.get_mut(task_id) {
            update(&mut entry);
        }
    }

    fn bump_stats(&self, category: ErrorCategory, update: impl FnOnce(&mut CategoryStats)) {
        let mut entry = self.stats.entry(category).or_default();
        update(&mut entry);
    }

    fn policy_for(&self, category: ErrorCategory, options: &RetryOptions) -> RetryPolicy {
        options
            .policy
            .clone()
            .or_else(|| self.config.policy_overrides.get(&category).cloned())
            .unwrap_or_else(|| RetryPolicy::for_category(category))
    }

    fn build_snapshot(&self) -> RetrySnapshot {
        let mut queue: Vec<PersistedTask> = self
            .tasks
            .iter()
            .map(|entry| PersistedTask {
                task_id: entry.key().clone(),
                operation_name: entry.value().operation_name.clone(),
                category: entry.value().category,
                attempt: entry.value().attempt,
                last_error: entry.value().last_error.clone(),
            })
            .collect();
        queue.sort_by(|a, b| a.task_id.cmp(&b.task_id));

        RetrySnapshot {
            queue,
            breakers: self.breakers.snapshot(),
            paused: self.paused.iter().map(|c| *c).collect(),
            stats: self
                .stats
                .iter()
                .map(|entry| (entry.key().as_str().to_string(), entry.value().clone()))
                .collect(),
        }
    }

    fn persist_soon(inner: &Arc<Self>) {
        if inner.persist.is_none() {
            return;
        }
        if inner.save_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            inner.clock.sleep(PERSIST_COALESCE).await;
            inner.save_pending.store(false, Ordering::SeqCst);
            inner.persist_now().await;
        });
    }

    async fn persist_now(&self) {
        let Some(persist) = &self.persist else {
            return;
        };
        match serde_json::to_string(&self.build_snapshot()) {
            Ok(json) => {
                if let Err(error) = persist.set(PERSIST_KEY, json).await {
                    warn!("failed to persist retry state: {error}");
                }
            }
            Err(error) => warn!("failed to serialize retry state: {error}"),
        }
    }

    async fn emit(&self, event: EngineEvent) {
        if let Some(bus) = &self.bus
            && let Err(error) = bus.publish(event).await
        {
            debug!("retry event publish failed: {error}");
        }
    }
}
