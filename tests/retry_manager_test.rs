//! Retry manager behavior: exhaustion, breaker transitions, cancellation,
//! pausing, and snapshot restore. A virtual clock makes backoff schedules
//! observable without waiting.

use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use gallery_scout::config::RetryConfig;
use gallery_scout::{
    BreakerState, ErrorCategory, ErrorSurface, EventBus, EventKind, ManualClock, MemoryStore,
    PersistSink, RetryManager, RetryOperation, RetryOptions, RetrySnapshot,
};

/// Fails every attempt with a network-ish error, counting invocations.
struct AlwaysFails {
    calls: AtomicU32,
}

impl RetryOperation for AlwaysFails {
    fn run(&self) -> BoxFuture<'static, Result<serde_json::Value, ErrorSurface>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(ErrorSurface::from_message("connection reset by peer")) })
    }
}

/// Succeeds on the nth call.
struct SucceedsEventually {
    calls: AtomicU32,
    succeed_on: u32,
}

impl RetryOperation for SucceedsEventually {
    fn run(&self) -> BoxFuture<'static, Result<serde_json::Value, ErrorSurface>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let succeed = call >= self.succeed_on;
        Box::pin(async move {
            if succeed {
                Ok(json!({ "ok": true }))
            } else {
                Err(ErrorSurface::from_message("request timed out"))
            }
        })
    }
}

async fn wait_for_drain(manager: &RetryManager) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while manager.queue_len() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("queue should drain");
}

fn manager_with_clock(clock: Arc<ManualClock>) -> (RetryManager, EventBus) {
    let bus = EventBus::new(256);
    let manager = RetryManager::new(RetryConfig::default(), clock).with_bus(bus.clone());
    (manager, bus)
}

#[tokio::test]
async fn exhaustion_after_max_attempts_opens_breaker() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let (manager, bus) = manager_with_clock(Arc::clone(&clock));
    let mut events = bus.subscribe();

    let operation = Arc::new(AlwaysFails {
        calls: AtomicU32::new(0),
    });
    manager.submit(
        "task-net",
        Arc::clone(&operation) as Arc<dyn RetryOperation>,
        RetryOptions {
            category: Some(ErrorCategory::Network),
            ..RetryOptions::default()
        },
    )?;
    wait_for_drain(&manager).await;

    // Network policy allows 5 attempts, all of which ran.
    assert_eq!(operation.calls.load(Ordering::SeqCst), 5);
    // 5 consecutive failures trip the Network breaker (threshold 5).
    assert_eq!(manager.breaker_state(ErrorCategory::Network), BreakerState::Open);

    let mut attempts = 0;
    let mut failures = Vec::new();
    let mut breaker_opened = 0;
    while let Ok(event) = events.try_recv() {
        match event.kind() {
            EventKind::RetryAttempt => attempts += 1,
            EventKind::RetryFailure => failures.push(event),
            EventKind::CircuitBreakerOpened => breaker_opened += 1,
            _ => {}
        }
    }
    assert_eq!(attempts, 5);
    assert_eq!(breaker_opened, 1);
    assert_eq!(failures.len(), 1, "exactly one terminal event");
    if let gallery_scout::EngineEvent::RetryFailure {
        task_id,
        attempts,
        reason,
        ..
    } = &failures[0]
    {
        assert_eq!(task_id, "task-net");
        assert_eq!(*attempts, 5);
        assert_eq!(reason, "Max retry attempts exceeded");
    } else {
        panic!("expected a RetryFailure event");
    }

    // Backoff waits: 4 of them, all within [100ms, 60s].
    let backoffs: Vec<Duration> = clock
        .recorded_sleeps()
        .into_iter()
        .filter(|d| *d >= Duration::from_millis(100))
        .collect();
    assert_eq!(backoffs.len(), 4);
    for delay in backoffs {
        assert!(delay <= Duration::from_secs(60), "{delay:?}");
    }
    Ok(())
}

#[tokio::test]
async fn success_after_failures_keeps_breaker_closed() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let (manager, _bus) = manager_with_clock(clock);

    let operation = Arc::new(SucceedsEventually {
        calls: AtomicU32::new(0),
        succeed_on: 3,
    });
    manager.submit(
        "task-flaky",
        Arc::clone(&operation) as Arc<dyn RetryOperation>,
        RetryOptions::default(),
    )?;
    wait_for_drain(&manager).await;

    assert_eq!(operation.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        manager.breaker_state(ErrorCategory::Timeout),
        BreakerState::Closed
    );
    let stats = manager.stats(ErrorCategory::Timeout);
    assert_eq!(stats.failures, 2);
    assert_eq!(stats.successes, 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_task_ids_are_rejected() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let (manager, _bus) = manager_with_clock(clock);

    let operation: Arc<dyn RetryOperation> = Arc::new(AlwaysFails {
        calls: AtomicU32::new(0),
    });
    manager.submit("dup", Arc::clone(&operation), RetryOptions::default())?;
    let second = manager.submit("dup", operation, RetryOptions::default());
    assert!(second.is_err());
    wait_for_drain(&manager).await;
    Ok(())
}

#[tokio::test]
async fn cancel_drops_pending_task() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let (manager, bus) = manager_with_clock(clock);
    let mut events = bus.subscribe();

    // Never resolves; cancellation must cut it short.
    let operation: Arc<dyn RetryOperation> =
        Arc::new(|| -> BoxFuture<'static, Result<serde_json::Value, ErrorSurface>> {
            Box::pin(futures::future::pending())
        });
    manager.submit("task-hang", operation, RetryOptions::default())?;
    tokio::task::yield_now().await;

    assert!(manager.cancel("task-hang"));
    wait_for_drain(&manager).await;
    assert!(!manager.cancel("task-hang"), "second cancel is a no-op");

    let mut saw_terminal = false;
    while let Ok(event) = events.try_recv() {
        if let gallery_scout::EngineEvent::RetryFailure { reason, .. } = &event {
            assert_eq!(reason, "cancelled");
            saw_terminal = true;
        }
    }
    assert!(saw_terminal);
    Ok(())
}

#[tokio::test]
async fn paused_category_defers_execution() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let (manager, _bus) = manager_with_clock(clock);
    manager.pause(ErrorCategory::Network);

    let operation = Arc::new(SucceedsEventually {
        calls: AtomicU32::new(0),
        succeed_on: 1,
    });
    manager.submit(
        "task-paused",
        Arc::clone(&operation) as Arc<dyn RetryOperation>,
        RetryOptions {
            category: Some(ErrorCategory::Network),
            ..RetryOptions::default()
        },
    )?;

    // Give the driver time to spin through several deferral waits.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(operation.calls.load(Ordering::SeqCst), 0);
    assert_eq!(manager.queue_len(), 1);

    manager.resume(ErrorCategory::Network);
    wait_for_drain(&manager).await;
    assert_eq!(operation.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn non_retryable_category_fails_once() -> Result<()> {
    let clock = Arc::new(ManualClock::new());
    let (manager, _bus) = manager_with_clock(clock);

    let operation = Arc::new(AlwaysFails {
        calls: AtomicU32::new(0),
    });
    manager.submit(
        "task-404",
        Arc::clone(&operation) as Arc<dyn RetryOperation>,
        RetryOptions {
            category: Some(ErrorCategory::NotFound),
            ..RetryOptions::default()
        },
    )?;
    wait_for_drain(&manager).await;
    assert_eq!(operation.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn restore_resubmits_registered_operations() -> Result<()> {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let snapshot = RetrySnapshot {
        queue: vec![gallery_scout::retry::PersistedTask {
            task_id: "restored-1".to_string(),
            operation_name: Some("refetch".to_string()),
            category: ErrorCategory::Network,
            attempt: 2,
            last_error: Some("connection reset".to_string()),
        }],
        breakers: Vec::new(),
        paused: vec![ErrorCategory::RateLimit],
        stats: Default::default(),
    };
    store
        .set("retry_state", serde_json::to_string(&snapshot)?)
        .await?;

    let clock = Arc::new(ManualClock::new());
    let manager = RetryManager::new(RetryConfig::default(), clock)
        .with_persist(Arc::clone(&store) as Arc<dyn PersistSink>);

    let operation = Arc::new(SucceedsEventually {
        calls: AtomicU32::new(0),
        succeed_on: 1,
    });
    manager
        .registry()
        .register("refetch", Arc::clone(&operation) as Arc<dyn RetryOperation>);

    let resubmitted = manager.restore().await?;
    assert_eq!(resubmitted, 1);
    assert!(manager.is_paused(ErrorCategory::RateLimit));

    wait_for_drain(&manager).await;
    assert_eq!(operation.calls.load(Ordering::SeqCst), 1);
    Ok(())
}
