//! Control-surface routing: envelope validation, scan flow, state queries,
//! retry actions, and export.

use anyhow::Result;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use url::Url;

use gallery_scout::config::ScanConfigBuilder;
use gallery_scout::ports::{Clock, ExportSink};
use gallery_scout::{
    ErrorSurface, EventBus, EventFilter, EventKind, ManualClock, MemoryStore, PersistSink,
    RetryManager, RetryOperation, Router, StaticDomAdapter,
};

#[derive(Default)]
struct CaptureExport {
    writes: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl ExportSink for CaptureExport {
    fn write(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'_, anyhow::Result<()>> {
        self.writes
            .lock()
            .push((filename.to_string(), mime.to_string(), bytes));
        Box::pin(async { Ok(()) })
    }
}

const GALLERY_PAGE: &str = r#"<html><body>
    <div class="photo-gallery">
        <img src="/a.jpg" width="200" height="200">
        <img src="/b.jpg" width="200" height="200">
        <img src="/c.jpg" width="200" height="200">
    </div>
    <a rel="next" href="/gallery?page=2">next</a>
</body></html>"#;

fn build_router() -> (Router, Arc<CaptureExport>) {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    let bus = EventBus::new(256);
    let retry = RetryManager::new(Default::default(), Arc::clone(&clock));
    let export = Arc::new(CaptureExport::default());
    let store: Arc<dyn PersistSink> = Arc::new(MemoryStore::new());
    let config = ScanConfigBuilder::new().build().expect("default config builds");
    let router = Router::with_clock(config, retry, bus, clock)
        .with_export(Arc::clone(&export) as Arc<dyn ExportSink>)
        .with_persist(store);
    router.register_document(
        "tab-1",
        Arc::new(StaticDomAdapter::parse(GALLERY_PAGE)),
        Url::parse("https://example.com/gallery?page=1").expect("valid url"),
    );
    (router, export)
}

#[tokio::test]
async fn scan_start_returns_records_and_broadcasts() -> Result<()> {
    let (router, _export) = build_router();
    let mut events = router.bus().subscribe_channel(
        "test",
        EventFilter::from_names(["SCAN_STARTED", "SCAN_COMPLETE"]),
    );

    let response = router
        .handle(json!({ "action": "SCAN_START", "request_id": "r1" }))
        .await;
    assert!(response.ok, "{:?}", response.error);
    let data = response.data.expect("scan data");
    let records = data["records"].as_array().expect("records array");
    assert_eq!(records.len(), 3);
    assert!(!data["patterns"].as_array().expect("patterns").is_empty());

    let started = events.recv().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(started.kind(), EventKind::ScanStarted);
    let complete = events.recv().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(complete.kind(), EventKind::ScanComplete);
    Ok(())
}

#[tokio::test]
async fn malformed_envelopes_are_rejected() -> Result<()> {
    let (router, _export) = build_router();

    let no_request_id = router
        .handle(json!({ "action": "SCAN_START", "request_id": "" }))
        .await;
    assert!(!no_request_id.ok);

    let unknown_action = router
        .handle(json!({ "action": "MAKE_COFFEE", "request_id": "r2" }))
        .await;
    assert!(!unknown_action.ok);
    assert!(
        unknown_action
            .error
            .as_deref()
            .is_some_and(|e| e.contains("MAKE_COFFEE"))
    );

    let not_an_envelope = router.handle(json!({ "nope": true })).await;
    assert!(!not_an_envelope.ok);
    Ok(())
}

#[tokio::test]
async fn unknown_document_fails_but_default_resolves() -> Result<()> {
    let (router, _export) = build_router();

    let missing = router
        .handle(json!({
            "action": "SCAN_START",
            "request_id": "r3",
            "document_id": "tab-404"
        }))
        .await;
    assert!(!missing.ok);

    // No document_id falls back to the last active document.
    let implicit = router
        .handle(json!({ "action": "SCAN_START", "request_id": "r4" }))
        .await;
    assert!(implicit.ok);
    Ok(())
}

#[tokio::test]
async fn pagination_detect_and_state_roundtrip() -> Result<()> {
    let (router, _export) = build_router();

    let detect = router
        .handle(json!({ "action": "PAGINATION_DETECT", "request_id": "r5" }))
        .await;
    assert!(detect.ok, "{:?}", detect.error);
    let detection = &detect.data.expect("data")["detection"];
    assert_eq!(detection["strategy"], json!("RelNext"));
    assert_eq!(
        detection["target"]["url"],
        json!("https://example.com/gallery?page=2")
    );

    let state = router
        .handle(json!({ "action": "PAGINATION_GET_STATE", "request_id": "r6" }))
        .await;
    assert!(state.ok);
    let data = state.data.expect("state data");
    assert_eq!(data["state"]["current_page"], json!(1));

    let reset = router
        .handle(json!({ "action": "PAGINATION_RESET", "request_id": "r7" }))
        .await;
    assert!(reset.ok);
    Ok(())
}

#[tokio::test]
async fn export_writes_through_the_sink() -> Result<()> {
    let (router, export) = build_router();

    router
        .handle(json!({ "action": "SCAN_START", "request_id": "r8" }))
        .await;
    let response = router
        .handle(json!({
            "action": "EXPORT_DATA",
            "request_id": "r9",
            "payload": { "filename": "batch.json" }
        }))
        .await;
    assert!(response.ok, "{:?}", response.error);

    let writes = export.writes.lock();
    assert_eq!(writes.len(), 1);
    let (filename, mime, bytes) = &writes[0];
    assert_eq!(filename, "batch.json");
    assert_eq!(mime, "application/json");
    let parsed: serde_json::Value = serde_json::from_slice(bytes)?;
    assert_eq!(parsed["records"].as_array().expect("records").len(), 3);
    Ok(())
}

#[tokio::test]
async fn retry_submit_uses_the_registry() -> Result<()> {
    let (router, _export) = build_router();

    let missing = router
        .handle(json!({
            "action": "RETRY_SUBMIT",
            "request_id": "r10",
            "payload": { "task_id": "t1", "operation": "unregistered" }
        }))
        .await;
    assert!(!missing.ok);

    let operation: Arc<dyn RetryOperation> =
        Arc::new(|| -> BoxFuture<'static, Result<serde_json::Value, ErrorSurface>> {
            Box::pin(async { Ok(json!({ "done": true })) })
        });
    router.retry().registry().register("refetch-page", operation);

    let queued = router
        .handle(json!({
            "action": "RETRY_SUBMIT",
            "request_id": "r11",
            "payload": { "task_id": "t2", "operation": "refetch-page" }
        }))
        .await;
    assert!(queued.ok, "{:?}", queued.error);

    let cancelled = router
        .handle(json!({
            "action": "RETRY_CANCEL",
            "request_id": "r12",
            "payload": { "task_id": "t-unknown" }
        }))
        .await;
    assert!(cancelled.ok);
    assert_eq!(cancelled.data.expect("data")["cancelled"], json!(false));
    Ok(())
}
