//! End-to-end detection scenarios against static documents.

use anyhow::Result;
use std::sync::Arc;
use url::Url;

use gallery_scout::{
    PaginationDetector, PaginationKind, PaginationState, PaginationTarget, PatternStore,
    StaticDomAdapter, Strategy, StrategyKind, UrlCanonicalizer,
};

fn detector() -> PaginationDetector {
    PaginationDetector::new(
        UrlCanonicalizer::default(),
        gallery_scout::config::PaginationConfig::default(),
        Arc::new(PatternStore::new(7)),
    )
}

fn fresh_state() -> PaginationState {
    PaginationState::new(50)
}

#[test]
fn rel_next_beats_text_match() -> Result<()> {
    let dom = StaticDomAdapter::parse(
        r#"<html><body>
            <link rel="next" href="https://ex.com/p2">
            <a>next</a>
        </body></html>"#,
    );
    let current = Url::parse("https://ex.com/p1")?;

    let best = detector()
        .detect_best(&dom, &current, &fresh_state())?
        .expect("detection expected");
    assert_eq!(best.strategy, Strategy::RelNext);
    assert_eq!(best.kind, PaginationKind::UrlBased);
    assert!((best.confidence - 1.0).abs() < f64::EPSILON);
    assert_eq!(best.target.url().map(Url::as_str), Some("https://ex.com/p2"));
    Ok(())
}

#[test]
fn null_rel_next_is_never_selected() -> Result<()> {
    let dom =
        StaticDomAdapter::parse(r#"<html><body><a rel="next" href="/null">Next</a></body></html>"#);
    let current = Url::parse("https://ex.com/p1")?;

    let all = detector().detect_all(&dom, &current, &fresh_state())?;
    assert!(
        all.iter().all(|d| d.strategy != Strategy::RelNext),
        "the /null rel-next must not survive"
    );
    for detection in &all {
        if let Some(url) = detection.target.url() {
            assert_ne!(url.path(), "/null");
        }
    }
    Ok(())
}

#[test]
fn query_string_increment_without_links() -> Result<()> {
    let dom = StaticDomAdapter::parse("<html><body><p>gallery items</p></body></html>");
    let current = Url::parse("https://ex.com/gallery?page=3")?;

    let best = detector()
        .detect_best(&dom, &current, &fresh_state())?
        .expect("detection expected");
    assert_eq!(
        best.strategy,
        Strategy::QueryString {
            param: "page".to_string(),
            current: 3,
            next: 4
        }
    );
    assert!((best.confidence - 0.85).abs() < f64::EPSILON);
    assert_eq!(
        best.target.url().map(Url::as_str),
        Some("https://ex.com/gallery?page=4")
    );
    Ok(())
}

#[test]
fn equal_confidence_ties_break_by_priority() -> Result<()> {
    // A numbered-pagination hit (0.95, priority 6) and a query-string link
    // (0.95, priority 3) share a confidence; the query-string link must win.
    let dom = StaticDomAdapter::parse(
        r#"<html><body><nav class="pagination">
            <a href="/gallery?page=1">1</a>
            <span class="current">2</span>
            <a href="/gallery?page=3">3</a>
        </nav></body></html>"#,
    );
    let current = Url::parse("https://ex.com/gallery?page=2")?;

    let all = detector().detect_all(&dom, &current, &fresh_state())?;
    let first_95 = all
        .iter()
        .find(|d| (d.confidence - 0.95).abs() < f64::EPSILON)
        .expect("a 0.95-confidence detection expected");
    assert_eq!(first_95.strategy.kind(), StrategyKind::QueryString);
    Ok(())
}

#[test]
fn aria_label_next_is_found() -> Result<()> {
    let dom = StaticDomAdapter::parse(
        r#"<html><body>
            <button aria-label="Go to next page">›</button>
        </body></html>"#,
    );
    let current = Url::parse("https://ex.com/feed")?;

    let all = detector().detect_all(&dom, &current, &fresh_state())?;
    let aria = all
        .iter()
        .find(|d| d.strategy == Strategy::AriaLabel)
        .expect("aria detection expected");
    assert!(matches!(
        aria.target,
        PaginationTarget::ElementClick { .. }
    ));
    assert_eq!(aria.kind, PaginationKind::AjaxBased);
    Ok(())
}

#[test]
fn localized_next_labels_match() -> Result<()> {
    for (label, base) in [
        ("Siguiente", "https://ex.es/fotos"),
        ("次へ", "https://ex.jp/feed"),
        ("下一页", "https://ex.cn/feed"),
        ("Volgende", "https://ex.nl/feed"),
    ] {
        let dom = StaticDomAdapter::parse(&format!(
            r#"<html><body><a href="/andere-seite">{label}</a></body></html>"#
        ));
        let current = Url::parse(base)?;
        let all = detector().detect_all(&dom, &current, &fresh_state())?;
        assert!(
            all.iter().any(|d| d.strategy == Strategy::TextMatch),
            "{label} should be recognized as next"
        );
    }
    Ok(())
}

#[test]
fn load_more_is_infinite_scroll_kind() -> Result<()> {
    let dom = StaticDomAdapter::parse(
        r#"<html><body><button id="more">Show more</button></body></html>"#,
    );
    let current = Url::parse("https://ex.com/feed")?;

    let best = detector()
        .detect_best(&dom, &current, &fresh_state())?
        .expect("detection expected");
    assert_eq!(best.strategy, Strategy::LoadMore);
    assert_eq!(best.kind, PaginationKind::InfiniteScroll);
    assert!((best.confidence - 0.70).abs() < f64::EPSILON);
    Ok(())
}

#[test]
fn learned_pattern_outranks_fresh_detection_paths() -> Result<()> {
    let store = Arc::new(PatternStore::new(7));
    let before = Url::parse("https://ex.com/gallery?page=1")?;
    let after = Url::parse("https://ex.com/gallery?page=2")?;
    store.learn(&before, &after);

    let detector = PaginationDetector::new(
        UrlCanonicalizer::default(),
        gallery_scout::config::PaginationConfig::default(),
        store,
    );
    let dom = StaticDomAdapter::parse("<html><body></body></html>");
    let all = detector.detect_all(&dom, &after, &fresh_state())?;

    let learned = all
        .iter()
        .find(|d| d.strategy == Strategy::LearnedPattern)
        .expect("learned detection expected");
    assert_eq!(
        learned.target.url().map(Url::as_str),
        Some("https://ex.com/gallery?page=3")
    );
    // Learned sits below rel-next (absent here) but above the 0.85
    // incremental fallback.
    assert!(learned.confidence > 0.9);
    Ok(())
}
