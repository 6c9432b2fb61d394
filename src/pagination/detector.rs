//! Multi-strategy next-page detection.
//!
//! Each strategy inspects the document (or the current URL) independently and
//! yields at most one candidate. Candidates rejected by the bad-target guard
//! die at construction; survivors are sorted by confidence, with the table
//! priority breaking ties. Strategies that failed earlier in the session are
//! skipped entirely.

use std::sync::Arc;
use url::Url;

use super::learning::PatternStore;
use super::state::PaginationState;
use super::strategy::{
    PaginationDetection, PaginationKind, PaginationTarget, Strategy, StrategyKind,
};
use super::text_patterns::{
    PAGE_PARAMS, apply_path_template, is_load_more_text, is_next_aria_label, is_next_class_or_id,
    is_next_text, match_path_pattern,
};
use crate::config::PaginationConfig;
use crate::dom::{DomAdapter, DomError, ElementHandle};
use crate::urlnorm::UrlCanonicalizer;

/// Selector for the containers that usually hold page links.
const PAGINATION_CONTAINERS: &str =
    ".pagination, .pager, .page-numbers, [class*='pagination'], [class*='pager'], nav[aria-label*='pag']";

const CONF_LEARNED: f64 = 0.93;
const CONF_REL_NEXT: f64 = 1.00;
const CONF_QUERY_LINK: f64 = 0.95;
const CONF_PATH_LINK: f64 = 0.92;
const CONF_PATH_INCREMENT: f64 = 0.90;
const CONF_NUMBERED: f64 = 0.95;
const CONF_ARIA: f64 = 0.85;
const CONF_TEXT: f64 = 0.90;
const CONF_CLASS_ID: f64 = 0.80;
const CONF_QUERY_INCREMENT: f64 = 0.85;
const CONF_SHADOW_REL: f64 = 0.90;
const CONF_SHADOW_TEXT: f64 = 0.88;
const CONF_LOAD_MORE: f64 = 0.70;

/// Runs the strategy table against one document.
pub struct PaginationDetector {
    urls: UrlCanonicalizer,
    config: PaginationConfig,
    learned: Arc<PatternStore>,
}

struct DetectContext<'a> {
    dom: &'a dyn DomAdapter,
    current_url: &'a Url,
    /// Best guess at the current page number: URL query param, then URL path,
    /// then the engine's own counter.
    page_number: u32,
}

impl PaginationDetector {
    #[must_use]
    pub fn new(urls: UrlCanonicalizer, config: PaginationConfig, learned: Arc<PatternStore>) -> Self {
        Self {
            urls,
            config,
            learned,
        }
    }

    #[must_use]
    pub fn learned_patterns(&self) -> &Arc<PatternStore> {
        &self.learned
    }

    /// Run every non-failed strategy and return candidates sorted best-first.
    pub fn detect_all(
        &self,
        dom: &dyn DomAdapter,
        current_url: &Url,
        state: &PaginationState,
    ) -> Result<Vec<PaginationDetection>, DomError> {
        let ctx = DetectContext {
            dom,
            current_url,
            page_number: derive_page_number(current_url, state.current_page()),
        };
        let failed = state.failed_strategies();
        let mut out: Vec<PaginationDetection> = Vec::new();

        if !failed.contains(&StrategyKind::LearnedPattern) {
            out.extend(self.learned_pattern(&ctx));
        }
        if !failed.contains(&StrategyKind::RelNext)
            && let Some(d) = self.rel_next(&ctx)?
        {
            out.push(d);
        }
        if !failed.contains(&StrategyKind::QueryString) {
            if let Some(d) = self.query_string_link(&ctx)? {
                out.push(d);
            }
            out.extend(self.query_string_incremental(&ctx));
        }
        if !failed.contains(&StrategyKind::PathBased) {
            if let Some(d) = self.path_based_link(&ctx)? {
                out.push(d);
            }
            out.extend(self.path_based_incremental(&ctx));
        }
        if !failed.contains(&StrategyKind::NumberedList)
            && let Some(d) = self.numbered_pagination(&ctx)?
        {
            out.push(d);
        }
        if !failed.contains(&StrategyKind::AriaLabel)
            && let Some(d) = self.aria_label(&ctx)?
        {
            out.push(d);
        }
        if !failed.contains(&StrategyKind::TextMatch)
            && let Some(d) = self.text_content(&ctx)?
        {
            out.push(d);
        }
        if !failed.contains(&StrategyKind::ClassId)
            && let Some(d) = self.class_id(&ctx)?
        {
            out.push(d);
        }
        if !failed.contains(&StrategyKind::ShadowDom)
            && let Some(d) = self.shadow_dom(&ctx)?
        {
            out.push(d);
        }
        if !failed.contains(&StrategyKind::LoadMore)
            && let Some(d) = self.load_more(&ctx)?
        {
            out.push(d);
        }

        out.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.priority.cmp(&b.priority))
        });
        Ok(out)
    }

    /// The single best candidate, if any.
    pub fn detect_best(
        &self,
        dom: &dyn DomAdapter,
        current_url: &Url,
        state: &PaginationState,
    ) -> Result<Option<PaginationDetection>, DomError> {
        Ok(self.detect_all(dom, current_url, state)?.into_iter().next())
    }

    fn learned_pattern(&self, ctx: &DetectContext<'_>) -> Option<PaginationDetection> {
        let next = self.learned.apply(ctx.current_url)?;
        PaginationDetection::new(
            Strategy::LearnedPattern,
            PaginationTarget::Url(next),
            PaginationKind::UrlBased,
            CONF_LEARNED,
            1,
            &self.urls,
        )
    }

    fn rel_next(
        &self,
        ctx: &DetectContext<'_>,
    ) -> Result<Option<PaginationDetection>, DomError> {
        for handle in ctx.dom.query_all("link[rel='next'], a[rel='next']")? {
            let Some(raw) = ctx.dom.attribute(handle, "href") else {
                continue;
            };
            if self.urls.is_bad_pagination_target(&raw) {
                continue;
            }
            let Some(url) = self.urls.canonicalize(&raw, ctx.current_url) else {
                continue;
            };
            if let Some(detection) = PaginationDetection::new(
                Strategy::RelNext,
                PaginationTarget::Url(url),
                PaginationKind::UrlBased,
                CONF_REL_NEXT,
                2,
                &self.urls,
            ) {
                return Ok(Some(detection));
            }
        }
        Ok(None)
    }

    fn query_string_link(
        &self,
        ctx: &DetectContext<'_>,
    ) -> Result<Option<PaginationDetection>, DomError> {
        let next_number = ctx.page_number + 1;
        for container in ctx.dom.query_all(PAGINATION_CONTAINERS)? {
            for handle in ctx.dom.descendants(container) {
                if ctx.dom.tag_name(handle).as_deref() != Some("a") {
                    continue;
                }
                let Some(raw) = ctx.dom.attribute(handle, "href") else {
                    continue;
                };
                if !self.element_usable(ctx.dom, handle) {
                    continue;
                }
                let Some(url) = self.urls.canonicalize(&raw, ctx.current_url) else {
                    continue;
                };
                let hit = url.query_pairs().find(|(k, v)| {
                    PAGE_PARAMS.contains(&k.as_ref()) && v.parse::<u32>() == Ok(next_number)
                });
                if let Some((param, _)) = hit
                    && let Some(detection) = PaginationDetection::new(
                        Strategy::QueryString {
                            param: param.into_owned(),
                            current: ctx.page_number,
                            next: next_number,
                        },
                        PaginationTarget::Url(url),
                        PaginationKind::UrlBased,
                        CONF_QUERY_LINK,
                        3,
                        &self.urls,
                    )
                {
                    return Ok(Some(detection));
                }
            }
        }
        Ok(None)
    }

    fn path_based_link(
        &self,
        ctx: &DetectContext<'_>,
    ) -> Result<Option<PaginationDetection>, DomError> {
        let next_number = ctx.page_number + 1;
        for handle in ctx.dom.query_all("a[href]")? {
            let Some(raw) = ctx.dom.attribute(handle, "href") else {
                continue;
            };
            if !self.element_usable(ctx.dom, handle) {
                continue;
            }
            let Some(url) = self.urls.canonicalize(&raw, ctx.current_url) else {
                continue;
            };
            if !self.urls.same_origin(&url, ctx.current_url) {
                continue;
            }
            let Some(matched) = match_path_pattern(url.path()) else {
                continue;
            };
            if matched.number != next_number {
                continue;
            }
            if let Some(detection) = PaginationDetection::new(
                Strategy::PathBased {
                    pattern: matched.template,
                    current: ctx.page_number,
                    next: next_number,
                },
                PaginationTarget::Url(url),
                PaginationKind::UrlBased,
                CONF_PATH_LINK,
                4,
                &self.urls,
            ) {
                return Ok(Some(detection));
            }
        }
        Ok(None)
    }

    fn path_based_incremental(&self, ctx: &DetectContext<'_>) -> Option<PaginationDetection> {
        let matched = match_path_pattern(ctx.current_url.path())?;
        let mut next = ctx.current_url.clone();
        next.set_path(&apply_path_template(&matched.template, matched.number + 1));
        PaginationDetection::new(
            Strategy::PathBased {
                pattern: matched.template,
                current: matched.number,
                next: matched.number + 1,
            },
            PaginationTarget::Url(next),
            PaginationKind::UrlBased,
            CONF_PATH_INCREMENT,
            5,
            &self.urls,
        )
    }

    fn numbered_pagination(
        &self,
        ctx: &DetectContext<'_>,
    ) -> Result<Option<PaginationDetection>, DomError> {
        for container in ctx.dom.query_all(PAGINATION_CONTAINERS)? {
            let members = ctx.dom.descendants(container);
            let marker = members.iter().position(|h| is_current_marker(ctx.dom, *h));
            let Some(marker) = marker else {
                continue;
            };
            // Anchors inside the current item itself are the current page,
            // not the next one.
            let marker_subtree: std::collections::HashSet<ElementHandle> =
                ctx.dom.descendants(members[marker]).into_iter().collect();

            let mut numeric: Option<ElementHandle> = None;
            let mut indicator: Option<ElementHandle> = None;
            for handle in members
                .iter()
                .skip(marker + 1)
                .filter(|h| !marker_subtree.contains(*h))
            {
                if ctx.dom.tag_name(*handle).as_deref() != Some("a") {
                    continue;
                }
                if !self.element_usable(ctx.dom, *handle) {
                    continue;
                }
                let text = ctx.dom.text_content(*handle);
                let trimmed = text.trim();
                if numeric.is_none() && trimmed.parse::<u32>().is_ok() {
                    numeric = Some(*handle);
                } else if indicator.is_none() && is_next_text(trimmed) {
                    indicator = Some(*handle);
                }
                if numeric.is_some() && indicator.is_some() {
                    break;
                }
            }

            let chosen = if self.config.prefer_numeric_next {
                numeric.or(indicator)
            } else {
                indicator.or(numeric)
            };
            if let Some(handle) = chosen {
                let target = self.target_for_element(ctx, handle);
                let kind = kind_for_target(&target);
                if let Some(detection) = PaginationDetection::new(
                    Strategy::NumberedList,
                    target,
                    kind,
                    CONF_NUMBERED,
                    6,
                    &self.urls,
                ) {
                    return Ok(Some(detection));
                }
            }
        }
        Ok(None)
    }

    fn aria_label(
        &self,
        ctx: &DetectContext<'_>,
    ) -> Result<Option<PaginationDetection>, DomError> {
        for handle in ctx.dom.query_all("[aria-label]")? {
            let Some(label) = ctx.dom.attribute(handle, "aria-label") else {
                continue;
            };
            if !is_next_aria_label(&label) || !self.element_usable(ctx.dom, handle) {
                continue;
            }
            let target = self.target_for_element(ctx, handle);
            let kind = kind_for_target(&target);
            if let Some(detection) = PaginationDetection::new(
                Strategy::AriaLabel,
                target,
                kind,
                CONF_ARIA,
                7,
                &self.urls,
            ) {
                return Ok(Some(detection));
            }
        }
        Ok(None)
    }

    fn text_content(
        &self,
        ctx: &DetectContext<'_>,
    ) -> Result<Option<PaginationDetection>, DomError> {
        for handle in ctx.dom.query_all("a, button")? {
            if !is_next_text(&ctx.dom.text_content(handle)) {
                continue;
            }
            if !self.element_usable(ctx.dom, handle) {
                continue;
            }
            let target = self.target_for_element(ctx, handle);
            let kind = kind_for_target(&target);
            if let Some(detection) = PaginationDetection::new(
                Strategy::TextMatch,
                target,
                kind,
                CONF_TEXT,
                8,
                &self.urls,
            ) {
                return Ok(Some(detection));
            }
        }
        Ok(None)
    }

    fn class_id(
        &self,
        ctx: &DetectContext<'_>,
    ) -> Result<Option<PaginationDetection>, DomError> {
        for handle in ctx.dom.query_all("a, button, span, div")? {
            let class = ctx.dom.attribute(handle, "class").unwrap_or_default();
            let id = ctx.dom.attribute(handle, "id").unwrap_or_default();
            let combined = format!("{class} {id}");
            if !is_next_class_or_id(&combined) || !self.element_usable(ctx.dom, handle) {
                continue;
            }
            let target = self.target_for_element(ctx, handle);
            let kind = kind_for_target(&target);
            if let Some(detection) = PaginationDetection::new(
                Strategy::ClassId,
                target,
                kind,
                CONF_CLASS_ID,
                9,
                &self.urls,
            ) {
                return Ok(Some(detection));
            }
        }
        Ok(None)
    }

    fn query_string_incremental(&self, ctx: &DetectContext<'_>) -> Option<PaginationDetection> {
        for param in PAGE_PARAMS {
            let Some(current) = ctx
                .current_url
                .query_pairs()
                .find(|(k, _)| k == param)
                .and_then(|(_, v)| v.parse::<u32>().ok())
            else {
                continue;
            };
            let next_url = increment_query_param(ctx.current_url, param, current + 1);
            return PaginationDetection::new(
                Strategy::QueryString {
                    param: (*param).to_string(),
                    current,
                    next: current + 1,
                },
                PaginationTarget::Url(next_url),
                PaginationKind::UrlBased,
                CONF_QUERY_INCREMENT,
                10,
                &self.urls,
            );
        }
        None
    }

    fn shadow_dom(
        &self,
        ctx: &DetectContext<'_>,
    ) -> Result<Option<PaginationDetection>, DomError> {
        for host in ctx.dom.query_all("*")? {
            let Some(root) = ctx.dom.shadow_root(host) else {
                continue;
            };
            let mut members = vec![root];
            members.extend(ctx.dom.descendants(root));

            // rel=next beats text inside the root, mirroring the flat-DOM order.
            for handle in &members {
                if ctx.dom.attribute(*handle, "rel").as_deref() == Some("next")
                    && let Some(raw) = ctx.dom.attribute(*handle, "href")
                    && !self.urls.is_bad_pagination_target(&raw)
                    && let Some(url) = self.urls.canonicalize(&raw, ctx.current_url)
                    && let Some(detection) = PaginationDetection::new(
                        Strategy::ShadowDom,
                        PaginationTarget::Url(url),
                        PaginationKind::ShadowDom,
                        CONF_SHADOW_REL,
                        11,
                        &self.urls,
                    )
                {
                    return Ok(Some(detection));
                }
            }
            for handle in &members {
                let tag = ctx.dom.tag_name(*handle);
                if !matches!(tag.as_deref(), Some("a" | "button")) {
                    continue;
                }
                if !is_next_text(&ctx.dom.text_content(*handle)) {
                    continue;
                }
                let target = self.target_for_element(ctx, *handle);
                if let Some(detection) = PaginationDetection::new(
                    Strategy::ShadowDom,
                    target,
                    PaginationKind::ShadowDom,
                    CONF_SHADOW_TEXT,
                    11,
                    &self.urls,
                ) {
                    return Ok(Some(detection));
                }
            }
        }
        Ok(None)
    }

    fn load_more(
        &self,
        ctx: &DetectContext<'_>,
    ) -> Result<Option<PaginationDetection>, DomError> {
        for handle in ctx.dom.query_all("a, button")? {
            if !is_load_more_text(&ctx.dom.text_content(handle)) {
                continue;
            }
            if !self.element_usable(ctx.dom, handle) {
                continue;
            }
            let hint = ctx
                .dom
                .attribute(handle, "href")
                .filter(|raw| !self.urls.is_bad_pagination_target(raw))
                .and_then(|raw| self.urls.canonicalize(&raw, ctx.current_url));
            if let Some(detection) = PaginationDetection::new(
                Strategy::LoadMore,
                PaginationTarget::ElementClick {
                    handle,
                    target_url: hint,
                },
                PaginationKind::InfiniteScroll,
                CONF_LOAD_MORE,
                12,
                &self.urls,
            ) {
                return Ok(Some(detection));
            }
        }
        Ok(None)
    }

    /// Preconditions for any clickable/followable element target.
    fn element_usable(&self, dom: &dyn DomAdapter, handle: ElementHandle) -> bool {
        if !dom.computed_style(handle).is_visible() {
            return false;
        }
        if dom.attribute(handle, "disabled").is_some() {
            return false;
        }
        if dom
            .attribute(handle, "aria-disabled")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return false;
        }
        if dom.attribute(handle, "class").is_some_and(|c| {
            c.split_whitespace()
                .any(|t| t.eq_ignore_ascii_case("disabled"))
        }) {
            return false;
        }
        // Zero rects only disqualify when the adapter reports geometry at all.
        let rect = dom.bounding_rect(handle);
        !rect.is_zero() || dom.document_height() == 0.0
    }

    fn target_for_element(
        &self,
        ctx: &DetectContext<'_>,
        handle: ElementHandle,
    ) -> PaginationTarget {
        let href = ctx
            .dom
            .attribute(handle, "href")
            .filter(|raw| !self.urls.is_bad_pagination_target(raw))
            .and_then(|raw| self.urls.canonicalize(&raw, ctx.current_url));
        match href {
            Some(url) => PaginationTarget::Url(url),
            None => PaginationTarget::ElementClick {
                handle,
                target_url: None,
            },
        }
    }
}

fn kind_for_target(target: &PaginationTarget) -> PaginationKind {
    match target {
        PaginationTarget::Url(_) => PaginationKind::UrlBased,
        PaginationTarget::ElementClick {
            target_url: Some(_), ..
        } => PaginationKind::ButtonBased,
        PaginationTarget::ElementClick {
            target_url: None, ..
        } => PaginationKind::AjaxBased,
    }
}

fn is_current_marker(dom: &dyn DomAdapter, handle: ElementHandle) -> bool {
    if dom
        .attribute(handle, "aria-current")
        .is_some_and(|v| v.eq_ignore_ascii_case("page"))
    {
        return true;
    }
    dom.attribute(handle, "class").is_some_and(|c| {
        c.split_whitespace()
            .any(|t| t.eq_ignore_ascii_case("current") || t.eq_ignore_ascii_case("active"))
    })
}

fn derive_page_number(current_url: &Url, engine_page: u32) -> u32 {
    for param in PAGE_PARAMS {
        if let Some(n) = current_url
            .query_pairs()
            .find(|(k, _)| k == param)
            .and_then(|(_, v)| v.parse::<u32>().ok())
        {
            return n;
        }
    }
    if let Some(matched) = match_path_pattern(current_url.path()) {
        return matched.number;
    }
    engine_page
}

fn increment_query_param(url: &Url, param: &str, next: u32) -> Url {
    let rebuilt: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k == param {
                (k.into_owned(), next.to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    let mut out = url.clone();
    out.query_pairs_mut().clear().extend_pairs(rebuilt);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::StaticDomAdapter;
    use anyhow::Result;

    fn detector() -> PaginationDetector {
        PaginationDetector::new(
            UrlCanonicalizer::default(),
            PaginationConfig::default(),
            Arc::new(PatternStore::new(7)),
        )
    }

    fn detect(html: &str, url: &str) -> Result<Option<PaginationDetection>> {
        let dom = StaticDomAdapter::parse(html);
        let current = Url::parse(url)?;
        let state = PaginationState::new(50);
        Ok(detector().detect_best(&dom, &current, &state)?)
    }

    #[test]
    fn test_rel_next_wins_over_text_match() -> Result<()> {
        let best = detect(
            r#"<html><body>
                <link rel="next" href="https://ex.com/p2">
                <a>next</a>
            </body></html>"#,
            "https://ex.com/p1",
        )?
        .ok_or_else(|| anyhow::anyhow!("expected a detection"))?;
        assert_eq!(best.strategy, Strategy::RelNext);
        assert_eq!(best.kind, PaginationKind::UrlBased);
        assert!((best.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(
            best.target.url().map(Url::as_str),
            Some("https://ex.com/p2")
        );
        Ok(())
    }

    #[test]
    fn test_null_rel_next_is_skipped() -> Result<()> {
        let best = detect(
            r#"<html><body><a rel="next" href="/null">Next</a></body></html>"#,
            "https://ex.com/p1",
        )?;
        // The anchor's text also resolves to the same /null href, so nothing
        // survives the guard.
        assert!(
            best.is_none()
                || best.is_some_and(|d| d.strategy.kind() != StrategyKind::RelNext),
        );
        Ok(())
    }

    #[test]
    fn test_query_string_incremental() -> Result<()> {
        let best = detect(
            "<html><body><p>no links here</p></body></html>",
            "https://ex.com/gallery?page=3",
        )?
        .ok_or_else(|| anyhow::anyhow!("expected a detection"))?;
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
    fn test_numbered_pagination_prefers_numeric() -> Result<()> {
        let html = r#"<html><body><ul class="pagination">
            <li><a href="/page/1">1</a></li>
            <li class="current"><a>2</a></li>
            <li><a href="/page/3">3</a></li>
            <li><a href="/page/3">›</a></li>
        </ul></body></html>"#;
        let dom = StaticDomAdapter::parse(html);
        let current = Url::parse("https://ex.com/page/2")?;
        let state = PaginationState::new(50);

        let all = detector().detect_all(&dom, &current, &state)?;
        let numbered = all
            .iter()
            .find(|d| d.strategy == Strategy::NumberedList)
            .ok_or_else(|| anyhow::anyhow!("expected numbered detection"))?;
        assert_eq!(
            numbered.target.url().map(Url::as_str),
            Some("https://ex.com/page/3")
        );
        Ok(())
    }

    #[test]
    fn test_localized_text_match() -> Result<()> {
        let best = detect(
            r#"<html><body><a href="/seite/2">Nächste</a></body></html>"#,
            "https://ex.de/seite/1",
        )?
        .ok_or_else(|| anyhow::anyhow!("expected a detection"))?;
        // Both the path-based link and the text match find this; path-based
        // carries higher confidence.
        assert!(matches!(
            best.strategy,
            Strategy::PathBased { .. } | Strategy::TextMatch
        ));
        Ok(())
    }

    #[test]
    fn test_disabled_next_is_ignored() -> Result<()> {
        let best = detect(
            r#"<html><body><a class="next disabled" href="/p/2">Next</a></body></html>"#,
            "https://ex.com/p/1",
        )?;
        // The anchor is unusable; only URL-shape strategies may still fire.
        if let Some(d) = best {
            assert!(matches!(d.target, PaginationTarget::Url(_)));
            assert!(matches!(
                d.strategy,
                Strategy::PathBased { .. } | Strategy::QueryString { .. }
            ));
        }
        Ok(())
    }

    #[test]
    fn test_shadow_dom_next() -> Result<()> {
        let best = detect(
            r#"<html><body>
                <div id="host"><div data-shadow-root="open">
                    <a href="/p/2">next</a>
                </div></div>
            </body></html>"#,
            "https://ex.com/feed",
        )?
        .ok_or_else(|| anyhow::anyhow!("expected a detection"))?;
        // Flat-DOM strategies also see the anchor through the static adapter;
        // what matters is that something resolves it and shadow detection ran.
        assert!(best.confidence >= CONF_SHADOW_TEXT || best.strategy == Strategy::ShadowDom);
        Ok(())
    }

    #[test]
    fn test_load_more_button() -> Result<()> {
        let best = detect(
            r#"<html><body><button class="more">Load more</button></body></html>"#,
            "https://ex.com/feed",
        )?
        .ok_or_else(|| anyhow::anyhow!("expected a detection"))?;
        assert_eq!(best.strategy, Strategy::LoadMore);
        assert_eq!(best.kind, PaginationKind::InfiniteScroll);
        assert!(matches!(best.target, PaginationTarget::ElementClick { .. }));
        Ok(())
    }

    #[test]
    fn test_failed_strategies_are_skipped() -> Result<()> {
        let dom = StaticDomAdapter::parse(
            r#"<html><body><link rel="next" href="https://ex.com/p2"><a href="https://ex.com/gallery?page=2">2</a></body></html>"#,
        );
        let current = Url::parse("https://ex.com/gallery?page=1")?;
        let mut state = PaginationState::new(50);
        state.mark_strategy_failed(StrategyKind::RelNext);

        let best = detector()
            .detect_best(&dom, &current, &state)?
            .ok_or_else(|| anyhow::anyhow!("expected a detection"))?;
        assert_ne!(best.strategy.kind(), StrategyKind::RelNext);
        Ok(())
    }
}
