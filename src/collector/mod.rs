//! Image reference collection.
//!
//! Walks one parsed document and enumerates every discoverable image
//! reference across eight embedding idioms, in a fixed order:
//!
//! 1. `<img src>`
//! 2. `<img srcset>`
//! 3. lazy attributes on any element
//! 4. inline `style` background images
//! 5. `<picture>` sources and their `<img>` fallback
//! 6. SVG `<image>`/`<use>` references
//! 7. `<a href>` pointing at image-like URLs
//! 8. computed-style backgrounds on non-inline elements (bounded)
//!
//! The first reference to a canonical URL wins; later duplicates only bump a
//! counter. Per-element failures (missing attributes, unparseable URLs) are
//! counted and swallowed; only losing the document itself fails the scan.

mod types;

pub use types::{
    CollectedImages, DiscoveryMethod, ImageAttributes, ImageCategory, ImageRecord, ScanStats,
};

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Instant;
use url::Url;

use crate::config::CollectorConfig;
use crate::dom::{DomAdapter, DomError, ElementHandle};
use crate::ports::CancelToken;
use crate::scoring::signals::{LAZY_ATTRIBUTES, LAZY_CLASS_TOKENS};
use crate::urlnorm::UrlCanonicalizer;

static CSS_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*['"]?([^'")]+)['"]?\s*\)"#)
        .expect("BUG: hardcoded css url() regex is invalid")
});

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("DOM unavailable: {0}")]
    DomUnavailable(String),
}

impl From<DomError> for CollectorError {
    fn from(error: DomError) -> Self {
        Self::DomUnavailable(error.to_string())
    }
}

/// Split an `srcset` value into its candidate URLs: one candidate per comma,
/// keeping the first whitespace-separated token (the URL, not the descriptor).
#[must_use]
pub fn parse_srcset(value: &str) -> Vec<&str> {
    value
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Enumerates image references from one document.
pub struct ImageCollector<'a> {
    dom: &'a dyn DomAdapter,
    urls: &'a UrlCanonicalizer,
    config: &'a CollectorConfig,
    page_url: &'a Url,
}

struct CollectState {
    records: Vec<ImageRecord>,
    seen: HashSet<String>,
    duplicates: u64,
    element_errors: u64,
    started: Instant,
}

impl<'a> ImageCollector<'a> {
    #[must_use]
    pub fn new(
        dom: &'a dyn DomAdapter,
        urls: &'a UrlCanonicalizer,
        config: &'a CollectorConfig,
        page_url: &'a Url,
    ) -> Self {
        Self {
            dom,
            urls,
            config,
            page_url,
        }
    }

    /// Run all discovery methods. Cancellation is checked between methods;
    /// a cancelled scan returns the records gathered so far.
    pub fn collect(&self, cancel: Option<&CancelToken>) -> Result<CollectedImages, CollectorError> {
        let mut state = CollectState {
            records: Vec::new(),
            seen: HashSet::new(),
            duplicates: 0,
            element_errors: 0,
            started: Instant::now(),
        };

        let methods: [(&str, fn(&Self, &mut CollectState) -> Result<(), CollectorError>); 8] = [
            ("img-src", Self::collect_img_src),
            ("img-srcset", Self::collect_img_srcset),
            ("lazy-attr", Self::collect_lazy),
            ("inline-background", Self::collect_inline_background),
            ("picture", Self::collect_picture),
            ("svg", Self::collect_svg),
            ("anchor", Self::collect_anchors),
            ("computed-background", Self::collect_computed_background),
        ];

        let mut cancelled = false;
        for (name, method) in methods {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                log::debug!("scan cancelled before {name} pass");
                cancelled = true;
                break;
            }
            method(self, &mut state)?;
        }

        let stats = ScanStats {
            records: state.records.len(),
            duplicates: state.duplicates,
            element_errors: state.element_errors,
            elapsed: state.started.elapsed(),
            cancelled,
        };
        log::debug!(
            "collected {} records ({} duplicates, {} element errors) from {}",
            stats.records,
            stats.duplicates,
            stats.element_errors,
            self.page_url
        );
        Ok(CollectedImages {
            records: state.records,
            stats,
        })
    }

    fn emit(
        &self,
        state: &mut CollectState,
        raw: &str,
        method: DiscoveryMethod,
        element: ElementHandle,
    ) {
        let Some(url) = self.urls.canonicalize(raw, self.page_url) else {
            if !raw.trim().is_empty() {
                state.element_errors += 1;
            }
            return;
        };

        let key = url.to_string();
        if !state.seen.insert(key) {
            state.duplicates += 1;
            return;
        }

        let attributes = self.snapshot_attributes(element);
        let confidence = self.record_confidence(&url, method, &attributes);
        let category = if confidence >= self.config.high_confidence_threshold {
            ImageCategory::HighConfidence
        } else if self.urls.same_origin(&url, self.page_url) {
            ImageCategory::SameOrigin
        } else {
            ImageCategory::External
        };

        state.records.push(ImageRecord {
            url,
            discovery_method: method,
            attributes,
            element,
            confidence,
            category,
            collected_at: state.started.elapsed(),
        });
    }

    fn snapshot_attributes(&self, element: ElementHandle) -> ImageAttributes {
        let mut out = ImageAttributes::default();
        for (key, value) in self.dom.attributes(element) {
            match key.as_str() {
                "alt" => out.alt = Some(value),
                "title" => out.title = Some(value),
                "width" => out.width = value.trim().parse().ok(),
                "height" => out.height = value.trim().parse().ok(),
                "class" => out.class = Some(value),
                "id" => out.id = Some(value),
                _ => {}
            }
        }
        if out.width.is_none() || out.height.is_none() {
            let rect = self.dom.bounding_rect(element);
            if !rect.is_zero() {
                out.width.get_or_insert(rect.width as u32);
                out.height.get_or_insert(rect.height as u32);
            }
        }
        out
    }

    fn record_confidence(
        &self,
        url: &Url,
        method: DiscoveryMethod,
        attributes: &ImageAttributes,
    ) -> f64 {
        let base = match method {
            DiscoveryMethod::ImgSrc => 0.9,
            DiscoveryMethod::ImgSrcset | DiscoveryMethod::PictureImg => 0.85,
            DiscoveryMethod::PictureSource => 0.8,
            DiscoveryMethod::SvgImage => 0.75,
            DiscoveryMethod::LazyAttr => 0.7,
            DiscoveryMethod::BackgroundImage => 0.6,
            DiscoveryMethod::AnchorHref => 0.45,
        };
        let mut score: f64 = base;
        if self.urls.looks_like_image(url) {
            score += 0.05;
        }
        if attributes
            .width
            .zip(attributes.height)
            .is_some_and(|(w, h)| w.min(h) >= 50)
        {
            score += 0.05;
        }
        score.clamp(0.0, 1.0)
    }

    /// Whether an element sits inside a `<picture>`; those images belong to
    /// the picture pass so the fallback keeps its own discovery method.
    fn inside_picture(&self, handle: ElementHandle) -> bool {
        let mut cursor = self.dom.parent(handle);
        while let Some(ancestor) = cursor {
            if self.dom.tag_name(ancestor).as_deref() == Some("picture") {
                return true;
            }
            cursor = self.dom.parent(ancestor);
        }
        false
    }

    fn collect_img_src(&self, state: &mut CollectState) -> Result<(), CollectorError> {
        for handle in self.dom.query_all("img")? {
            if self.inside_picture(handle) {
                continue;
            }
            match self.dom.attribute(handle, "src") {
                Some(src) => self.emit(state, &src, DiscoveryMethod::ImgSrc, handle),
                None => state.element_errors += 1,
            }
        }
        Ok(())
    }

    fn collect_img_srcset(&self, state: &mut CollectState) -> Result<(), CollectorError> {
        for handle in self.dom.query_all("img[srcset]")? {
            if self.inside_picture(handle) {
                continue;
            }
            let Some(srcset) = self.dom.attribute(handle, "srcset") else {
                state.element_errors += 1;
                continue;
            };
            for candidate in parse_srcset(&srcset) {
                self.emit(state, candidate, DiscoveryMethod::ImgSrcset, handle);
            }
        }
        Ok(())
    }

    fn collect_lazy(&self, state: &mut CollectState) -> Result<(), CollectorError> {
        for handle in self.dom.query_all("*")? {
            let attrs = self.dom.attributes(handle);
            let lazy_marked = attrs.iter().any(|(k, v)| {
                (k == "loading" && v.eq_ignore_ascii_case("lazy"))
                    || (k == "class"
                        && v.split_whitespace().any(|c| LAZY_CLASS_TOKENS.contains(&c)))
            });

            for (key, value) in &attrs {
                if !LAZY_ATTRIBUTES.contains(&key.as_str()) {
                    continue;
                }
                if key == "data-srcset" {
                    for candidate in parse_srcset(value) {
                        self.emit(state, candidate, DiscoveryMethod::LazyAttr, handle);
                    }
                } else {
                    self.emit(state, value, DiscoveryMethod::LazyAttr, handle);
                }
            }

            // loading="lazy" / lazy classes carry no URL of their own; the
            // src pass already captured those. Only flag elements that
            // advertise laziness but expose no URL at all.
            if lazy_marked
                && !attrs.iter().any(|(k, _)| {
                    k == "src" || k == "srcset" || LAZY_ATTRIBUTES.contains(&k.as_str())
                })
            {
                state.element_errors += 1;
            }
        }
        Ok(())
    }

    fn collect_inline_background(&self, state: &mut CollectState) -> Result<(), CollectorError> {
        for handle in self.dom.query_all("[style]")? {
            let Some(style) = self.dom.attribute(handle, "style") else {
                continue;
            };
            if !style.to_ascii_lowercase().contains("background") {
                continue;
            }
            for capture in CSS_URL_RE.captures_iter(&style) {
                if let Some(url) = capture.get(1) {
                    self.emit(state, url.as_str(), DiscoveryMethod::BackgroundImage, handle);
                }
            }
        }
        Ok(())
    }

    fn collect_picture(&self, state: &mut CollectState) -> Result<(), CollectorError> {
        for picture in self.dom.query_all("picture")? {
            for child in self.dom.descendants(picture) {
                match self.dom.tag_name(child).as_deref() {
                    Some("source") => {
                        if let Some(srcset) = self.dom.attribute(child, "srcset") {
                            for candidate in parse_srcset(&srcset) {
                                self.emit(state, candidate, DiscoveryMethod::PictureSource, child);
                            }
                        } else if let Some(src) = self.dom.attribute(child, "src") {
                            self.emit(state, &src, DiscoveryMethod::PictureSource, child);
                        }
                    }
                    Some("img") => {
                        if let Some(src) = self.dom.attribute(child, "src") {
                            self.emit(state, &src, DiscoveryMethod::PictureImg, child);
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn collect_svg(&self, state: &mut CollectState) -> Result<(), CollectorError> {
        for handle in self.dom.query_all("image, use")? {
            let href = self
                .dom
                .attribute(handle, "href")
                .or_else(|| self.dom.attribute(handle, "xlink:href"));
            if let Some(href) = href {
                self.emit(state, &href, DiscoveryMethod::SvgImage, handle);
            }
        }
        Ok(())
    }

    fn collect_anchors(&self, state: &mut CollectState) -> Result<(), CollectorError> {
        for handle in self.dom.query_all("a[href]")? {
            let Some(href) = self.dom.attribute(handle, "href") else {
                continue;
            };
            let Some(url) = self.urls.canonicalize(&href, self.page_url) else {
                continue;
            };
            if self.urls.looks_like_image(&url) {
                self.emit(state, &href, DiscoveryMethod::AnchorHref, handle);
            }
        }
        Ok(())
    }

    fn collect_computed_background(&self, state: &mut CollectState) -> Result<(), CollectorError> {
        let candidates = self.dom.query_all("*")?;
        let mut examined = 0usize;
        for handle in candidates {
            if examined >= self.config.max_style_scan {
                break;
            }
            let style = self.dom.computed_style(handle);
            if style.display == "inline" {
                continue;
            }
            examined += 1;
            if let Some(background) = style.background_image {
                for capture in CSS_URL_RE.captures_iter(&background) {
                    if let Some(url) = capture.get(1) {
                        self.emit(state, url.as_str(), DiscoveryMethod::BackgroundImage, handle);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::StaticDomAdapter;
    use anyhow::Result;

    fn collect_from(html: &str) -> Result<CollectedImages> {
        let dom = StaticDomAdapter::parse(html);
        let urls = UrlCanonicalizer::default();
        let config = CollectorConfig::default();
        let page_url = Url::parse("https://example.com/gallery")?;
        let collector = ImageCollector::new(&dom, &urls, &config, &page_url);
        Ok(collector.collect(None)?)
    }

    #[test]
    fn test_img_src_and_dedup() -> Result<()> {
        let out = collect_from(
            r#"<html><body>
                <img src="/a.jpg"><img src="/a.jpg"><img src="/b.jpg">
            </body></html>"#,
        )?;
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.stats.duplicates, 1);
        assert_eq!(out.records[0].discovery_method, DiscoveryMethod::ImgSrc);
        assert_eq!(out.records[0].url.as_str(), "https://example.com/a.jpg");
        Ok(())
    }

    #[test]
    fn test_srcset_keeps_first_token_per_candidate() -> Result<()> {
        assert_eq!(
            parse_srcset("/a-320.jpg 320w, /a-640.jpg 640w, /a.jpg"),
            vec!["/a-320.jpg", "/a-640.jpg", "/a.jpg"]
        );
        let out = collect_from(
            r#"<html><body><img srcset="/s-320.jpg 320w, /s-640.jpg 2x"></body></html>"#,
        )?;
        let urls: Vec<&str> = out.records.iter().map(|r| r.url.as_str()).collect();
        assert!(urls.contains(&"https://example.com/s-320.jpg"));
        assert!(urls.contains(&"https://example.com/s-640.jpg"));
        Ok(())
    }

    #[test]
    fn test_lazy_attributes_on_any_element() -> Result<()> {
        let out = collect_from(
            r#"<html><body>
                <div data-src="/lazy1.jpg"></div>
                <img data-lazy-src="/lazy2.jpg" class="lazyload">
                <div data-srcset="/lazy3.jpg 1x, /lazy4.jpg 2x"></div>
            </body></html>"#,
        )?;
        let lazy: Vec<&ImageRecord> = out
            .records
            .iter()
            .filter(|r| r.discovery_method == DiscoveryMethod::LazyAttr)
            .collect();
        assert_eq!(lazy.len(), 4);
        Ok(())
    }

    #[test]
    fn test_inline_background_quoting_forms() -> Result<()> {
        let out = collect_from(
            r#"<html><body>
                <div style="background-image: url('/bg1.jpg')"></div>
                <div style="background-image:url(&quot;/bg2.jpg&quot;)"></div>
                <div style="background: url(/bg3.jpg) no-repeat"></div>
            </body></html>"#,
        )?;
        let bg: Vec<&str> = out
            .records
            .iter()
            .filter(|r| r.discovery_method == DiscoveryMethod::BackgroundImage)
            .map(|r| r.url.as_str())
            .collect();
        assert_eq!(
            bg,
            vec![
                "https://example.com/bg1.jpg",
                "https://example.com/bg2.jpg",
                "https://example.com/bg3.jpg"
            ]
        );
        Ok(())
    }

    #[test]
    fn test_picture_sources_then_img_fallback() -> Result<()> {
        let out = collect_from(
            r#"<html><body><picture>
                <source srcset="/wide.webp 1x">
                <source src="/narrow.webp">
                <img src="/fallback.jpg">
            </picture></body></html>"#,
        )?;
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.records[0].discovery_method, DiscoveryMethod::PictureSource);
        assert_eq!(out.records[2].discovery_method, DiscoveryMethod::PictureImg);
        Ok(())
    }

    #[test]
    fn test_anchor_only_when_image_like() -> Result<()> {
        let out = collect_from(
            r#"<html><body>
                <a href="/full/photo.png">full</a>
                <a href="/about.html">about</a>
            </body></html>"#,
        )?;
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].discovery_method, DiscoveryMethod::AnchorHref);
        Ok(())
    }

    #[test]
    fn test_collect_is_idempotent() -> Result<()> {
        let html = r#"<html><body>
            <img src="/a.jpg"><img srcset="/b.jpg 1x"><a href="/c.gif">c</a>
        </body></html>"#;
        let first = collect_from(html)?;
        let second = collect_from(html)?;
        let urls =
            |o: &CollectedImages| o.records.iter().map(|r| r.url.to_string()).collect::<Vec<_>>();
        assert_eq!(urls(&first), urls(&second));
        Ok(())
    }

    #[test]
    fn test_rejects_data_and_javascript_urls() -> Result<()> {
        let out = collect_from(
            r#"<html><body>
                <img src="data:image/png;base64,AAAA">
                <img src="javascript:bad()">
                <img src="/ok.jpg">
            </body></html>"#,
        )?;
        assert_eq!(out.records.len(), 1);
        assert!(out.stats.element_errors >= 2);
        Ok(())
    }

    #[test]
    fn test_duplicate_across_methods_first_write_wins() -> Result<()> {
        let out = collect_from(
            r#"<html><body>
                <img src="/same.jpg">
                <a href="/same.jpg">link to same</a>
            </body></html>"#,
        )?;
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].discovery_method, DiscoveryMethod::ImgSrc);
        assert_eq!(out.stats.duplicates, 1);
        Ok(())
    }
}
