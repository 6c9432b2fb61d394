//! Gallery container recognition.
//!
//! Containers are proposed in four progressive phases (semantic markup,
//! class/id vocabulary, geometric layout, image density) plus the sweeps in
//! [`sweeps`], then validated and classified. Each surviving container is
//! scored by the [`ConfidenceScorer`](crate::scoring::ConfidenceScorer) and
//! emitted as a [`GalleryPattern`].

mod layout;
mod sweeps;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use url::Url;

use crate::config::PatternConfig;
use crate::dom::{DomAdapter, DomError, ElementHandle};
use crate::scoring::signals::{LAZY_ATTRIBUTES, cluster_values};
use crate::scoring::{ConfidenceLevel, ConfidenceScorer, ScoreInput};

/// Vocabulary matched against class/id/data-* tokens.
const GALLERY_TOKENS: &[&str] = &[
    "gallery",
    "galleries",
    "image",
    "images",
    "photo",
    "photos",
    "picture",
    "pictures",
    "thumb",
    "thumbs",
    "thumbnail",
    "thumbnails",
    "tile",
    "tiles",
    "carousel",
    "slider",
    "slides",
    "grid",
    "masonry",
    "lightbox",
    "portfolio",
    "album",
    "media",
    "showcase",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Classified shape of a validated container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GalleryLayout {
    Grid {
        rows: usize,
        cols: usize,
    },
    List {
        orientation: Orientation,
    },
    Carousel {
        has_nav: bool,
        has_indicators: bool,
        visible_count: usize,
    },
    Masonry {
        columns: usize,
    },
}

/// One detected gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryPattern {
    pub container: ElementHandle,
    pub layout: GalleryLayout,
    /// Image-bearing elements beneath the container, in document order.
    pub items: Vec<ElementHandle>,
    /// Stable descriptor for the container.
    pub selector: String,
    /// Descriptor for the repeating item.
    pub item_selector: String,
    pub confidence: f64,
    pub level: ConfidenceLevel,
    pub rationale: String,
}

/// Detects gallery containers in one document.
pub struct PatternRecognizer<'a> {
    dom: &'a dyn DomAdapter,
    scorer: &'a ConfidenceScorer,
    config: &'a PatternConfig,
    page_url: &'a Url,
}

impl<'a> PatternRecognizer<'a> {
    #[must_use]
    pub fn new(
        dom: &'a dyn DomAdapter,
        scorer: &'a ConfidenceScorer,
        config: &'a PatternConfig,
        page_url: &'a Url,
    ) -> Self {
        Self {
            dom,
            scorer,
            config,
            page_url,
        }
    }

    /// Run all phases and return validated, scored patterns sorted by
    /// confidence (descending).
    pub fn detect(&self) -> Result<Vec<GalleryPattern>, DomError> {
        let sweep_hits = sweeps::run(self.dom)?;

        // Candidate set unions all phases; insertion order is preserved so
        // earlier (more semantic) proposals win ancestor dedup ties.
        let mut order: Vec<ElementHandle> = Vec::new();
        let mut bonus: HashMap<ElementHandle, f64> = HashMap::new();
        let mut propose = |handle: ElementHandle, score: f64| match bonus.entry(handle) {
            std::collections::hash_map::Entry::Vacant(vacant) => {
                vacant.insert(score);
                order.push(handle);
            }
            std::collections::hash_map::Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                *existing = existing.max(score);
            }
        };

        for handle in self.semantic_candidates()? {
            propose(handle, 0.3);
        }
        for handle in self.token_candidates()? {
            propose(handle, 0.3);
        }
        for (handle, score) in self.layout_candidates()? {
            propose(handle, score);
        }
        for handle in self.density_candidates()? {
            propose(handle, 0.35);
        }
        for (handle, hit) in &sweep_hits {
            propose(*handle, hit.bonus.min(0.4));
        }

        let mut accepted: Vec<GalleryPattern> = Vec::new();
        let mut accepted_set: HashSet<ElementHandle> = HashSet::new();

        for container in order {
            if self.has_accepted_ancestor(container, &accepted_set, &accepted) {
                continue;
            }
            let Some(pattern) =
                self.validate_and_classify(container, bonus.get(&container).copied().unwrap_or(0.0))
            else {
                continue;
            };
            accepted_set.insert(container);
            accepted.push(pattern);
        }

        accepted.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        log::debug!(
            "recognized {} gallery pattern(s) on {}",
            accepted.len(),
            self.page_url
        );
        Ok(accepted)
    }

    fn semantic_candidates(&self) -> Result<Vec<ElementHandle>, DomError> {
        let mut out = Vec::new();
        for selector in [
            "section[aria-label*='gallery']",
            "section[aria-label*='photo']",
            "figure",
            "[role='img']",
            "[role='gallery']",
        ] {
            out.extend(self.dom.query_all(selector)?);
        }
        Ok(out)
    }

    fn token_candidates(&self) -> Result<Vec<ElementHandle>, DomError> {
        let mut out = Vec::new();
        for handle in self.dom.query_all("*")? {
            let matched = self.dom.attributes(handle).iter().any(|(key, value)| {
                if key == "class" || key == "id" {
                    return contains_gallery_token(value);
                }
                // data-gallery="" style markers match on the attribute name.
                key.starts_with("data-")
                    && (contains_gallery_token(key) || contains_gallery_token(value))
            });
            if matched {
                out.push(handle);
            }
        }
        Ok(out)
    }

    fn layout_candidates(&self) -> Result<Vec<(ElementHandle, f64)>, DomError> {
        let mut out = Vec::new();
        for handle in self.dom.query_all("*")? {
            let children = self.dom.children(handle);
            if children.len() < self.config.min_pattern_items {
                continue;
            }
            let rects: Vec<_> = children
                .iter()
                .map(|c| self.dom.bounding_rect(*c))
                .filter(|r| !r.is_zero())
                .collect();
            if rects.len() < self.config.min_pattern_items {
                continue;
            }
            let rows = cluster_values(
                &rects.iter().map(|r| r.y).collect::<Vec<_>>(),
                self.config.grid_tolerance_px,
            );
            let cols = cluster_values(
                &rects.iter().map(|r| r.x).collect::<Vec<_>>(),
                self.config.grid_tolerance_px,
            );
            if rows.len() >= 2 && cols.len() >= 2 {
                out.push((handle, 0.4));
            }
        }
        Ok(out)
    }

    fn density_candidates(&self) -> Result<Vec<ElementHandle>, DomError> {
        let mut out = Vec::new();
        for handle in self.dom.query_all("*")? {
            let bearing_children = self
                .dom
                .children(handle)
                .into_iter()
                .filter(|child| {
                    is_image_bearing(self.dom, *child)
                        || self
                            .dom
                            .descendants(*child)
                            .into_iter()
                            .any(|d| is_image_bearing(self.dom, d))
                })
                .count();
            if bearing_children >= self.config.min_pattern_items {
                out.push(handle);
            }
        }
        Ok(out)
    }

    fn has_accepted_ancestor(
        &self,
        container: ElementHandle,
        accepted_set: &HashSet<ElementHandle>,
        accepted: &[GalleryPattern],
    ) -> bool {
        let item_count = self.image_items(container).len();
        let mut cursor = self.dom.parent(container);
        while let Some(ancestor) = cursor {
            if accepted_set.contains(&ancestor)
                && accepted
                    .iter()
                    .any(|p| p.container == ancestor && p.items.len() == item_count)
            {
                return true;
            }
            cursor = self.dom.parent(ancestor);
        }
        false
    }

    fn validate_and_classify(
        &self,
        container: ElementHandle,
        discovery_bonus: f64,
    ) -> Option<GalleryPattern> {
        let items = self.image_items(container);
        if items.len() < self.config.min_pattern_items {
            return None;
        }

        let rect = self.dom.bounding_rect(container);
        // Adapters without layout data report zero rects; geometry gates only
        // apply when geometry exists.
        if !rect.is_zero() {
            let area = rect.area();
            if area < self.config.min_container_area || area > self.config.max_container_area {
                return None;
            }
        }
        if !self.dom.computed_style(container).is_visible() {
            return None;
        }

        let analysis = layout::classify(self.dom, container, &items, self.config);
        let composite = discovery_bonus + analysis.consistency * 0.3;
        if composite < self.config.composite_threshold {
            return None;
        }

        let mut classified = analysis.layout;
        if items.len() < layout::minimum_items(&classified, self.config) {
            if items.len() >= self.config.list_min_items {
                classified = GalleryLayout::List {
                    orientation: Orientation::Vertical,
                };
            } else {
                return None;
            }
        }

        let selector = self.build_selector(container);
        let item_selector = self.build_item_selector(&items);
        let report = self.scorer.score(&ScoreInput {
            dom: self.dom,
            container,
            items: &items,
            selector: &selector,
            page_url: self.page_url,
        });

        Some(GalleryPattern {
            container,
            layout: classified,
            items,
            selector,
            item_selector,
            confidence: report.score,
            level: report.level,
            rationale: report.rationale,
        })
    }

    /// Image-bearing elements beneath a container, in document order.
    fn image_items(&self, container: ElementHandle) -> Vec<ElementHandle> {
        self.dom
            .descendants(container)
            .into_iter()
            .filter(|h| is_image_bearing(self.dom, *h))
            .collect()
    }

    fn build_selector(&self, handle: ElementHandle) -> String {
        let tag = self.dom.tag_name(handle).unwrap_or_else(|| "div".to_string());
        if let Some(id) = self.dom.attribute(handle, "id")
            && !id.trim().is_empty()
        {
            return format!("{tag}#{}", id.trim());
        }
        if let Some((key, _)) = self
            .dom
            .attributes(handle)
            .into_iter()
            .find(|(k, _)| k.starts_with("data-") && contains_gallery_token(k))
        {
            return format!("{tag}[{key}]");
        }
        if let Some(class) = self.dom.attribute(handle, "class") {
            let classes: Vec<&str> = class.split_whitespace().take(2).collect();
            if !classes.is_empty() {
                return format!("{tag}.{}", classes.join("."));
            }
        }
        match self.dom.parent(handle).and_then(|p| self.dom.tag_name(p)) {
            Some(parent_tag) => format!("{parent_tag} > {tag}"),
            None => tag,
        }
    }

    fn build_item_selector(&self, items: &[ElementHandle]) -> String {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for item in items {
            if let Some(tag) = self.dom.tag_name(*item) {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map_or_else(|| "img".to_string(), |(tag, _)| tag)
    }
}

fn contains_gallery_token(value: &str) -> bool {
    value
        .split(['-', '_', ' '])
        .any(|token| GALLERY_TOKENS.contains(&token.to_ascii_lowercase().as_str()))
}

fn is_image_bearing(dom: &dyn DomAdapter, handle: ElementHandle) -> bool {
    match dom.tag_name(handle).as_deref() {
        Some("img" | "image") => return true,
        Some("source") => {
            return dom.parent(handle).and_then(|p| dom.tag_name(p)).as_deref() == Some("picture");
        }
        _ => {}
    }
    dom.attributes(handle).iter().any(|(key, value)| {
        LAZY_ATTRIBUTES.contains(&key.as_str())
            || (key == "style"
                && value.to_ascii_lowercase().contains("background")
                && value.contains("url("))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::dom::StaticDomAdapter;
    use anyhow::Result;

    fn recognize(html: &str) -> Result<Vec<GalleryPattern>> {
        let dom = StaticDomAdapter::parse(html);
        let scorer = ConfidenceScorer::new(ScoringConfig::default());
        let config = PatternConfig::default();
        let page_url = Url::parse("https://example.com/gallery")?;
        let recognizer = PatternRecognizer::new(&dom, &scorer, &config, &page_url);
        Ok(recognizer.detect()?)
    }

    fn grid_container(rows: usize, cols: usize, jitter: f64) -> String {
        let mut items = String::new();
        for row in 0..rows {
            for col in 0..cols {
                let dx = if (row + col) % 2 == 0 { jitter } else { -jitter };
                items.push_str(&format!(
                    r#"<img src="/img/{row}-{col}.jpg" data-x="{:.0}" data-y="{:.0}" width="200" height="150">"#,
                    col as f64 * 210.0 + dx,
                    row as f64 * 160.0 + dx,
                ));
            }
        }
        format!(
            r#"<html><body><div class="photo-grid" id="wall" data-width="640" data-height="650" style="width:640px;height:650px">{items}</div></body></html>"#
        )
    }

    #[test]
    fn test_grid_classification_four_by_three() -> Result<()> {
        let patterns = recognize(&grid_container(4, 3, 2.0))?;
        assert!(!patterns.is_empty());
        let grid = &patterns[0];
        assert_eq!(grid.layout, GalleryLayout::Grid { rows: 4, cols: 3 });
        assert_eq!(grid.items.len(), 12);
        assert!(grid.selector.contains("#wall"));
        Ok(())
    }

    #[test]
    fn test_token_phase_finds_gallery_class() -> Result<()> {
        let patterns = recognize(
            r#"<html><body><div class="image-gallery">
                <img src="/1.jpg"><img src="/2.jpg"><img src="/3.jpg">
            </div></body></html>"#,
        )?;
        assert!(!patterns.is_empty());
        Ok(())
    }

    #[test]
    fn test_too_few_items_rejected() -> Result<()> {
        let patterns = recognize(
            r#"<html><body><div class="gallery"><img src="/1.jpg"><img src="/2.jpg"></div></body></html>"#,
        )?;
        assert!(patterns.is_empty());
        Ok(())
    }

    #[test]
    fn test_hidden_container_rejected() -> Result<()> {
        let patterns = recognize(
            r#"<html><body><div class="gallery" style="display:none">
                <img src="/1.jpg"><img src="/2.jpg"><img src="/3.jpg">
            </div></body></html>"#,
        )?;
        assert!(patterns.is_empty());
        Ok(())
    }

    #[test]
    fn test_carousel_by_class_and_nav() -> Result<()> {
        let patterns = recognize(
            r#"<html><body><div class="hero-carousel">
                <button class="carousel-prev">‹</button>
                <img src="/1.jpg"><img src="/2.jpg"><img src="/3.jpg">
                <div class="carousel-dots"></div>
            </div></body></html>"#,
        )?;
        assert!(!patterns.is_empty());
        match &patterns[0].layout {
            GalleryLayout::Carousel {
                has_nav,
                has_indicators,
                ..
            } => {
                assert!(has_nav);
                assert!(has_indicators);
            }
            other => panic!("expected carousel, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_grid_minimum_downgrades_to_list() -> Result<()> {
        // Three items cannot be a grid (grid minimum is 4); they stay a list.
        let patterns = recognize(
            r#"<html><body><div class="gallery">
                <img src="/1.jpg" data-x="0" data-y="0" width="100" height="100">
                <img src="/2.jpg" data-x="110" data-y="0" width="100" height="100">
                <img src="/3.jpg" data-x="0" data-y="110" width="100" height="100">
            </div></body></html>"#,
        )?;
        assert!(!patterns.is_empty());
        assert!(matches!(patterns[0].layout, GalleryLayout::List { .. }));
        Ok(())
    }
}
