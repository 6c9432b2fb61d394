//! Supplementary container sweeps.
//!
//! Beyond the four progressive phases, the recognizer looks for containers
//! that advertise dynamic behavior: scroll regions with loading indicators,
//! virtualized lists, AJAX roots, framework-rendered subtrees, and the class
//! roots of well-known gallery libraries. Hits contribute an indicator bonus
//! to the composite validation score.

use std::collections::HashMap;

use crate::dom::{DomAdapter, DomError, ElementHandle};

/// Class roots installed by gallery/carousel libraries.
const LIBRARY_TOKENS: &[&str] = &[
    "swiper",
    "slick",
    "owl-carousel",
    "masonry",
    "isotope",
    "photoswipe",
    "pswp",
    "fancybox",
    "lightbox",
    "mfp-",
    "magnific",
];

const LOADING_TOKENS: &[&str] = &["loading", "spinner", "loader", "progress"];

const VIRTUAL_TOKENS: &[&str] = &[
    "virtual-scroll",
    "virtualized",
    "reactvirtualized",
    "cdk-virtual-scroll",
    "windowed",
];

/// Per-container bonus and the notes explaining it.
#[derive(Debug, Default, Clone)]
pub(crate) struct SweepHit {
    pub bonus: f64,
    pub notes: Vec<String>,
}

/// Run every sweep, returning a bonus map keyed by container handle.
pub(crate) fn run(dom: &dyn DomAdapter) -> Result<HashMap<ElementHandle, SweepHit>, DomError> {
    let mut hits: HashMap<ElementHandle, SweepHit> = HashMap::new();
    let mut add = |handle: ElementHandle, bonus: f64, note: String| {
        let hit = hits.entry(handle).or_default();
        hit.bonus += bonus;
        hit.notes.push(note);
    };

    for handle in dom.query_all("*")? {
        let attrs = dom.attributes(handle);
        let class = attrs
            .iter()
            .find(|(k, _)| k == "class")
            .map(|(_, v)| v.to_ascii_lowercase())
            .unwrap_or_default();

        if let Some(token) = LIBRARY_TOKENS.iter().find(|t| class.contains(*t)) {
            add(handle, 0.4, format!("gallery library root ({token})"));
        }

        if VIRTUAL_TOKENS.iter().any(|t| class.contains(t))
            || attrs
                .iter()
                .any(|(k, _)| k == "data-virtualized" || k == "data-virtual-scroll")
        {
            add(handle, 0.3, "virtualized scroll container".to_string());
        }

        if attrs
            .iter()
            .any(|(k, _)| k == "data-ajax" || k == "data-remote" || k == "data-url")
        {
            add(handle, 0.2, "remote content marker".to_string());
        }

        if attrs.iter().any(|(k, _)| {
            k.starts_with("data-react") || k.starts_with("data-v-") || k.starts_with("ng-")
        }) {
            add(handle, 0.1, "framework-rendered subtree".to_string());
        }

        // Infinite scroll: a scrollable overflow plus a loading indicator
        // somewhere beneath it.
        let style = dom.computed_style(handle);
        if matches!(style.overflow_y.as_str(), "auto" | "scroll") {
            let has_loading = dom.descendants(handle).into_iter().any(|d| {
                dom.attribute(d, "class")
                    .is_some_and(|c| {
                        let lowered = c.to_ascii_lowercase();
                        LOADING_TOKENS.iter().any(|t| lowered.contains(t))
                    })
            });
            if has_loading {
                add(handle, 0.3, "infinite-scroll container".to_string());
            }
        }
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::StaticDomAdapter;
    use anyhow::Result;

    #[test]
    fn test_library_root_detected() -> Result<()> {
        let dom = StaticDomAdapter::parse(
            r#"<html><body><div class="swiper-container"><img src="/a.jpg"></div></body></html>"#,
        );
        let hits = run(&dom)?;
        assert!(
            hits.values()
                .any(|h| h.notes.iter().any(|n| n.contains("library")))
        );
        Ok(())
    }

    #[test]
    fn test_infinite_scroll_needs_indicator() -> Result<()> {
        let with = StaticDomAdapter::parse(
            r#"<html><body><div style="overflow-y:scroll"><div class="spinner"></div></div></body></html>"#,
        );
        assert!(
            run(&with)?
                .values()
                .any(|h| h.notes.iter().any(|n| n.contains("infinite-scroll")))
        );

        let without = StaticDomAdapter::parse(
            r#"<html><body><div style="overflow-y:scroll"><p>text</p></div></body></html>"#,
        );
        assert!(
            !run(&without)?
                .values()
                .any(|h| h.notes.iter().any(|n| n.contains("infinite-scroll")))
        );
        Ok(())
    }
}
