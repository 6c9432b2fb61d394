//! Read-only document tree port.
//!
//! The engine never owns DOM memory. It sees a parsed document through the
//! [`DomAdapter`] trait and refers to elements with opaque [`ElementHandle`]
//! values that are only valid for the adapter that produced them. Navigating
//! to a new document invalidates every outstanding handle; anything that must
//! survive navigation snapshots attributes and URLs eagerly.
//!
//! A scraper-backed [`StaticDomAdapter`] ships in-crate so the collector,
//! recognizer, and detector run against plain fetched HTML without a browser.

mod static_adapter;

pub use static_adapter::StaticDomAdapter;

use serde::{Deserialize, Serialize};

/// Opaque, non-owning reference to an element inside one adapter's document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(u32);

impl ElementHandle {
    /// Sentinel for records whose element reference has been invalidated.
    pub const NONE: Self = Self(u32::MAX);

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl Default for ElementHandle {
    fn default() -> Self {
        Self::NONE
    }
}

/// Subset of computed style the engine reasons about.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    pub overflow_x: String,
    pub overflow_y: String,
    pub background_image: Option<String>,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            overflow_x: "visible".to_string(),
            overflow_y: "visible".to_string(),
            background_image: None,
        }
    }
}

impl ComputedStyle {
    /// Whether the element is rendered at all.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.display != "none" && self.visibility != "hidden" && self.opacity > 0.0
    }
}

/// Bounding rectangle in layout pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    #[must_use]
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    #[must_use]
    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

/// Error surface for adapters that can lose their document (crashed tab,
/// detached frame). The static adapter never produces one.
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("document unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of a parsed document.
///
/// Implementations must be cheap to query repeatedly; the engine issues many
/// small queries per scan. `query_all` receives selectors that have already
/// passed [`sanitize_selector`]; a selector the implementation cannot parse
/// yields an empty result, never an error. Only the loss of the document
/// itself is an error.
pub trait DomAdapter: Send + Sync {
    fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DomError>;
    fn tag_name(&self, handle: ElementHandle) -> Option<String>;
    fn attributes(&self, handle: ElementHandle) -> Vec<(String, String)>;
    fn computed_style(&self, handle: ElementHandle) -> ComputedStyle;
    fn bounding_rect(&self, handle: ElementHandle) -> Rect;
    fn children(&self, handle: ElementHandle) -> Vec<ElementHandle>;
    fn parent(&self, handle: ElementHandle) -> Option<ElementHandle>;
    /// Open shadow roots only; closed roots stay hidden.
    fn shadow_root(&self, handle: ElementHandle) -> Option<ElementHandle>;
    fn text_content(&self, handle: ElementHandle) -> String;
    /// Height of the laid-out document, used to observe growth after
    /// click/AJAX navigation.
    fn document_height(&self) -> f64;

    fn attribute(&self, handle: ElementHandle, name: &str) -> Option<String> {
        self.attributes(handle)
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Every descendant of `handle`, depth-first, excluding `handle` itself.
    fn descendants(&self, handle: ElementHandle) -> Vec<ElementHandle> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementHandle> = self.children(handle);
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut kids = self.children(next);
            kids.reverse();
            stack.extend(kids);
        }
        out
    }
}

/// Maximum accepted selector length. Anything longer is hostile or generated.
const MAX_SELECTOR_LEN: usize = 512;

/// Pre-parse gate for selectors coming from configuration or messages.
///
/// Rejects empty input, oversized input, and characters that never appear in
/// the selector grammar the engine uses (brace/semicolon injection, control
/// characters). Returns the trimmed selector on success.
#[must_use]
pub fn sanitize_selector(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_SELECTOR_LEN {
        return None;
    }
    let ok = trimmed.chars().all(|c| {
        c.is_alphanumeric()
            || c.is_whitespace()
            || matches!(
                c,
                '-' | '_' | '#' | '.' | '*' | ',' | ':' | '>' | '~' | '+' | '[' | ']' | '='
                    | '"' | '\'' | '(' | ')' | '^' | '$' | '|'
            )
    });
    if ok { Some(trimmed) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_selector_accepts_normal_grammar() {
        for sel in [
            "img",
            "*",
            "div.gallery > img",
            "a[rel='next']",
            "[data-src]",
            "ul.pagination li a, nav a",
            "section[aria-label*=\"gallery\"]",
        ] {
            assert!(sanitize_selector(sel).is_some(), "{sel} should pass");
        }
    }

    #[test]
    fn test_sanitize_selector_rejects_injection() {
        assert!(sanitize_selector("").is_none());
        assert!(sanitize_selector("   ").is_none());
        assert!(sanitize_selector("div { color: red }").is_none());
        assert!(sanitize_selector("img; drop").is_none());
        let huge = "a".repeat(600);
        assert!(sanitize_selector(&huge).is_none());
    }

    #[test]
    fn test_rect_helpers() {
        let r = Rect {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
        };
        assert!((r.area() - 5000.0).abs() < f64::EPSILON);
        assert!(!r.is_zero());
        assert!((r.center_x() - 60.0).abs() < f64::EPSILON);
        assert!(Rect::default().is_zero());
    }
}
