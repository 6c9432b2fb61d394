//! Static HTML adapter backed by `scraper`.
//!
//! Parses a document once into an owned element arena (tag, attributes, text,
//! parent/child indices) so the adapter is `Send + Sync` and handles are plain
//! indices. Geometry comes from `width`/`height`/`data-x`/`data-y` attributes
//! and inline styles; a browser-backed adapter reports real layout instead.
//!
//! Selector queries re-parse the retained source with `scraper` and map the
//! matches back to arena indices by document order, which is deterministic for
//! identical input. Documents here are single pages, so the re-parse cost is
//! acceptable; hot callers should batch their queries.

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

use super::{ComputedStyle, DomAdapter, DomError, ElementHandle, Rect, sanitize_selector};

const INLINE_TAGS: &[&str] = &[
    "a", "span", "em", "strong", "b", "i", "u", "small", "label", "abbr", "code", "sub", "sup",
];

#[derive(Debug, Clone)]
struct ArenaElement {
    tag: String,
    attributes: Vec<(String, String)>,
    parent: Option<u32>,
    children: Vec<u32>,
    text: String,
    style: ComputedStyle,
    rect: Rect,
}

/// `DomAdapter` over a parsed, static HTML document.
#[derive(Debug, Clone)]
pub struct StaticDomAdapter {
    html: String,
    elements: Vec<ArenaElement>,
}

impl StaticDomAdapter {
    /// Parse an HTML document into an adapter.
    #[must_use]
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let ordered: Vec<ElementRef<'_>> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .collect();

        let index_of: HashMap<NodeId, u32> = ordered
            .iter()
            .enumerate()
            .map(|(i, el)| (el.id(), i as u32))
            .collect();

        let mut elements = Vec::with_capacity(ordered.len());
        for el in &ordered {
            let tag = el.value().name().to_ascii_lowercase();
            let attributes: Vec<(String, String)> = el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            let parent = el
                .parent()
                .and_then(ElementRef::wrap)
                .and_then(|p| index_of.get(&p.id()).copied());
            let children: Vec<u32> = el
                .children()
                .filter_map(ElementRef::wrap)
                .filter_map(|c| index_of.get(&c.id()).copied())
                .collect();
            let text = el.text().collect::<String>().trim().to_string();
            let style = synthesize_style(&tag, &attributes);
            let rect = synthesize_rect(&attributes);

            elements.push(ArenaElement {
                tag,
                attributes,
                parent,
                children,
                text,
                style,
                rect,
            });
        }

        Self {
            html: html.to_string(),
            elements,
        }
    }

    /// Number of elements in the document.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn get(&self, handle: ElementHandle) -> Option<&ArenaElement> {
        self.elements.get(handle.raw() as usize)
    }
}

impl DomAdapter for StaticDomAdapter {
    fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DomError> {
        let Some(clean) = sanitize_selector(selector) else {
            log::debug!("rejected selector: {selector:?}");
            return Ok(Vec::new());
        };
        let Ok(parsed) = Selector::parse(clean) else {
            log::debug!("unparseable selector: {clean:?}");
            return Ok(Vec::new());
        };

        // Re-parse and rebuild the document-order index; identical input
        // yields identical order, so arena handles stay valid.
        let document = Html::parse_document(&self.html);
        let index_of: HashMap<NodeId, u32> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .enumerate()
            .map(|(i, el)| (el.id(), i as u32))
            .collect();

        let mut out: Vec<ElementHandle> = document
            .select(&parsed)
            .filter_map(|m| index_of.get(&m.id()).copied())
            .map(ElementHandle::from_raw)
            .collect();
        out.sort_by_key(|h| h.raw());
        out.dedup();
        Ok(out)
    }

    fn tag_name(&self, handle: ElementHandle) -> Option<String> {
        self.get(handle).map(|e| e.tag.clone())
    }

    fn attributes(&self, handle: ElementHandle) -> Vec<(String, String)> {
        self.get(handle).map(|e| e.attributes.clone()).unwrap_or_default()
    }

    fn computed_style(&self, handle: ElementHandle) -> ComputedStyle {
        self.get(handle).map(|e| e.style.clone()).unwrap_or_default()
    }

    fn bounding_rect(&self, handle: ElementHandle) -> Rect {
        self.get(handle).map(|e| e.rect).unwrap_or_default()
    }

    fn children(&self, handle: ElementHandle) -> Vec<ElementHandle> {
        self.get(handle)
            .map(|e| e.children.iter().copied().map(ElementHandle::from_raw).collect())
            .unwrap_or_default()
    }

    fn parent(&self, handle: ElementHandle) -> Option<ElementHandle> {
        self.get(handle)?.parent.map(ElementHandle::from_raw)
    }

    fn shadow_root(&self, handle: ElementHandle) -> Option<ElementHandle> {
        // Static documents mark shadow roots explicitly: declarative shadow
        // DOM template contents are not part of scraper's flat tree.
        let children = self.get(handle)?.children.clone();
        for child in children {
            let h = ElementHandle::from_raw(child);
            let el = self.get(h)?;
            let mode = el
                .attributes
                .iter()
                .find(|(k, _)| k == "data-shadow-root" || k == "shadowrootmode")
                .map(|(_, v)| v.to_ascii_lowercase());
            match mode.as_deref() {
                Some("open") => return Some(h),
                Some(_) => return None,
                None => {}
            }
        }
        None
    }

    fn text_content(&self, handle: ElementHandle) -> String {
        self.get(handle).map(|e| e.text.clone()).unwrap_or_default()
    }

    fn document_height(&self) -> f64 {
        self.elements
            .iter()
            .map(|e| e.rect.y + e.rect.height)
            .fold(0.0, f64::max)
    }
}

fn attr<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn style_property(style: &str, property: &str) -> Option<String> {
    style.split(';').find_map(|decl| {
        let (key, value) = decl.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(property) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

fn px_value(raw: &str) -> Option<f64> {
    raw.trim().trim_end_matches("px").trim().parse::<f64>().ok()
}

fn synthesize_style(tag: &str, attributes: &[(String, String)]) -> ComputedStyle {
    let mut style = ComputedStyle {
        display: if INLINE_TAGS.contains(&tag) {
            "inline".to_string()
        } else if tag == "img" {
            "inline-block".to_string()
        } else {
            "block".to_string()
        },
        ..ComputedStyle::default()
    };

    if attr(attributes, "hidden").is_some() {
        style.display = "none".to_string();
    }

    if let Some(inline) = attr(attributes, "style") {
        if let Some(display) = style_property(inline, "display") {
            style.display = display;
        }
        if let Some(visibility) = style_property(inline, "visibility") {
            style.visibility = visibility;
        }
        if let Some(opacity) = style_property(inline, "opacity")
            && let Ok(value) = opacity.parse::<f64>()
        {
            style.opacity = value;
        }
        if let Some(overflow) = style_property(inline, "overflow") {
            style.overflow_x = overflow.clone();
            style.overflow_y = overflow;
        }
        if let Some(overflow_x) = style_property(inline, "overflow-x") {
            style.overflow_x = overflow_x;
        }
        if let Some(overflow_y) = style_property(inline, "overflow-y") {
            style.overflow_y = overflow_y;
        }
        style.background_image = style_property(inline, "background-image");
    }

    style
}

fn synthesize_rect(attributes: &[(String, String)]) -> Rect {
    let inline = attr(attributes, "style");

    let width = attr(attributes, "data-width")
        .or_else(|| attr(attributes, "width"))
        .and_then(px_value)
        .or_else(|| inline.and_then(|s| style_property(s, "width")).as_deref().and_then(px_value))
        .unwrap_or(0.0);
    let height = attr(attributes, "data-height")
        .or_else(|| attr(attributes, "height"))
        .and_then(px_value)
        .or_else(|| inline.and_then(|s| style_property(s, "height")).as_deref().and_then(px_value))
        .unwrap_or(0.0);
    let x = attr(attributes, "data-x").and_then(px_value).unwrap_or(0.0);
    let y = attr(attributes, "data-y").and_then(px_value).unwrap_or(0.0);

    Rect { x, y, width, height }
}
