//! Localized "next page" vocabulary and URL shape patterns.

use regex::Regex;
use std::sync::LazyLock;

/// Exact "next" labels, lower-cased, across the supported locales.
pub const NEXT_TEXTS: &[&str] = &[
    // English
    "next",
    "next page",
    "older",
    "older posts",
    // Spanish
    "siguiente",
    "página siguiente",
    // French
    "suivant",
    "suivante",
    "page suivante",
    // German
    "weiter",
    "nächste",
    "nächste seite",
    // Japanese
    "次へ",
    "次",
    "次のページ",
    // Korean
    "다음",
    "다음 페이지",
    // Chinese (simplified / traditional)
    "下一页",
    "下页",
    "下一頁",
    "下頁",
    // Portuguese
    "próximo",
    "próxima",
    "seguinte",
    // Dutch
    "volgende",
    // Swedish
    "nästa",
    // Norwegian / Danish
    "neste",
    "næste",
];

/// Directional glyphs that read as "next".
pub const ARROW_GLYPHS: &[&str] = &["→", "›", "»", "⟩", "⇨", "➔", "➜", "➡"];

/// Labels that load additional items into the current page.
pub const LOAD_MORE_TEXTS: &[&str] = &[
    "load more",
    "show more",
    "see more",
    "view more",
    "more photos",
    "more images",
    "load additional",
];

/// Query parameters that carry a page number, in preference order.
pub const PAGE_PARAMS: &[&str] = &[
    "page",
    "p",
    "pg",
    "pagenum",
    "paged",
    "pageNumber",
    "page_number",
    "offset",
    "start",
];

static NEXT_ARIA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(go to next|navigate to next|next page|next)\b")
        .expect("BUG: hardcoded aria-label regex is invalid")
});

static NEXT_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\bnext\b|pagination.*next|\bforward\b|arrow.*right|chevron.*right)")
        .expect("BUG: hardcoded class/id regex is invalid")
});

static PATH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(?P<pre>.*/page/)(?P<n>\d+)(?P<suf>/?)$",
        r"^(?P<pre>.*/p/)(?P<n>\d+)(?P<suf>/?)$",
        r"^(?P<pre>.*/pg/)(?P<n>\d+)(?P<suf>/?)$",
        r"^(?P<pre>.*page-)(?P<n>\d+)(?P<suf>/?)$",
        r"^(?P<pre>.*/)(?P<n>\d+)(?P<suf>/?)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("BUG: hardcoded path pattern regex is invalid"))
    .collect()
});

/// Whether visible element text reads as "next" in any supported locale,
/// including bare arrow glyphs and labels with trailing decoration
/// (`"Next »"`).
#[must_use]
pub fn is_next_text(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() || normalized.len() > 64 {
        return false;
    }
    if ARROW_GLYPHS.iter().any(|g| normalized.contains(g)) {
        return true;
    }
    let stripped: String = normalized
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string();
    NEXT_TEXTS.contains(&stripped.as_str())
}

/// Whether element text reads as a load-more affordance.
#[must_use]
pub fn is_load_more_text(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() || normalized.len() > 64 {
        return false;
    }
    let stripped = normalized.trim_matches(|c: char| !c.is_alphanumeric());
    LOAD_MORE_TEXTS.contains(&stripped)
}

/// Whether an `aria-label` announces next-page navigation.
#[must_use]
pub fn is_next_aria_label(label: &str) -> bool {
    NEXT_ARIA_RE.is_match(label)
}

/// Whether a class/id string names a next control.
#[must_use]
pub fn is_next_class_or_id(value: &str) -> bool {
    NEXT_CLASS_RE.is_match(value)
}

/// A path that embeds a page number, with the number factored out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// The path with the number replaced by `{N}`.
    pub template: String,
    pub number: u32,
}

/// Match a URL path against the known numbered-path shapes
/// (`/page/N`, `/p/N`, `/pg/N`, `page-N`, trailing `/N`).
#[must_use]
pub fn match_path_pattern(path: &str) -> Option<PathMatch> {
    for pattern in PATH_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(path) {
            let number: u32 = caps.name("n")?.as_str().parse().ok()?;
            let template = format!(
                "{}{{N}}{}",
                caps.name("pre").map_or("", |m| m.as_str()),
                caps.name("suf").map_or("", |m| m.as_str())
            );
            return Some(PathMatch { template, number });
        }
    }
    None
}

/// Substitute a page number back into a path template.
#[must_use]
pub fn apply_path_template(template: &str, number: u32) -> String {
    template.replace("{N}", &number.to_string())
}
