//! URL canonicalization for image discovery and pagination.
//!
//! Every URL that enters the engine passes through [`UrlCanonicalizer`] first.
//! The canonical form (absolute, lower-cased host, fragment stripped) is the
//! identity used for deduplication and loop detection, so the same resource
//! referenced as `//cdn.ex.com/a.jpg`, `/a.jpg`, and `https://CDN.ex.com/a.jpg#x`
//! collapses to a single record.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Extensions treated as image-bearing when they appear as a path suffix or segment.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "tiff", "avif",
];

static IMAGE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(image|photo)\b").expect("BUG: hardcoded image token regex is invalid")
});

/// Normalizes raw href/src strings against a base document URL.
#[derive(Debug, Clone)]
pub struct UrlCanonicalizer {
    strip_query: bool,
    image_extensions: Vec<String>,
}

impl Default for UrlCanonicalizer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl UrlCanonicalizer {
    /// Create a canonicalizer.
    ///
    /// # Arguments
    /// * `strip_query` - Drop the query string from canonical forms. Useful for
    ///   sites that thread session tokens through every link.
    #[must_use]
    pub fn new(strip_query: bool) -> Self {
        Self {
            strip_query,
            image_extensions: IMAGE_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Override the configured image extension set.
    #[must_use]
    pub fn with_image_extensions(mut self, extensions: Vec<String>) -> Self {
        self.image_extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Resolve a raw reference against `base` into a canonical absolute URL.
    ///
    /// Handles protocol-relative (`//host/path`) and path-relative forms.
    /// Returns `None` for empty input, non-fetchable schemes (`data:`,
    /// `mailto:`, `tel:`, `javascript:`), and anything the `url` crate
    /// cannot resolve.
    #[must_use]
    pub fn canonicalize(&self, raw: &str, base: &Url) -> Option<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let lowered = raw.to_ascii_lowercase();
        if lowered.starts_with("data:")
            || lowered.starts_with("mailto:")
            || lowered.starts_with("tel:")
            || lowered.starts_with("javascript:")
        {
            return None;
        }

        let resolved = if let Some(rest) = raw.strip_prefix("//") {
            Url::parse(&format!("{}://{}", base.scheme(), rest)).ok()?
        } else {
            base.join(raw).ok()?
        };

        if !matches!(resolved.scheme(), "http" | "https") {
            return None;
        }

        let mut canonical = resolved;
        // Fragments name positions inside one resource, never distinct resources.
        canonical.set_fragment(None);
        if self.strip_query {
            canonical.set_query(None);
        }
        Some(canonical)
    }

    /// Whether a canonical URL plausibly names an image.
    ///
    /// True when the path ends with a configured extension, contains one as a
    /// path segment, or the path/query carries an `image`/`photo` token.
    /// Over-matching (`/jpeg/` directories without image content) is accepted
    /// here; callers that download should re-validate by MIME type.
    #[must_use]
    pub fn looks_like_image(&self, url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();

        if let Some(ext) = path.rsplit('.').next()
            && path.contains('.')
            && self.image_extensions.iter().any(|e| e == ext)
        {
            return true;
        }

        if path
            .split('/')
            .any(|segment| self.image_extensions.iter().any(|e| e == segment))
        {
            return true;
        }

        if IMAGE_TOKEN_RE.is_match(&path) {
            return true;
        }
        url.query().is_some_and(|q| IMAGE_TOKEN_RE.is_match(q))
    }

    /// Whether a raw pagination target is one of the placeholder forms that
    /// must never be navigated: `#` fragments, any `javascript:` URL, a
    /// host-less `null`, or a `/null` path.
    #[must_use]
    pub fn is_bad_pagination_target(&self, raw: &str) -> bool {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "#" || trimmed.starts_with('#') {
            return true;
        }

        let lowered = trimmed.to_ascii_lowercase();
        if lowered.starts_with("javascript:") {
            return true;
        }
        if lowered == "null" || lowered == "/null" || lowered.ends_with("/null") {
            return true;
        }

        if let Ok(parsed) = Url::parse(trimmed) {
            if parsed.scheme() == "javascript" {
                return true;
            }
            if parsed.path() == "/null" {
                return true;
            }
        }
        false
    }

    /// Whether two URLs share scheme, host, and port.
    #[must_use]
    pub fn same_origin(&self, a: &Url, b: &Url) -> bool {
        a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn base() -> Result<Url> {
        Ok(Url::parse("https://example.com/gallery/page?x=1")?)
    }

    #[test]
    fn test_resolves_relative_and_protocol_relative() -> Result<()> {
        let c = UrlCanonicalizer::default();
        let base = base()?;

        let rel = c.canonicalize("thumbs/a.jpg", &base);
        assert_eq!(
            rel.map(|u| u.to_string()),
            Some("https://example.com/gallery/thumbs/a.jpg".to_string())
        );

        let proto = c.canonicalize("//cdn.example.com/b.png", &base);
        assert_eq!(
            proto.map(|u| u.to_string()),
            Some("https://cdn.example.com/b.png".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_rejects_non_fetchable_schemes() -> Result<()> {
        let c = UrlCanonicalizer::default();
        let base = base()?;
        assert!(c.canonicalize("data:image/png;base64,AAAA", &base).is_none());
        assert!(c.canonicalize("javascript:void(0)", &base).is_none());
        assert!(c.canonicalize("mailto:a@b.c", &base).is_none());
        assert!(c.canonicalize("tel:+123", &base).is_none());
        Ok(())
    }

    #[test]
    fn test_canonicalize_is_idempotent() -> Result<()> {
        let c = UrlCanonicalizer::default();
        let base = base()?;
        let once = c
            .canonicalize("//CDN.Example.com/a.jpg#frag", &base)
            .ok_or_else(|| anyhow::anyhow!("first pass failed"))?;
        let twice = c
            .canonicalize(once.as_str(), &base)
            .ok_or_else(|| anyhow::anyhow!("second pass failed"))?;
        assert_eq!(once, twice);
        Ok(())
    }

    #[test]
    fn test_strip_query_option() -> Result<()> {
        let c = UrlCanonicalizer::new(true);
        let base = base()?;
        let url = c.canonicalize("/p?page=2", &base);
        assert_eq!(
            url.map(|u| u.to_string()),
            Some("https://example.com/p".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_looks_like_image() -> Result<()> {
        let c = UrlCanonicalizer::default();
        let base = base()?;
        for raw in [
            "https://example.com/a.JPG",
            "https://example.com/jpeg/12345",
            "https://example.com/photo/view?id=2",
            "https://example.com/x?image=full",
        ] {
            let url = c
                .canonicalize(raw, &base)
                .ok_or_else(|| anyhow::anyhow!("canonicalize failed for {raw}"))?;
            assert!(c.looks_like_image(&url), "{raw} should look like an image");
        }
        let plain = c
            .canonicalize("https://example.com/about.html", &base)
            .ok_or_else(|| anyhow::anyhow!("canonicalize failed"))?;
        assert!(!c.looks_like_image(&plain));
        Ok(())
    }

    #[test]
    fn test_bad_pagination_targets() {
        let c = UrlCanonicalizer::default();
        assert!(c.is_bad_pagination_target("#"));
        assert!(c.is_bad_pagination_target("/null"));
        assert!(c.is_bad_pagination_target("javascript:void(0)"));
        assert!(c.is_bad_pagination_target("JavaScript:next()"));
        assert!(c.is_bad_pagination_target("https://example.com/null"));
        assert!(!c.is_bad_pagination_target("https://example.com/page/2"));
        assert!(!c.is_bad_pagination_target("/page/2"));
    }
}
