//! Individual confidence signals.
//!
//! Each signal is a pure function from the candidate pattern to a score in
//! [0, 1] plus a human-readable detail line. The scorer combines them as a
//! weighted mean; nothing here looks at the weights.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use super::{ScoreInput, SignalScore};
use crate::dom::Rect;

static GALLERY_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(gallery|galleries|album|photos?|portfolio|collection|images?)\b")
        .expect("BUG: hardcoded gallery URL regex is invalid")
});

static PAGINATION_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([?&](page|p|pg|paged|offset|start)=\d+|/page[/-]\d+)")
        .expect("BUG: hardcoded pagination URL regex is invalid")
});

static FRAMEWORK_HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(css-[a-z0-9]{4,}|jsx-\d+|sc-[a-zA-Z0-9]{4,}|svelte-[a-z0-9]{4,})")
        .expect("BUG: hardcoded framework hash regex is invalid")
});

static POSITIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":nth-(child|of-type)\(")
        .expect("BUG: hardcoded positional selector regex is invalid")
});

/// Attributes that mark an element as lazily loaded.
pub const LAZY_ATTRIBUTES: &[&str] = &[
    "data-src",
    "data-lazy-src",
    "data-original",
    "data-lazy",
    "data-srcset",
    "data-background",
];

/// Class tokens used by lazy-loading conventions.
pub const LAZY_CLASS_TOKENS: &[&str] = &["lazy", "lazyload", "lazy-loading"];

/// Class roots of known lazy-loading libraries.
const LAZY_LIBRARY_TOKENS: &[&str] = &["lazysizes", "lozad", "b-lazy", "blazy", "ll-", "unveil"];

/// Gallery/pagination vocabulary in the page URL.
pub fn url_pattern(page_url: &Url) -> SignalScore {
    let text = page_url.as_str();
    let gallery = GALLERY_URL_RE.is_match(text);
    let paginated = PAGINATION_URL_RE.is_match(text);

    let (score, detail) = match (gallery, paginated) {
        (true, true) => (0.9, "gallery and pagination tokens in URL"),
        (true, false) => (0.6, "gallery token in URL"),
        (false, true) => (0.5, "pagination token in URL"),
        (false, false) => (0.2, "no gallery vocabulary in URL"),
    };
    SignalScore {
        score,
        detail: detail.to_string(),
    }
}

/// How likely the selector is to survive a site redeploy.
pub fn selector_stability(selector: &str) -> SignalScore {
    let mut score: f64 = if selector.contains("[data-") {
        0.9
    } else if selector.contains('#') {
        0.8
    } else if selector.contains('.') {
        0.6
    } else {
        0.4
    };
    let mut notes: Vec<&str> = Vec::new();

    if POSITIONAL_RE.is_match(selector) {
        score -= 0.3;
        notes.push("positional selector");
    }
    if FRAMEWORK_HASH_RE.is_match(selector) {
        score -= 0.2;
        notes.push("framework-hashed class");
    }
    if selector
        .split(['.', ' ', '>', '#'])
        .any(|token| token.len() >= 16 && token.chars().any(|c| c.is_ascii_digit()))
    {
        score -= 0.1;
        notes.push("long generated token");
    }

    let detail = if notes.is_empty() {
        "stable selector shape".to_string()
    } else {
        notes.join(", ")
    };
    SignalScore {
        score: score.clamp(0.0, 1.0),
        detail,
    }
}

/// Row/column alignment of the item rectangles.
pub fn layout_consistency(input: &ScoreInput<'_>, tolerance: f64) -> SignalScore {
    let rects: Vec<Rect> = input
        .items
        .iter()
        .map(|h| input.dom.bounding_rect(*h))
        .filter(|r| !r.is_zero())
        .collect();
    if rects.len() < 2 {
        return SignalScore {
            score: 0.3,
            detail: "insufficient geometry".to_string(),
        };
    }

    let rows = cluster_values(&rects.iter().map(|r| r.y).collect::<Vec<_>>(), tolerance);
    let cols = cluster_values(&rects.iter().map(|r| r.x).collect::<Vec<_>>(), tolerance);
    let row_var = mean_cluster_spread(&rows);
    let col_var = mean_cluster_spread(&cols);
    let aspect_var = aspect_ratio_variance(&rects);

    if rows.len() >= 2 && cols.len() >= 2 {
        let mut score = (0.9 - 0.1 * (row_var + col_var)).max(0.0);
        if aspect_var > 0.5 {
            score = (score - 0.1).max(0.0);
        }
        SignalScore {
            score,
            detail: format!("{} rows × {} columns aligned", rows.len(), cols.len()),
        }
    } else if rows.len() == 1 || cols.len() == 1 {
        SignalScore {
            score: 0.7,
            detail: "single-axis alignment".to_string(),
        }
    } else {
        SignalScore {
            score: 0.4,
            detail: "irregular positions".to_string(),
        }
    }
}

/// Average of min(width, height) against the configured thresholds.
pub fn image_dimensions(input: &ScoreInput<'_>, min_px: f64, optimal_px: f64) -> SignalScore {
    let mins: Vec<f64> = input
        .items
        .iter()
        .map(|h| input.dom.bounding_rect(*h))
        .filter(|r| !r.is_zero())
        .map(|r| r.width.min(r.height))
        .collect();
    if mins.is_empty() {
        return SignalScore {
            score: 0.3,
            detail: "no dimension data".to_string(),
        };
    }

    let avg = mins.iter().sum::<f64>() / mins.len() as f64;
    let mut score: f64 = if avg >= optimal_px {
        0.9
    } else if avg >= (optimal_px + min_px) / 2.0 {
        0.7
    } else if avg >= min_px {
        0.5
    } else {
        0.3
    };

    let rects: Vec<Rect> = input
        .items
        .iter()
        .map(|h| input.dom.bounding_rect(*h))
        .filter(|r| !r.is_zero())
        .collect();
    if aspect_ratio_variance(&rects) < 0.1 {
        score = (score + 0.1).min(1.0);
    }

    SignalScore {
        score,
        detail: format!("average min dimension {avg:.0}px over {} items", mins.len()),
    }
}

/// Fraction of items wired for lazy loading, plus library detection.
pub fn lazy_load_readiness(input: &ScoreInput<'_>) -> SignalScore {
    if input.items.is_empty() {
        return SignalScore {
            score: 0.2,
            detail: "no items".to_string(),
        };
    }

    let lazy_count = input
        .items
        .iter()
        .filter(|h| {
            let attrs = input.dom.attributes(**h);
            attrs.iter().any(|(k, v)| {
                LAZY_ATTRIBUTES.contains(&k.as_str())
                    || (k == "loading" && v.eq_ignore_ascii_case("lazy"))
                    || (k == "class"
                        && v.split_whitespace()
                            .any(|c| LAZY_CLASS_TOKENS.contains(&c)))
            })
        })
        .count();
    let fraction = lazy_count as f64 / input.items.len() as f64;

    let container_class = input
        .dom
        .attribute(input.container, "class")
        .unwrap_or_default()
        .to_ascii_lowercase();
    let library = LAZY_LIBRARY_TOKENS
        .iter()
        .find(|t| container_class.contains(*t));

    let score = if library.is_some() {
        0.9
    } else {
        0.2 + 0.7 * fraction
    };
    let detail = match library {
        Some(lib) => format!("lazy library marker {lib:?}"),
        None => format!("{lazy_count}/{} items lazy-wired", input.items.len()),
    };
    SignalScore { score, detail }
}

/// Piecewise score on the raw item count.
pub fn element_count(count: usize) -> SignalScore {
    let score = match count {
        n if n >= 20 => 0.9,
        n if n >= 10 => 0.7,
        n if n >= 5 => 0.5,
        n if n >= 3 => 0.4,
        _ => 0.2,
    };
    SignalScore {
        score,
        detail: format!("{count} items"),
    }
}

/// Group values into clusters whose members lie within `tolerance` of the
/// cluster's first member. Input order does not matter.
pub(crate) fn cluster_values(values: &[f64], tolerance: f64) -> Vec<Vec<f64>> {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut clusters: Vec<Vec<f64>> = Vec::new();
    for value in sorted {
        match clusters.last_mut() {
            Some(cluster)
                if cluster
                    .first()
                    .is_some_and(|anchor| (value - anchor).abs() <= tolerance) =>
            {
                cluster.push(value);
            }
            _ => clusters.push(vec![value]),
        }
    }
    clusters
}

/// Mean intra-cluster spread, normalized so perfectly-aligned clusters are 0.
pub(crate) fn mean_cluster_spread(clusters: &[Vec<f64>]) -> f64 {
    if clusters.is_empty() {
        return 0.0;
    }
    let total: f64 = clusters
        .iter()
        .map(|c| {
            let min = c.iter().copied().fold(f64::INFINITY, f64::min);
            let max = c.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max > min { (max - min) / 10.0 } else { 0.0 }
        })
        .sum();
    total / clusters.len() as f64
}

fn aspect_ratio_variance(rects: &[Rect]) -> f64 {
    let ratios: Vec<f64> = rects
        .iter()
        .filter(|r| r.height > 0.0)
        .map(|r| r.width / r.height)
        .collect();
    if ratios.len() < 2 {
        return 0.0;
    }
    let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / ratios.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_values_groups_within_tolerance() {
        let clusters = cluster_values(&[0.0, 2.0, 1.0, 100.0, 101.0, 200.0], 10.0);
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].len(), 3);
        assert_eq!(clusters[1].len(), 2);
    }

    #[test]
    fn test_element_count_piecewise() {
        assert!((element_count(25).score - 0.9).abs() < f64::EPSILON);
        assert!((element_count(12).score - 0.7).abs() < f64::EPSILON);
        assert!((element_count(6).score - 0.5).abs() < f64::EPSILON);
        assert!((element_count(3).score - 0.4).abs() < f64::EPSILON);
        assert!((element_count(1).score - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_selector_stability_prefers_data_attributes() {
        let data = selector_stability("[data-gallery] img");
        let hashed = selector_stability(".css-1x2y3z4 img");
        let positional = selector_stability("div:nth-child(3) img");
        assert!(data.score > hashed.score);
        assert!(hashed.score > positional.score);
    }

    #[test]
    fn test_url_pattern_scores() {
        let gallery = Url::parse("https://ex.com/gallery/cats?page=2").expect("valid url");
        let plain = Url::parse("https://ex.com/about").expect("valid url");
        assert!(url_pattern(&gallery).score > 0.8);
        assert!((url_pattern(&plain).score - 0.2).abs() < f64::EPSILON);
    }
}
