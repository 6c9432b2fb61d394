//! Geometric layout classification for validated containers.

use crate::config::PatternConfig;
use crate::dom::{DomAdapter, ElementHandle, Rect};
use crate::scoring::signals::{cluster_values, mean_cluster_spread};

use super::{GalleryLayout, Orientation};

/// Class tokens that mark carousel/slider containers.
pub(crate) const CAROUSEL_TOKENS: &[&str] = &["carousel", "slider", "slideshow", "slides", "swiper", "slick"];

const NAV_TOKENS: &[&str] = &["prev", "next", "arrow", "nav"];
const INDICATOR_TOKENS: &[&str] = &["dot", "dots", "indicator", "indicators", "bullet", "bullets", "pagination"];
const MASONRY_TOKENS: &[&str] = &["masonry", "isotope"];

pub(crate) struct LayoutAnalysis {
    pub layout: GalleryLayout,
    /// Grid alignment quality in [0, 1]; non-grid layouts report a nominal value.
    pub consistency: f64,
}

/// Classify the container's layout from item geometry, falling back to class
/// vocabulary when the adapter reports no rectangles.
///
/// When several shapes apply the precedence is Grid > Carousel > Masonry > List.
pub(crate) fn classify(
    dom: &dyn DomAdapter,
    container: ElementHandle,
    items: &[ElementHandle],
    config: &PatternConfig,
) -> LayoutAnalysis {
    let rects: Vec<Rect> = items
        .iter()
        .map(|h| dom.bounding_rect(*h))
        .filter(|r| !r.is_zero())
        .collect();

    let container_class = dom
        .attribute(container, "class")
        .unwrap_or_default()
        .to_ascii_lowercase();
    let (has_nav, has_indicators) = nav_and_indicators(dom, container);
    let carousel_class = CAROUSEL_TOKENS.iter().any(|t| container_class.contains(t));
    let masonry_class = MASONRY_TOKENS.iter().any(|t| container_class.contains(t));

    if rects.len() < 2 {
        // No usable geometry: class vocabulary is all we have.
        let layout = if carousel_class || has_nav || has_indicators {
            GalleryLayout::Carousel {
                has_nav,
                has_indicators,
                visible_count: items.len(),
            }
        } else if masonry_class {
            GalleryLayout::Masonry { columns: 0 }
        } else {
            GalleryLayout::List {
                orientation: Orientation::Vertical,
            }
        };
        return LayoutAnalysis {
            layout,
            consistency: 0.5,
        };
    }

    let ys: Vec<f64> = rects.iter().map(|r| r.y).collect();
    let xs: Vec<f64> = rects.iter().map(|r| r.x).collect();
    let rows = cluster_values(&ys, config.grid_tolerance_px);
    let cols = cluster_values(&xs, config.grid_tolerance_px);
    let row_var = mean_cluster_spread(&rows);
    let col_var = mean_cluster_spread(&cols);

    let grid_like = rows.len() >= 2 && cols.len() >= 2;
    let grid_consistency = (0.9 - 0.1 * (row_var + col_var)).max(0.0);

    let heights: Vec<f64> = rects.iter().map(|r| r.height).collect();
    let height_variance = variance(&heights);
    let masonry_like =
        (height_variance > config.masonry_height_variance && cols.len() >= 2) || masonry_class;

    let carousel_like = carousel_class || has_nav || has_indicators;

    let shares_row = spread(&ys) <= config.axis_tolerance_px;
    let shares_col = spread(&xs) <= config.axis_tolerance_px;

    if grid_like && !masonry_like {
        return LayoutAnalysis {
            layout: GalleryLayout::Grid {
                rows: rows.len(),
                cols: cols.len(),
            },
            consistency: grid_consistency,
        };
    }
    if carousel_like {
        let container_rect = dom.bounding_rect(container);
        let visible_count = if container_rect.is_zero() {
            rects.len()
        } else {
            rects
                .iter()
                .filter(|r| r.x < container_rect.x + container_rect.width)
                .count()
        };
        return LayoutAnalysis {
            layout: GalleryLayout::Carousel {
                has_nav,
                has_indicators,
                visible_count,
            },
            consistency: 0.6,
        };
    }
    if masonry_like {
        return LayoutAnalysis {
            layout: GalleryLayout::Masonry { columns: cols.len() },
            consistency: 0.6,
        };
    }

    let orientation = if shares_row && !shares_col {
        Orientation::Horizontal
    } else {
        Orientation::Vertical
    };
    LayoutAnalysis {
        layout: GalleryLayout::List { orientation },
        consistency: if shares_row || shares_col { 0.7 } else { 0.4 },
    }
}

/// Minimum item count for the classified layout.
pub(crate) fn minimum_items(layout: &GalleryLayout, config: &PatternConfig) -> usize {
    match layout {
        GalleryLayout::Grid { .. } => config.grid_min_items,
        GalleryLayout::List { .. } => config.list_min_items,
        GalleryLayout::Carousel { .. } => config.carousel_min_items,
        GalleryLayout::Masonry { .. } => config.masonry_min_items,
    }
}

fn nav_and_indicators(dom: &dyn DomAdapter, container: ElementHandle) -> (bool, bool) {
    let mut has_nav = false;
    let mut has_indicators = false;
    for child in dom.descendants(container) {
        let class = dom
            .attribute(child, "class")
            .unwrap_or_default()
            .to_ascii_lowercase();
        if class.is_empty() {
            continue;
        }
        if NAV_TOKENS.iter().any(|t| class.contains(t)) {
            has_nav = true;
        }
        if INDICATOR_TOKENS.iter().any(|t| class.contains(t)) {
            has_indicators = true;
        }
        if has_nav && has_indicators {
            break;
        }
    }
    (has_nav, has_indicators)
}

fn spread(values: &[f64]) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > min { max - min } else { 0.0 }
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}
