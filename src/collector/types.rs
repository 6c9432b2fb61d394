//! Record types produced by a scan.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::dom::ElementHandle;

/// Which embedding idiom produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryMethod {
    #[serde(rename = "img-src")]
    ImgSrc,
    #[serde(rename = "img-srcset")]
    ImgSrcset,
    #[serde(rename = "lazy-attr")]
    LazyAttr,
    #[serde(rename = "background-image")]
    BackgroundImage,
    #[serde(rename = "picture-source")]
    PictureSource,
    #[serde(rename = "picture-img")]
    PictureImg,
    #[serde(rename = "svg-image")]
    SvgImage,
    #[serde(rename = "anchor-href")]
    AnchorHref,
}

impl DiscoveryMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ImgSrc => "img-src",
            Self::ImgSrcset => "img-srcset",
            Self::LazyAttr => "lazy-attr",
            Self::BackgroundImage => "background-image",
            Self::PictureSource => "picture-source",
            Self::PictureImg => "picture-img",
            Self::SvgImage => "svg-image",
            Self::AnchorHref => "anchor-href",
        }
    }
}

/// Trust bucket for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageCategory {
    HighConfidence,
    SameOrigin,
    External,
}

/// Attributes snapshotted from the source element. Everything a consumer may
/// need after the document is gone lives here, not behind the handle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageAttributes {
    pub alt: Option<String>,
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub class: Option<String>,
    pub id: Option<String>,
}

/// One discovered image reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Canonical absolute URL; unique within one scan.
    pub url: Url,
    pub discovery_method: DiscoveryMethod,
    pub attributes: ImageAttributes,
    /// Borrowed handle into the adapter; invalid after navigation and never
    /// serialized.
    #[serde(skip, default)]
    pub element: ElementHandle,
    pub confidence: f64,
    pub category: ImageCategory,
    /// Offset from scan start when the record was created.
    pub collected_at: Duration,
}

/// Counters for one scan.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub records: usize,
    /// References whose canonical URL was already recorded.
    pub duplicates: u64,
    /// Per-element failures absorbed during the scan.
    pub element_errors: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

/// Scan output: records in discovery order plus the counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedImages {
    pub records: Vec<ImageRecord>,
    pub stats: ScanStats,
}
