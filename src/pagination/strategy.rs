//! Detection strategy and target types.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dom::ElementHandle;
use crate::urlnorm::UrlCanonicalizer;

/// How a next-page target was found. Parameterized variants carry the values
/// that produced the target so consumers can audit the inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    LearnedPattern,
    RelNext,
    QueryString { param: String, current: u32, next: u32 },
    PathBased { pattern: String, current: u32, next: u32 },
    NumberedList,
    TextMatch,
    ClassId,
    AriaLabel,
    ShadowDom,
    LoadMore,
}

impl Strategy {
    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::LearnedPattern => StrategyKind::LearnedPattern,
            Self::RelNext => StrategyKind::RelNext,
            Self::QueryString { .. } => StrategyKind::QueryString,
            Self::PathBased { .. } => StrategyKind::PathBased,
            Self::NumberedList => StrategyKind::NumberedList,
            Self::TextMatch => StrategyKind::TextMatch,
            Self::ClassId => StrategyKind::ClassId,
            Self::AriaLabel => StrategyKind::AriaLabel,
            Self::ShadowDom => StrategyKind::ShadowDom,
            Self::LoadMore => StrategyKind::LoadMore,
        }
    }
}

/// Fieldless discriminant used for failure bookkeeping and history entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    LearnedPattern,
    RelNext,
    QueryString,
    PathBased,
    NumberedList,
    TextMatch,
    ClassId,
    AriaLabel,
    ShadowDom,
    LoadMore,
}

/// What the engine should do to advance: fetch a URL, or click an element
/// (which may carry a URL hint for bookkeeping).
#[derive(Debug, Clone, PartialEq)]
pub enum PaginationTarget {
    Url(Url),
    ElementClick {
        handle: ElementHandle,
        target_url: Option<Url>,
    },
}

impl PaginationTarget {
    /// The navigable URL, if the target has one.
    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        match self {
            Self::Url(url) => Some(url),
            Self::ElementClick { target_url, .. } => target_url.as_ref(),
        }
    }
}

/// Execution model implied by a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaginationKind {
    UrlBased,
    ButtonBased,
    AjaxBased,
    InfiniteScroll,
    ShadowDom,
}

/// One candidate next-page move.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationDetection {
    pub strategy: Strategy,
    pub target: PaginationTarget,
    pub kind: PaginationKind,
    pub confidence: f64,
    /// Table position; lower wins confidence ties.
    pub priority: u8,
}

impl PaginationDetection {
    /// Construct a detection, rejecting placeholder targets (`#`,
    /// `javascript:`, `/null`) outright. A bad URL *hint* on a click target
    /// is dropped rather than rejecting the click itself.
    #[must_use]
    pub fn new(
        strategy: Strategy,
        target: PaginationTarget,
        kind: PaginationKind,
        confidence: f64,
        priority: u8,
        urls: &UrlCanonicalizer,
    ) -> Option<Self> {
        let target = match target {
            PaginationTarget::Url(url) => {
                if urls.is_bad_pagination_target(url.as_str()) {
                    return None;
                }
                PaginationTarget::Url(url)
            }
            PaginationTarget::ElementClick { handle, target_url } => PaginationTarget::ElementClick {
                handle,
                target_url: target_url
                    .filter(|u| !urls.is_bad_pagination_target(u.as_str())),
            },
        };
        Some(Self {
            strategy,
            target,
            kind,
            confidence,
            priority,
        })
    }
}
