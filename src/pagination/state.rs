//! Traversal state: visited sets, content digests, and history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use url::Url;

use super::strategy::StrategyKind;
use crate::dom::DomAdapter;

/// One successful navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationRecord {
    pub url: Option<Url>,
    pub page: u32,
    pub strategy: StrategyKind,
    pub timestamp: DateTime<Utc>,
}

/// Serializable view of the state, broadcast to subscribers and persisted on
/// every successful navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationSnapshot {
    pub current_page: u32,
    pub visited_urls: Vec<String>,
    /// Hex-encoded SHA-256 digests.
    pub visited_hashes: Vec<String>,
    pub history: Vec<NavigationRecord>,
    pub failed_strategies: Vec<StrategyKind>,
    pub last_successful_strategy: Option<StrategyKind>,
}

/// Mutable traversal state owned by the engine. A URL enters `visited_urls`
/// at most once; advancing requires the loop guard in the engine.
#[derive(Debug, Clone)]
pub struct PaginationState {
    current_page: u32,
    visited_urls: HashSet<String>,
    visited_hashes: HashSet<[u8; 32]>,
    history: VecDeque<NavigationRecord>,
    failed_strategies: HashSet<StrategyKind>,
    last_successful_strategy: Option<StrategyKind>,
    history_cap: usize,
}

impl PaginationState {
    #[must_use]
    pub fn new(history_cap: usize) -> Self {
        Self {
            current_page: 1,
            visited_urls: HashSet::new(),
            visited_hashes: HashSet::new(),
            history: VecDeque::new(),
            failed_strategies: HashSet::new(),
            last_successful_strategy: None,
            history_cap: history_cap.max(1),
        }
    }

    #[must_use]
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    #[must_use]
    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited_urls.contains(url.as_str())
    }

    /// Record a URL as visited. Returns false if it was already present.
    pub fn mark_visited(&mut self, url: &Url) -> bool {
        self.visited_urls.insert(url.to_string())
    }

    #[must_use]
    pub fn has_content_hash(&self, hash: &[u8; 32]) -> bool {
        self.visited_hashes.contains(hash)
    }

    /// Record a content digest. Returns false if it was already present.
    pub fn mark_content_hash(&mut self, hash: [u8; 32]) -> bool {
        self.visited_hashes.insert(hash)
    }

    #[must_use]
    pub fn failed_strategies(&self) -> &HashSet<StrategyKind> {
        &self.failed_strategies
    }

    pub fn mark_strategy_failed(&mut self, kind: StrategyKind) {
        self.failed_strategies.insert(kind);
    }

    #[must_use]
    pub fn last_successful_strategy(&self) -> Option<StrategyKind> {
        self.last_successful_strategy
    }

    /// Record a successful navigation: bump the page counter, remember the
    /// URL, and append to the bounded history ring.
    pub fn record_navigation(&mut self, url: Option<Url>, strategy: StrategyKind) {
        self.current_page += 1;
        if let Some(url) = &url {
            self.visited_urls.insert(url.to_string());
        }
        if self.history.len() >= self.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(NavigationRecord {
            url,
            page: self.current_page,
            strategy,
            timestamp: Utc::now(),
        });
        self.last_successful_strategy = Some(strategy);
    }

    #[must_use]
    pub fn history(&self) -> impl Iterator<Item = &NavigationRecord> {
        self.history.iter()
    }

    #[must_use]
    pub fn snapshot(&self) -> PaginationSnapshot {
        let mut visited_urls: Vec<String> = self.visited_urls.iter().cloned().collect();
        visited_urls.sort();
        let mut visited_hashes: Vec<String> =
            self.visited_hashes.iter().map(hex::encode).collect();
        visited_hashes.sort();
        PaginationSnapshot {
            current_page: self.current_page,
            visited_urls,
            visited_hashes,
            history: self.history.iter().cloned().collect(),
            failed_strategies: self.failed_strategies.iter().copied().collect(),
            last_successful_strategy: self.last_successful_strategy,
        }
    }

    /// Rebuild state from a persisted snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: PaginationSnapshot, history_cap: usize) -> Self {
        let visited_hashes = snapshot
            .visited_hashes
            .iter()
            .filter_map(|h| {
                let bytes = hex::decode(h).ok()?;
                <[u8; 32]>::try_from(bytes.as_slice()).ok()
            })
            .collect();
        Self {
            current_page: snapshot.current_page,
            visited_urls: snapshot.visited_urls.into_iter().collect(),
            visited_hashes,
            history: snapshot.history.into(),
            failed_strategies: snapshot.failed_strategies.into_iter().collect(),
            last_successful_strategy: snapshot.last_successful_strategy,
            history_cap: history_cap.max(1),
        }
    }
}

/// SHA-256 over whitespace-normalized text.
#[must_use]
pub fn content_hash(text: &str) -> [u8; 32] {
    let normalized: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Sha256::digest(normalized.as_bytes()).into()
}

/// Text of the page's main content region: the largest of the usual semantic
/// containers, falling back to `<body>`.
#[must_use]
pub fn main_content_text(dom: &dyn DomAdapter) -> String {
    let mut best = String::new();
    for selector in ["main", "article", "[role='main']", "#content", ".content"] {
        let Ok(handles) = dom.query_all(selector) else {
            continue;
        };
        for handle in handles {
            let text = dom.text_content(handle);
            if text.len() > best.len() {
                best = text;
            }
        }
    }
    if best.is_empty()
        && let Ok(bodies) = dom.query_all("body")
        && let Some(body) = bodies.first()
    {
        best = dom.text_content(*body);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_visited_urls_are_unique() -> Result<()> {
        let mut state = PaginationState::new(50);
        let url = Url::parse("https://ex.com/p/2")?;
        assert!(state.mark_visited(&url));
        assert!(!state.mark_visited(&url));
        assert!(state.is_visited(&url));
        Ok(())
    }

    #[test]
    fn test_history_ring_is_bounded() -> Result<()> {
        let mut state = PaginationState::new(3);
        for n in 0..5u32 {
            let url = Url::parse(&format!("https://ex.com/p/{n}"))?;
            state.record_navigation(Some(url), StrategyKind::RelNext);
        }
        assert_eq!(state.history().count(), 3);
        assert_eq!(state.current_page(), 6);
        Ok(())
    }

    #[test]
    fn test_content_hash_normalizes_whitespace() {
        assert_eq!(content_hash("a  b\n c"), content_hash("a b c"));
        assert_ne!(content_hash("a b c"), content_hash("a b d"));
    }

    #[test]
    fn test_snapshot_roundtrip() -> Result<()> {
        let mut state = PaginationState::new(50);
        let url = Url::parse("https://ex.com/p/2")?;
        state.record_navigation(Some(url.clone()), StrategyKind::QueryString);
        state.mark_content_hash(content_hash("page two"));
        state.mark_strategy_failed(StrategyKind::TextMatch);

        let restored = PaginationState::from_snapshot(state.snapshot(), 50);
        assert_eq!(restored.current_page(), 2);
        assert!(restored.is_visited(&url));
        assert!(restored.has_content_hash(&content_hash("page two")));
        assert!(restored.failed_strategies().contains(&StrategyKind::TextMatch));
        assert_eq!(
            restored.last_successful_strategy(),
            Some(StrategyKind::QueryString)
        );
        Ok(())
    }
}
