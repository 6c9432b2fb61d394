//! Per-host URL template learning.
//!
//! After a successful URL navigation, the engine asks the store to compare
//! the old and new URLs. When they differ by exactly one in a shared numeric
//! query parameter or path segment, the shape is remembered per hostname and
//! replayed by the highest-priority detection strategy on later pages of the
//! same site. Entries expire after a configurable idle period.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use url::Url;

use super::text_patterns::{apply_path_template, match_path_pattern};

/// Which part of the URL carries the page number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearnedKind {
    QueryString { param: String },
    Path,
}

/// A remembered pagination shape for one hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub hostname: String,
    pub kind: LearnedKind,
    /// `?{param}={N}` for query shapes, or a path with `{N}` for the number.
    pub template: String,
    pub last_used: DateTime<Utc>,
}

/// Hostname-keyed store of learned patterns.
#[derive(Debug)]
pub struct PatternStore {
    entries: DashMap<String, LearnedPattern>,
    ttl: Duration,
}

impl PatternStore {
    #[must_use]
    pub fn new(ttl_days: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::days(ttl_days.max(1)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compare a completed navigation and remember its shape when the URLs
    /// differ by exactly one page number. Returns the stored pattern.
    pub fn learn(&self, current: &Url, next: &Url) -> Option<LearnedPattern> {
        let hostname = next.host_str()?.to_string();
        if current.host_str() != Some(hostname.as_str()) {
            return None;
        }

        if let Some(param) = shared_incremented_param(current, next) {
            let pattern = LearnedPattern {
                hostname: hostname.clone(),
                kind: LearnedKind::QueryString {
                    param: param.clone(),
                },
                template: format!("?{param}={{N}}"),
                last_used: Utc::now(),
            };
            log::debug!("learned query pagination for {hostname}: param {param:?}");
            self.entries.insert(hostname, pattern.clone());
            return Some(pattern);
        }

        let current_match = match_path_pattern(current.path())?;
        let next_match = match_path_pattern(next.path())?;
        if current_match.template == next_match.template
            && next_match.number == current_match.number + 1
        {
            let pattern = LearnedPattern {
                hostname: hostname.clone(),
                kind: LearnedKind::Path,
                template: current_match.template,
                last_used: Utc::now(),
            };
            log::debug!(
                "learned path pagination for {hostname}: template {:?}",
                pattern.template
            );
            self.entries.insert(hostname, pattern.clone());
            return Some(pattern);
        }
        None
    }

    /// Build the next URL for `current` from a stored, unexpired pattern.
    /// Touches `last_used` on success.
    pub fn apply(&self, current: &Url) -> Option<Url> {
        let hostname = current.host_str()?;
        let mut entry = self.entries.get_mut(hostname)?;
        if Utc::now() - entry.last_used > self.ttl {
            drop(entry);
            self.entries.remove(hostname);
            return None;
        }

        let next = match &entry.kind {
            LearnedKind::QueryString { param } => {
                let value: u32 = current
                    .query_pairs()
                    .find(|(k, _)| k == param.as_str())
                    .and_then(|(_, v)| v.parse().ok())?;
                let mut next = current.clone();
                let rebuilt: Vec<(String, String)> = current
                    .query_pairs()
                    .map(|(k, v)| {
                        if k == param.as_str() {
                            (k.into_owned(), (value + 1).to_string())
                        } else {
                            (k.into_owned(), v.into_owned())
                        }
                    })
                    .collect();
                next.query_pairs_mut().clear().extend_pairs(rebuilt);
                next
            }
            LearnedKind::Path => {
                let matched = match_path_pattern(current.path())?;
                if matched.template != entry.template {
                    return None;
                }
                let mut next = current.clone();
                next.set_path(&apply_path_template(&entry.template, matched.number + 1));
                next
            }
        };

        entry.last_used = Utc::now();
        Some(next)
    }

    /// Drop entries idle past the TTL.
    pub fn prune_expired(&self) {
        let cutoff = Utc::now() - self.ttl;
        self.entries.retain(|_, entry| entry.last_used >= cutoff);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<LearnedPattern> {
        let mut out: Vec<LearnedPattern> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        out
    }

    pub fn restore(&self, patterns: Vec<LearnedPattern>) {
        for pattern in patterns {
            self.entries.insert(pattern.hostname.clone(), pattern);
        }
        self.prune_expired();
    }
}

fn shared_incremented_param(current: &Url, next: &Url) -> Option<String> {
    for (key, value) in current.query_pairs() {
        let Ok(current_n) = value.parse::<u32>() else {
            continue;
        };
        let incremented = next
            .query_pairs()
            .any(|(k, v)| k == key && v.parse::<u32>() == Ok(current_n + 1));
        if incremented {
            return Some(key.into_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_learns_query_param_shape() -> Result<()> {
        let store = PatternStore::new(7);
        let current = Url::parse("https://ex.com/gallery?page=3&sort=new")?;
        let next = Url::parse("https://ex.com/gallery?page=4&sort=new")?;
        let learned = store
            .learn(&current, &next)
            .ok_or_else(|| anyhow::anyhow!("should learn"))?;
        assert_eq!(
            learned.kind,
            LearnedKind::QueryString {
                param: "page".to_string()
            }
        );

        let applied = store
            .apply(&next)
            .ok_or_else(|| anyhow::anyhow!("should apply"))?;
        assert!(applied.query().is_some_and(|q| q.contains("page=5")));
        Ok(())
    }

    #[test]
    fn test_learns_path_shape() -> Result<()> {
        let store = PatternStore::new(7);
        let current = Url::parse("https://ex.com/blog/page/2")?;
        let next = Url::parse("https://ex.com/blog/page/3")?;
        let learned = store
            .learn(&current, &next)
            .ok_or_else(|| anyhow::anyhow!("should learn"))?;
        assert_eq!(learned.kind, LearnedKind::Path);

        let applied = store
            .apply(&next)
            .ok_or_else(|| anyhow::anyhow!("should apply"))?;
        assert_eq!(applied.path(), "/blog/page/4");
        Ok(())
    }

    #[test]
    fn test_ignores_cross_host_and_non_increment() -> Result<()> {
        let store = PatternStore::new(7);
        let a = Url::parse("https://ex.com/p?page=2")?;
        let other_host = Url::parse("https://other.com/p?page=3")?;
        assert!(store.learn(&a, &other_host).is_none());

        let jump = Url::parse("https://ex.com/p?page=9")?;
        assert!(store.learn(&a, &jump).is_none());
        Ok(())
    }

    #[test]
    fn test_snapshot_restore_roundtrip() -> Result<()> {
        let store = PatternStore::new(7);
        let current = Url::parse("https://ex.com/gallery?page=1")?;
        let next = Url::parse("https://ex.com/gallery?page=2")?;
        store.learn(&current, &next);

        let restored = PatternStore::new(7);
        restored.restore(store.snapshot());
        assert_eq!(restored.len(), 1);
        assert!(restored.apply(&next).is_some());
        Ok(())
    }
}
