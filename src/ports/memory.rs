//! In-memory persistence for tests and single-session runs.

use dashmap::DashMap;
use futures::future::BoxFuture;

use super::PersistSink;

/// `PersistSink` over a concurrent map. Contents die with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PersistSink for MemoryStore {
    fn get(&self, key: &str) -> BoxFuture<'_, anyhow::Result<Option<String>>> {
        let value = self.entries.get(key).map(|v| v.value().clone());
        Box::pin(async move { Ok(value) })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'_, anyhow::Result<()>> {
        self.entries.insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, anyhow::Result<()>> {
        self.entries.remove(key);
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.set("k", "v".to_string()).await?;
        assert_eq!(store.get("k").await?.as_deref(), Some("v"));
        store.delete("k").await?;
        assert_eq!(store.get("k").await?, None);
        Ok(())
    }
}
