//! In-process TTL cache for computed contexts.

use async_trait::async_trait;
use contextwise_core::error::CacheError;
use contextwise_core::store::ContextCache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// A [`ContextCache`] held in a `HashMap`. Expired entries are evicted when
/// read and swept on every write, so keys that are never read again do not
/// accumulate.
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of entries, including ones that expired since the last write.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        debug!(key, "Evicting expired cache entry");
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        if entries.len() < before {
            debug!(evicted = before - entries.len(), "Swept expired cache entries");
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get() {
        let cache = InMemoryCache::new();
        cache
            .put("k", json!({"total_tokens": 12}), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("k").await.unwrap(),
            Some(json!({"total_tokens": 12}))
        );
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache.put("k", json!(1), Duration::from_secs(30)).await.unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_sweep_entries_nobody_reads() {
        let cache = InMemoryCache::new();
        for i in 0..1000 {
            cache
                .put(&format!("ctx:{i}"), json!(i), Duration::from_secs(1))
                .await
                .unwrap();
            tokio::time::advance(Duration::from_secs(2)).await;
        }
        assert_eq!(cache.len().await, 1);

        cache.put("fresh", json!("kept"), Duration::from_secs(60)).await.unwrap();
        cache.put("short", json!("kept"), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("fresh").await.unwrap(), Some(json!("kept")));
    }

    #[tokio::test]
    async fn forget_reports_removal() {
        let cache = InMemoryCache::new();
        cache.put("k", json!(true), Duration::from_secs(60)).await.unwrap();
        assert!(cache.forget("k").await.unwrap());
        assert!(!cache.forget("k").await.unwrap());
        assert_eq!(cache.len().await, 0);
    }
}
