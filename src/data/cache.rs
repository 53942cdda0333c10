use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Async map whose entries go stale after a fixed TTL
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if any
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of stored entries, stale ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache: TtlCache<String, f64> = TtlCache::new(Duration::from_secs(300));
        cache.insert("market_BTC".to_string(), 50_000.0).await;

        assert_eq!(cache.get(&"market_BTC".to_string()).await, Some(50_000.0));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get(&"market_BTC".to_string()).await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&"market_BTC".to_string()).await.is_none());
        // stale entries stay until overwritten or cleared
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_refreshes_timestamp() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new(Duration::from_secs(10));
        cache.insert("k", 1).await;
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert("k", 2).await;
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get(&"k").await, Some(2));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache: TtlCache<u8, u8> = TtlCache::new(Duration::from_secs(10));
        cache.insert(1, 1).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
