use dashmap::DashMap;
use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

/// Entrada con marca de tiempo para TTL y desalojo
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_access: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            last_access: now,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// Cache concurrente con TTL fijo y capacidad acotada.
///
/// Al llenarse se desaloja la entrada usada hace más tiempo. El desalojo es
/// O(n), suficiente para los pocos cientos de entradas que maneja el bot.
#[derive(Debug)]
pub struct LRUCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    capacity: usize,
    ttl: Duration,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
}

impl<K, V> LRUCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            ttl,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.evict_oldest();
        }
        self.data
            .insert(key, CacheEntry::new(value))
            .map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let value = if let Some(mut entry) = self.data.get_mut(key) {
            if entry.is_expired(self.ttl) {
                None
            } else {
                entry.last_access = Instant::now();
                Some(entry.value.clone())
            }
        } else {
            None
        };

        if value.is_none() {
            // El guard del shard ya se soltó; se puede borrar sin bloquear
            self.data.remove_if(key, |_, entry| entry.is_expired(self.ttl));
        }

        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().last_access)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.data.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<K, V> Clone for LRUCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            capacity: self.capacity,
            ttl: self.ttl,
            hits: self.hits.clone(),
            misses: self.misses.clone(),
            evictions: self.evictions.clone(),
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache: LRUCache<String, u32> = LRUCache::new(10, Duration::from_secs(60));
        cache.insert("a".into(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lookup_releases_shard() {
        let cache: LRUCache<&'static str, u32> = LRUCache::new(10, Duration::from_millis(100));
        cache.insert("a", 1);
        tokio::time::advance(Duration::from_millis(300)).await;

        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());

        // El shard sigue usable después del desalojo
        cache.insert("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.metrics().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_evicts_least_recently_used() {
        let cache: LRUCache<&'static str, u32> = LRUCache::new(2, Duration::from_secs(600));
        cache.insert("a", 1);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.insert("b", 2);
        tokio::time::advance(Duration::from_millis(10)).await;
        // "a" pasa a ser la más reciente
        assert_eq!(cache.get(&"a"), Some(1));

        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_only_expired() {
        let cache: LRUCache<&'static str, u32> = LRUCache::new(10, Duration::from_secs(60));
        cache.insert("old", 1);
        tokio::time::advance(Duration::from_secs(45)).await;
        cache.insert("new", 2);
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.get(&"new"), Some(2));
    }
}
