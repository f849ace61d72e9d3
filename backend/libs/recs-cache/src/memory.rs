//! In-process cache backend
//!
//! Entries are kept until overwritten or invalidated; expiry is enforced on
//! read against the injected clock. Each key lives in its own `DashMap`
//! shard entry, so concurrent `get`/`set` never observe a torn value.

use crate::{expiry_after, CacheMetrics, CacheResult, Clock, ResultCache, SystemClock};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryResultCache {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
    metrics: CacheMetrics,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl Default for InMemoryResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResultCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            metrics: CacheMetrics::for_backend("memory"),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
        }
    }

    /// Number of `get` calls served so far
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `set_with_ttl` calls served so far
    pub fn set_calls(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Physically retained entries, live or expired
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose expiry has passed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }
}

#[async_trait::async_trait]
impl ResultCache for InMemoryResultCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();

        match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => {
                debug!(key = %key, "Cache hit");
                self.metrics.record_hit();
                Ok(Some(entry.value.clone()))
            }
            Some(_) => {
                debug!(key = %key, "Cache entry expired");
                self.metrics.record_miss();
                Ok(None)
            }
            None => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> CacheResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        let expires_at = expiry_after(self.clock.now(), ttl_secs);

        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );

        debug!(key = %key, ttl = ttl_secs, "Cache set");
        self.metrics.record_write();
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        debug!(key = %key, "Cache delete");
        self.metrics.record_invalidation();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use chrono::Duration;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = InMemoryResultCache::new();
        cache.set_with_ttl("recs:u1", b"payload", 60).await.unwrap();

        assert_eq!(
            cache.get("recs:u1").await.unwrap(),
            Some(b"payload".to_vec())
        );
        assert_eq!(cache.get("recs:u2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_absent_at_expiry() {
        let clock = Arc::new(ManualClock::default());
        let cache = InMemoryResultCache::with_clock(clock.clone());
        cache.set_with_ttl("recs:u1", b"v", 3600).await.unwrap();

        clock.advance(Duration::seconds(3599));
        assert!(cache.get("recs:u1").await.unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(cache.get("recs:u1").await.unwrap().is_none());

        // still physically retained until purged
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_resets_expiry() {
        let clock = Arc::new(ManualClock::default());
        let cache = InMemoryResultCache::with_clock(clock.clone());
        cache.set_with_ttl("k", b"old", 10).await.unwrap();
        clock.advance(Duration::seconds(8));
        cache.set_with_ttl("k", b"new", 10).await.unwrap();
        clock.advance(Duration::seconds(8));

        assert_eq!(cache.get("k").await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(cache.set_calls(), 2);
        assert_eq!(cache.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = InMemoryResultCache::new();
        cache.set_with_ttl("k", b"v", 60).await.unwrap();
        cache.invalidate("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    fn payload(writer: u8) -> Vec<u8> {
        vec![writer; 4096]
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_never_tear_a_value() {
        let cache = Arc::new(InMemoryResultCache::new());
        let mut tasks = Vec::new();

        for writer in 0..8u8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..200 {
                    cache.set_with_ttl("recs:shared", &payload(writer), 60).await.unwrap();
                    let own = format!("recs:u{writer}");
                    cache.set_with_ttl(&own, &payload(writer), 60).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }

        for _ in 0..4 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..400 {
                    if let Some(value) = cache.get("recs:shared").await.unwrap() {
                        assert_eq!(value.len(), 4096);
                        assert!(value.iter().all(|b| *b == value[0]));
                        assert!(value[0] < 8);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        let shared = cache.get("recs:shared").await.unwrap().unwrap();
        assert!((0..8u8).any(|w| shared == payload(w)));
        for writer in 0..8u8 {
            let own = cache.get(&format!("recs:u{writer}")).await.unwrap();
            assert_eq!(own, Some(payload(writer)));
        }
        assert_eq!(cache.set_calls(), 8 * 200 * 2);
    }
}
