//! Redis cache backend (GET / SETEX / DEL)

use crate::{CacheError, CacheMetrics, CacheResult, ResultCache};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

/// Redis-backed result cache
///
/// `ConnectionManager` is cheap to clone and multiplexes one connection, so
/// each call works on its own clone instead of holding a lock.
#[derive(Clone)]
pub struct RedisResultCache {
    conn: ConnectionManager,
    metrics: CacheMetrics,
}

impl RedisResultCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            metrics: CacheMetrics::for_backend("redis"),
        }
    }

    /// Open a client for `redis_url` and establish the managed connection
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url).map_err(CacheError::Redis)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(CacheError::Redis)?;
        Ok(Self::new(conn))
    }

    /// Ping Redis to check connection health
    pub async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| {
                warn!("Redis PING failed: {}", e);
                CacheError::Redis(e)
            })?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResultCache for RedisResultCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();

        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(Some(data)) => {
                debug!(key = %key, "Cache hit");
                self.metrics.record_hit();
                Ok(Some(data))
            }
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss();
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Redis get error");
                self.metrics.record_error("get");
                Err(CacheError::Redis(e))
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.conn.clone();

        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Redis SETEX error");
                self.metrics.record_error("set");
                CacheError::Redis(e)
            })?;

        debug!(key = %key, ttl = ttl_secs, "Cache set");
        self.metrics.record_write();
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(|e| {
            self.metrics.record_error("del");
            CacheError::Redis(e)
        })?;

        debug!(key = %key, "Cache delete");
        self.metrics.record_invalidation();
        Ok(())
    }
}
