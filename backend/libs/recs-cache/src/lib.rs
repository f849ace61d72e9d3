//! Recommendation result cache
//!
//! Cache-aside store for per-user recommendation lists:
//! - Opaque byte payloads (serialization belongs to the caller)
//! - Absolute expiry at `now + ttl`, entries are logically absent afterwards
//! - Last-writer-wins per key, no partial updates
//! - Redis and in-memory backends
//! - Metrics integration

mod clock;
mod error;
mod keys;
mod memory;
mod metrics;
mod redis_cache;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, DEFAULT_KEY_PREFIX};
pub use memory::InMemoryResultCache;
pub use metrics::CacheMetrics;
pub use redis_cache::RedisResultCache;

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Default TTL values (seconds)
pub mod ttl {
    pub const RECOMMENDATIONS: u64 = 3600; // 1 hour

    /// Longest TTL accepted from configuration
    pub const MAX: u64 = 365 * 24 * 3600; // 1 year
}

/// `now + ttl_secs`, saturating at the latest representable instant
pub fn expiry_after(now: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    i64::try_from(ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Core result cache operations
#[async_trait::async_trait]
pub trait ResultCache: Send + Sync {
    /// Get a live entry. Expired entries are reported as `None`.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous entry, expiring at
    /// `now + ttl_secs`
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> CacheResult<()>;

    /// Drop the entry for `key` if present
    async fn invalidate(&self, key: &str) -> CacheResult<()>;
}

#[async_trait::async_trait]
impl<C: ResultCache + ?Sized> ResultCache for Arc<C> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> CacheResult<()> {
        (**self).set_with_ttl(key, value, ttl_secs).await
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        (**self).invalidate(key).await
    }
}
