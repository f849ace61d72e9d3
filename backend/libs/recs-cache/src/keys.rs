//! Recommendation cache key schema
//!
//! Key format: {prefix}{user_id}, one key per user, case-sensitive.
//! The payload carries its own schema version, so the prefix stays stable
//! across payload changes.

/// Default prefix for per-user recommendation lists
pub const DEFAULT_KEY_PREFIX: &str = "recs:";

/// Cache key builder
#[derive(Debug, Clone)]
pub struct CacheKey {
    prefix: String,
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl CacheKey {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Recommendation list for a user
    /// Format: recs:{user_id}
    pub fn recommendations(&self, user_id: &str) -> String {
        format!("{}{}", self.prefix, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendations_key() {
        let keys = CacheKey::default();
        assert_eq!(
            keys.recommendations("64b7f1c2e4a1"),
            "recs:64b7f1c2e4a1"
        );
    }

    #[test]
    fn test_key_is_case_sensitive() {
        let keys = CacheKey::default();
        assert_ne!(keys.recommendations("UserA"), keys.recommendations("usera"));
    }

    #[test]
    fn test_custom_prefix() {
        let keys = CacheKey::new("staging:recs:");
        assert_eq!(keys.recommendations("u1"), "staging:recs:u1");
    }
}
