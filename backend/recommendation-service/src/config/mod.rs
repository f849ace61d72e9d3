use resilience::RetryConfig;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("invalid pipeline settings: {0}")]
    Envy(#[from] envy::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub pipeline: PipelineConfig,
    pub warmer: WarmerConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    /// LOG_FORMAT=json switches the subscriber to JSON lines
    pub log_json: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Pipeline knobs, read from `RECS_*`
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_recent_activity_limit")]
    pub recent_activity_limit: usize,
    #[serde(default = "default_peer_limit")]
    pub peer_limit: usize,
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_key_prefix")]
    pub cache_key_prefix: String,
    #[serde(default = "default_fanout_concurrency")]
    pub fanout_concurrency: usize,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// At most one recompute per user id at a time
    #[serde(default)]
    pub single_flight: bool,
    #[serde(default)]
    pub visual_weight: f64,
    #[serde(default = "default_visual_seed_posts")]
    pub visual_seed_posts: usize,
    #[serde(default = "default_visual_top_n")]
    pub visual_top_n: usize,
}

fn default_recent_activity_limit() -> usize {
    50
}

fn default_peer_limit() -> usize {
    5
}

fn default_result_limit() -> usize {
    100
}

fn default_cache_ttl_secs() -> u64 {
    recs_cache::ttl::RECOMMENDATIONS
}

fn default_cache_key_prefix() -> String {
    recs_cache::DEFAULT_KEY_PREFIX.to_string()
}

fn default_fanout_concurrency() -> usize {
    16
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_visual_seed_posts() -> usize {
    3
}

fn default_visual_top_n() -> usize {
    20
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recent_activity_limit: default_recent_activity_limit(),
            peer_limit: default_peer_limit(),
            result_limit: default_result_limit(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_key_prefix: default_cache_key_prefix(),
            fanout_concurrency: default_fanout_concurrency(),
            store_timeout_ms: default_store_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            single_flight: false,
            visual_weight: 0.0,
            visual_seed_posts: default_visual_seed_posts(),
            visual_top_n: default_visual_top_n(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = envy::prefixed("RECS_").from_env::<PipelineConfig>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl_secs == 0 || self.cache_ttl_secs > recs_cache::ttl::MAX {
            return Err(ConfigError::Invalid {
                name: "RECS_CACHE_TTL_SECS",
                value: self.cache_ttl_secs.to_string(),
            });
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
            ..Default::default()
        }
    }
}

/// Background refresh of cached lists, read from `RECS_WARMER_*`
#[derive(Debug, Clone, Deserialize)]
pub struct WarmerConfig {
    #[serde(default = "default_warmer_enabled")]
    pub enabled: bool,
    #[serde(default = "default_warmer_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_warmer_max_users")]
    pub max_users_per_cycle: usize,
}

fn default_warmer_enabled() -> bool {
    true
}

// Half the cache TTL
fn default_warmer_interval_secs() -> u64 {
    recs_cache::ttl::RECOMMENDATIONS / 2
}

fn default_warmer_max_users() -> usize {
    500
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            enabled: default_warmer_enabled(),
            interval_secs: default_warmer_interval_secs(),
            max_users_per_cycle: default_warmer_max_users(),
        }
    }
}

impl WarmerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed("RECS_WARMER_").from_env::<WarmerConfig>()?)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            service: ServiceConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "recommendation-service".to_string()),
                log_json: env::var("LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            pipeline: PipelineConfig::from_env()?,
            warmer: WarmerConfig::from_env()?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.recent_activity_limit, 50);
        assert_eq!(config.peer_limit, 5);
        assert_eq!(config.result_limit, 100);
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.cache_key_prefix, "recs:");
        assert!(!config.single_flight);
        assert_eq!(config.store_timeout(), Duration::from_secs(2));
        assert_eq!(config.retry_config().max_retries, 2);
    }

    #[test]
    fn test_pipeline_from_vars() {
        let vars = vec![
            ("RECS_PEER_LIMIT".to_string(), "3".to_string()),
            ("RECS_SINGLE_FLIGHT".to_string(), "true".to_string()),
            ("RECS_VISUAL_WEIGHT".to_string(), "0.25".to_string()),
        ];
        let config: PipelineConfig = envy::prefixed("RECS_").from_iter(vars).unwrap();

        assert_eq!(config.peer_limit, 3);
        assert!(config.single_flight);
        assert_eq!(config.visual_weight, 0.25);
        assert_eq!(config.result_limit, 100);
    }

    #[test]
    fn test_cache_ttl_out_of_range_rejected() {
        assert!(PipelineConfig::default().validate().is_ok());

        for ttl in [0, recs_cache::ttl::MAX + 1, 10_000_000_000_000_000] {
            let config = PipelineConfig {
                cache_ttl_secs: ttl,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid { name: "RECS_CACHE_TTL_SECS", .. })
            ));
        }
    }

    #[test]
    fn test_warmer_defaults_from_empty_env() {
        let config: WarmerConfig = envy::prefixed("RECS_WARMER_")
            .from_iter(Vec::<(String, String)>::new())
            .unwrap();
        assert!(config.enabled);
        assert_eq!(config.interval(), Duration::from_secs(1800));
    }
}
