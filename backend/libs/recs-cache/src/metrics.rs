//! Cache metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    writes: CounterVec,
    invalidations: CounterVec,
    errors: CounterVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("recs_cache_hits_total", "Total recommendation cache hits"),
                &["backend"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new("recs_cache_misses_total", "Total recommendation cache misses"),
                &["backend"],
            )
            .expect("valid metric definition"),
            writes: CounterVec::new(
                Opts::new("recs_cache_writes_total", "Total recommendation cache writes"),
                &["backend"],
            )
            .expect("valid metric definition"),
            invalidations: CounterVec::new(
                Opts::new(
                    "recs_cache_invalidations_total",
                    "Total recommendation cache invalidations",
                ),
                &["backend"],
            )
            .expect("valid metric definition"),
            errors: CounterVec::new(
                Opts::new("recs_cache_errors_total", "Total recommendation cache errors"),
                &["backend", "op"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper, labelled by backend ("redis", "memory")
#[derive(Clone, Debug)]
pub struct CacheMetrics {
    backend: &'static str,
}

impl CacheMetrics {
    pub fn for_backend(backend: &'static str) -> Self {
        Self { backend }
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self) {
        get_metrics().hits.with_label_values(&[self.backend]).inc();
    }

    pub fn record_miss(&self) {
        get_metrics().misses.with_label_values(&[self.backend]).inc();
    }

    pub fn record_write(&self) {
        get_metrics().writes.with_label_values(&[self.backend]).inc();
    }

    pub fn record_invalidation(&self) {
        get_metrics()
            .invalidations
            .with_label_values(&[self.backend])
            .inc();
    }

    pub fn record_error(&self, op: &str) {
        get_metrics()
            .errors
            .with_label_values(&[self.backend, op])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment_per_backend() {
        let metrics = CacheMetrics::for_backend("metrics-test");
        let before = get_metrics()
            .hits
            .with_label_values(&["metrics-test"])
            .get();

        metrics.record_hit();
        metrics.record_hit();

        let after = get_metrics()
            .hits
            .with_label_values(&["metrics-test"])
            .get();
        assert_eq!(after - before, 2.0);
    }

    #[test]
    fn test_register_into_registry() {
        let registry = Registry::new();
        CacheMetrics::register(&registry).expect("first registration succeeds");
        CacheMetrics::for_backend("metrics-register").record_miss();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"recs_cache_misses_total".to_string()));
    }
}
