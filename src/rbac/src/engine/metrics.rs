//! Prometheus metrics for authorization decisions and cache behavior

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::ErrorKind;

/// Engine counters and latency percentiles
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Total number of has-permission decisions
    pub total_decisions: u64,

    pub allowed_decisions: u64,

    /// Resolved to false
    pub denied_decisions: u64,

    /// Could not resolve; reported to callers as denied
    pub failed_decisions: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,

    /// Committed admin mutations
    pub mutations: u64,

    /// Admin calls rejected by authorization or an invariant
    pub rejected_mutations: u64,

    /// Decision latency percentiles
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,

    pub avg_latency_ms: f64,

    /// Store outages seen by decisions
    pub store_unavailable: u64,
}

impl EngineMetrics {
    /// Calculate cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Metrics collector with Prometheus-compatible export
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Recent latency samples, oldest first
    latency_samples: Arc<RwLock<Vec<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(10_000))),
            max_samples: 10_000,
        }
    }

    pub async fn record_cache_hit(&self) {
        self.metrics.write().await.cache_hits += 1;
    }

    pub async fn record_cache_miss(&self) {
        self.metrics.write().await.cache_misses += 1;
    }

    /// Record a resolved decision
    pub async fn record_decision(&self, allowed: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.total_decisions += 1;

        if allowed {
            metrics.allowed_decisions += 1;
        } else {
            metrics.denied_decisions += 1;
        }
    }

    /// Record a decision that failed closed
    pub async fn record_failure(&self, kind: ErrorKind) {
        let mut metrics = self.metrics.write().await;
        metrics.total_decisions += 1;
        metrics.failed_decisions += 1;
        if kind == ErrorKind::StoreUnavailable {
            metrics.store_unavailable += 1;
        }
    }

    pub async fn record_mutation(&self) {
        self.metrics.write().await.mutations += 1;
    }

    pub async fn record_rejection(&self) {
        self.metrics.write().await.rejected_mutations += 1;
    }

    /// Record decision latency
    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);
        if samples.len() > self.max_samples {
            samples.drain(0..1_000);
        }

        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mut metrics = self.metrics.write().await;
        metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
    }

    /// Get current metrics snapshot
    pub async fn get_metrics(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = EngineMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Export metrics in Prometheus text format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP rbac_decisions_total Total number of has-permission decisions
# TYPE rbac_decisions_total counter
rbac_decisions_total {}

# HELP rbac_decisions_allowed_total Decisions resolved to allow
# TYPE rbac_decisions_allowed_total counter
rbac_decisions_allowed_total {}

# HELP rbac_decisions_denied_total Decisions resolved to deny
# TYPE rbac_decisions_denied_total counter
rbac_decisions_denied_total {}

# HELP rbac_decisions_failed_total Decisions that failed closed
# TYPE rbac_decisions_failed_total counter
rbac_decisions_failed_total {}

# HELP rbac_store_unavailable_total Decisions failed by a store outage
# TYPE rbac_store_unavailable_total counter
rbac_store_unavailable_total {}

# HELP rbac_cache_hits_total Effective permission cache hits
# TYPE rbac_cache_hits_total counter
rbac_cache_hits_total {}

# HELP rbac_cache_misses_total Effective permission cache misses
# TYPE rbac_cache_misses_total counter
rbac_cache_misses_total {}

# HELP rbac_mutations_total Committed admin mutations
# TYPE rbac_mutations_total counter
rbac_mutations_total {}

# HELP rbac_mutations_rejected_total Admin calls rejected
# TYPE rbac_mutations_rejected_total counter
rbac_mutations_rejected_total {}

# HELP rbac_decision_latency_seconds Decision latency percentiles
# TYPE rbac_decision_latency_seconds summary
rbac_decision_latency_seconds{{quantile="0.5"}} {}
rbac_decision_latency_seconds{{quantile="0.9"}} {}
rbac_decision_latency_seconds{{quantile="0.99"}} {}
"#,
            metrics.total_decisions,
            metrics.allowed_decisions,
            metrics.denied_decisions,
            metrics.failed_decisions,
            metrics.store_unavailable,
            metrics.cache_hits,
            metrics.cache_misses,
            metrics.mutations,
            metrics.rejected_mutations,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
        )
    }

    /// Calculate percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_decisions() {
        let collector = MetricsCollector::new();

        collector.record_decision(true).await;
        collector.record_decision(false).await;
        collector.record_failure(ErrorKind::StoreUnavailable).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_decisions, 3);
        assert_eq!(metrics.allowed_decisions, 1);
        assert_eq!(metrics.denied_decisions, 1);
        assert_eq!(metrics.failed_decisions, 1);
        assert_eq!(metrics.store_unavailable, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_rate() {
        let collector = MetricsCollector::new();

        collector.record_cache_hit().await;
        collector.record_cache_hit().await;
        collector.record_cache_miss().await;

        let metrics = collector.get_metrics().await;
        assert!((metrics.cache_hit_rate() - 0.666).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_latency_percentiles() {
        let collector = MetricsCollector::new();

        for ms in [5, 10, 15] {
            collector.record_latency(Duration::from_millis(ms)).await;
        }

        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 10.0).abs() < 1.0);
        assert!(metrics.latency_p99_ms >= metrics.latency_p50_ms);
    }

    #[tokio::test]
    async fn test_prometheus_export() {
        let collector = MetricsCollector::new();

        collector.record_decision(true).await;
        collector.record_mutation().await;

        let text = collector.export_prometheus().await;
        assert!(text.contains("rbac_decisions_total 1"));
        assert!(text.contains("rbac_decisions_allowed_total 1"));
        assert!(text.contains("rbac_mutations_total 1"));
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();
        collector.record_decision(true).await;
        collector.reset().await;
        assert_eq!(collector.get_metrics().await.total_decisions, 0);
    }
}
