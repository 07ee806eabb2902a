//! Metrics and autoscaling configuration.

use crate::{FallbackValues, IdleScoring};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the collector and the decision engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Base URL of the Prometheus-compatible query API; `None` disables it
    pub prometheus_url: Option<String>,

    /// Per-request timeout (milliseconds)
    pub query_timeout_ms: u64,

    /// Query templates for the built-in categories
    pub queries: QueryTemplates,

    /// Values substituted when a query fails
    pub fallback: FallbackValues,

    /// Confidence credited to a fallback-backed metric, in [0, 1]
    pub fallback_confidence: f64,

    /// Weight of a metric target that does not set one
    pub default_weight: f64,

    /// Average score above which a group scales up
    pub scale_up_threshold: f64,

    /// Average score below which a group scales down
    pub scale_down_threshold: f64,

    /// Scoring of metrics below half their target
    pub idle_scoring: IdleScoring,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prometheus_url: None,
            query_timeout_ms: 5_000,
            queries: QueryTemplates::default(),
            fallback: FallbackValues::default(),
            fallback_confidence: 0.5,
            default_weight: 1.0,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.2,
            idle_scoring: IdleScoring::Inverse,
        }
    }
}

impl MetricsConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// PromQL templates.
///
/// `{namespace}`, `{cluster}`, `{group}` and `{role}` are substituted
/// before the query is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTemplates {
    pub cpu: String,
    pub memory: String,
    pub connections: String,
    pub throughput: String,
    pub latency_p50: String,
    pub latency_p95: String,
    pub latency_p99: String,
}

const POD_SELECTOR: &str = r#"namespace="{namespace}",pod=~"{cluster}-{group}-[0-9]+""#;
const DB_SELECTOR: &str = r#"namespace="{namespace}",cluster="{cluster}",group="{group}""#;

impl Default for QueryTemplates {
    fn default() -> Self {
        let latency = |q: &str| {
            format!(
                "histogram_quantile({q}, sum(rate(db_query_duration_seconds_bucket{{{DB_SELECTOR}}}[5m])) by (le)) * 1000"
            )
        };
        Self {
            cpu: format!(
                "avg(rate(container_cpu_usage_seconds_total{{{POD_SELECTOR}}}[5m])) * 100"
            ),
            memory: format!(
                "avg(container_memory_working_set_bytes{{{POD_SELECTOR}}} / container_spec_memory_limit_bytes{{{POD_SELECTOR}}}) * 100"
            ),
            connections: format!("avg(db_client_connections{{{DB_SELECTOR}}})"),
            throughput: format!("avg(rate(db_operations_total{{{DB_SELECTOR}}}[5m]))"),
            latency_p50: latency("0.50"),
            latency_p95: latency("0.95"),
            latency_p99: latency("0.99"),
        }
    }
}

/// Values substituted into a query template
#[derive(Debug, Clone, Copy)]
pub struct QueryScope<'a> {
    pub namespace: &'a str,
    pub cluster: &'a str,
    pub group: &'a str,
    pub role: &'a str,
}

impl QueryScope<'_> {
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{namespace}", self.namespace)
            .replace("{cluster}", self.cluster)
            .replace("{group}", self.group)
            .replace("{role}", self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_templates_render() {
        let scope = QueryScope {
            namespace: "data",
            cluster: "orders",
            group: "masters",
            role: "primary",
        };
        let cpu = scope.render(&QueryTemplates::default().cpu);
        assert_eq!(
            cpu,
            r#"avg(rate(container_cpu_usage_seconds_total{namespace="data",pod=~"orders-masters-[0-9]+"}[5m])) * 100"#
        );
        let p95 = scope.render(&QueryTemplates::default().latency_p95);
        assert!(p95.starts_with("histogram_quantile(0.95, "));
        assert!(p95.contains(r#"cluster="orders""#));
    }

    #[test]
    fn test_default_templates_classify_by_category() {
        use quorum_types::MetricCategory;
        let q = QueryTemplates::default();
        assert_eq!(FallbackValues::classify_query(&q.cpu), MetricCategory::Cpu);
        assert_eq!(FallbackValues::classify_query(&q.memory), MetricCategory::Memory);
        assert_eq!(
            FallbackValues::classify_query(&q.connections),
            MetricCategory::Connections
        );
        assert_eq!(
            FallbackValues::classify_query(&q.throughput),
            MetricCategory::Throughput
        );
        assert_eq!(
            FallbackValues::classify_query(&q.latency_p95),
            MetricCategory::Latency
        );
    }
}
