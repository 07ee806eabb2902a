//! Configurable fallback values
//!
//! Substituted when the external source cannot answer. They are
//! placeholders, not measurements: every use is logged, counted against the
//! decision's confidence and surfaced as a `MetricsDegraded` condition.

use quorum_types::MetricCategory;
use serde::{Deserialize, Serialize};

/// Fallback value per metric category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackValues {
    /// CPU utilisation, percent
    pub cpu: f64,
    /// Memory utilisation, percent
    pub memory: f64,
    /// Open connections
    pub connections: f64,
    /// Operations per second
    pub throughput: f64,
    /// Query latency, milliseconds
    pub latency_ms: f64,
    /// Any query that matches no known pattern
    pub custom: f64,
}

impl Default for FallbackValues {
    fn default() -> Self {
        Self {
            cpu: 50.0,
            memory: 50.0,
            connections: 100.0,
            throughput: 1000.0,
            latency_ms: 100.0,
            custom: 0.0,
        }
    }
}

impl FallbackValues {
    pub fn for_category(&self, category: MetricCategory) -> f64 {
        match category {
            MetricCategory::Cpu => self.cpu,
            MetricCategory::Memory => self.memory,
            MetricCategory::Connections => self.connections,
            MetricCategory::Throughput => self.throughput,
            MetricCategory::Latency => self.latency_ms,
            MetricCategory::Custom => self.custom,
        }
    }

    /// Category a raw query string looks like, by name pattern
    pub fn classify_query(query: &str) -> MetricCategory {
        let q = query.to_ascii_lowercase();
        if q.contains("cpu") {
            MetricCategory::Cpu
        } else if q.contains("memory") || q.contains("mem_") {
            MetricCategory::Memory
        } else if q.contains("connection") {
            MetricCategory::Connections
        } else if q.contains("latency") || q.contains("duration") {
            MetricCategory::Latency
        } else if q.contains("throughput") || q.contains("operations") || q.contains("ops") || q.contains("requests") {
            MetricCategory::Throughput
        } else {
            MetricCategory::Custom
        }
    }

    /// Fallback for a raw query string
    pub fn for_query(&self, query: &str) -> (MetricCategory, f64) {
        let category = Self::classify_query(query);
        (category, self.for_category(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_pattern_query_gets_cpu_baseline() {
        let values = FallbackValues::default();
        let (category, value) =
            values.for_query("avg(rate(container_cpu_usage_seconds_total[5m])) * 100");
        assert_eq!(category, MetricCategory::Cpu);
        assert_eq!(value, 50.0);
    }

    #[test]
    fn test_query_classification() {
        assert_eq!(
            FallbackValues::classify_query("avg(container_memory_working_set_bytes)"),
            MetricCategory::Memory
        );
        assert_eq!(
            FallbackValues::classify_query("sum(db_client_connections)"),
            MetricCategory::Connections
        );
        assert_eq!(
            FallbackValues::classify_query("histogram_quantile(0.95, db_query_duration_seconds_bucket)"),
            MetricCategory::Latency
        );
        assert_eq!(
            FallbackValues::classify_query("sum(rate(db_operations_total[5m]))"),
            MetricCategory::Throughput
        );
        assert_eq!(
            FallbackValues::classify_query("queue_depth"),
            MetricCategory::Custom
        );
    }

    #[test]
    fn test_values_configurable() {
        let values: FallbackValues = serde_json::from_str(r#"{"cpu": 10.0}"#).unwrap();
        assert_eq!(values.for_category(MetricCategory::Cpu), 10.0);
        assert_eq!(values.for_category(MetricCategory::Memory), 50.0);
    }
}
