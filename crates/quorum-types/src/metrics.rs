//! Metric snapshots and the finite set of metric kinds

use crate::{ClusterId, ScalableRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Relative change below which a metric is considered stable
const TREND_TOLERANCE: f64 = 0.05;

/// Metric kinds the decision engine can evaluate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricKind {
    /// CPU utilisation, percent
    Cpu,
    /// Memory utilisation, percent
    Memory,
    /// Open client connections
    Connections,
    /// Operations per second
    Throughput,
    /// 95th percentile query latency, milliseconds
    QueryLatencyP95,
    /// User-defined query against the external time-series source
    External { name: String, query: String },
}

impl MetricKind {
    pub fn category(&self) -> MetricCategory {
        match self {
            Self::Cpu => MetricCategory::Cpu,
            Self::Memory => MetricCategory::Memory,
            Self::Connections => MetricCategory::Connections,
            Self::Throughput => MetricCategory::Throughput,
            Self::QueryLatencyP95 => MetricCategory::Latency,
            Self::External { .. } => MetricCategory::Custom,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Connections => "connections",
            Self::Throughput => "throughput",
            Self::QueryLatencyP95 => "query_latency_p95",
            Self::External { name, .. } => name,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fallback category a metric belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Cpu,
    Memory,
    Connections,
    Throughput,
    Latency,
    Custom,
}

impl MetricCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Connections => "connections",
            Self::Throughput => "throughput",
            Self::Latency => "latency",
            Self::Custom => "custom",
        }
    }
}

/// Direction of a metric relative to the previous snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

impl Trend {
    pub fn between(previous: Option<f64>, current: f64) -> Self {
        let Some(previous) = previous else {
            return Self::Stable;
        };
        let base = previous.abs().max(f64::EPSILON);
        let delta = (current - previous) / base;
        if delta > TREND_TOLERANCE {
            Self::Rising
        } else if delta < -TREND_TOLERANCE {
            Self::Falling
        } else {
            Self::Stable
        }
    }
}

/// Where a sample's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricOrigin {
    Live,
    Fallback,
}

/// One metric value with its previous value and trend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub current: f64,
    pub previous: Option<f64>,
    pub trend: Trend,
    pub origin: MetricOrigin,
}

impl MetricSample {
    pub fn new(current: f64, previous: Option<f64>, origin: MetricOrigin) -> Self {
        Self {
            current,
            previous,
            trend: Trend::between(previous, current),
            origin,
        }
    }

    pub fn live(current: f64) -> Self {
        Self::new(current, None, MetricOrigin::Live)
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == MetricOrigin::Fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: MetricSample,
    pub p95: MetricSample,
    pub p99: MetricSample,
}

/// Per-role aggregate produced fresh every autoscaling cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub cluster: ClusterId,
    pub role: ScalableRole,
    pub group: String,
    pub healthy: u32,
    pub total: u32,
    pub cpu: MetricSample,
    pub memory: MetricSample,
    pub connections: MetricSample,
    pub throughput: MetricSample,
    pub latency: LatencyPercentiles,

    /// External metrics keyed by their configured name
    #[serde(default)]
    pub custom: BTreeMap<String, MetricSample>,

    pub collected_at: chrono::DateTime<chrono::Utc>,
}

impl MetricSnapshot {
    /// Sample backing `kind`, if the snapshot carries one
    pub fn sample(&self, kind: &MetricKind) -> Option<&MetricSample> {
        match kind {
            MetricKind::Cpu => Some(&self.cpu),
            MetricKind::Memory => Some(&self.memory),
            MetricKind::Connections => Some(&self.connections),
            MetricKind::Throughput => Some(&self.throughput),
            MetricKind::QueryLatencyP95 => Some(&self.latency.p95),
            MetricKind::External { name, .. } => self.custom.get(name),
        }
    }

    /// Categories for which a fallback value was substituted
    pub fn fallback_categories(&self) -> Vec<MetricCategory> {
        let mut categories = Vec::new();
        let fixed = [
            (MetricCategory::Cpu, &self.cpu),
            (MetricCategory::Memory, &self.memory),
            (MetricCategory::Connections, &self.connections),
            (MetricCategory::Throughput, &self.throughput),
            (MetricCategory::Latency, &self.latency.p95),
        ];
        for (category, sample) in fixed {
            if sample.is_fallback() {
                categories.push(category);
            }
        }
        if self.custom.values().any(MetricSample::is_fallback) {
            categories.push(MetricCategory::Custom);
        }
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_between() {
        assert_eq!(Trend::between(None, 10.0), Trend::Stable);
        assert_eq!(Trend::between(Some(10.0), 10.2), Trend::Stable);
        assert_eq!(Trend::between(Some(10.0), 12.0), Trend::Rising);
        assert_eq!(Trend::between(Some(10.0), 8.0), Trend::Falling);
        assert_eq!(Trend::between(Some(0.0), 1.0), Trend::Rising);
    }

    #[test]
    fn test_metric_kind_serde_tagged() {
        let kind: MetricKind =
            serde_json::from_str(r#"{"type": "external", "name": "qps", "query": "sum(x)"}"#)
                .unwrap();
        assert_eq!(kind.category(), MetricCategory::Custom);
        assert_eq!(kind.label(), "qps");

        let cpu: MetricKind = serde_json::from_str(r#"{"type": "cpu"}"#).unwrap();
        assert_eq!(cpu, MetricKind::Cpu);
    }
}
