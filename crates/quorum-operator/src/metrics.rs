//! Prometheus metrics exported by the operator

use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use quorum_types::{ClusterId, ClusterPhase, MetricCategory, ScalableRole, ScalingAction};
use std::collections::BTreeSet;

/// Operator metrics registered under the `quorum` prefix
pub struct OperatorMetrics {
    registry: Registry,

    /// Reconcile cycles by result
    pub reconciles_total: IntCounterVec,

    /// Reconcile cycle duration by result
    pub reconcile_duration_seconds: HistogramVec,

    /// 1 for the phase each cluster is in, 0 for the others
    pub cluster_phase: IntGaugeVec,

    /// Scaling decisions by role and action
    pub scaling_decisions_total: IntCounterVec,

    /// Version conflicts absorbed by the applier, per object kind
    pub applier_conflicts_total: IntCounterVec,

    /// Metric values replaced by fallbacks, per category
    pub metric_fallbacks_total: IntCounterVec,
}

impl OperatorMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Self::with_prefix("quorum")
    }

    pub fn with_prefix(prefix: &str) -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some(prefix.to_string()), None)?;

        let reconciles_total = IntCounterVec::new(
            Opts::new("reconciles_total", "Reconcile cycles"),
            &["result"],
        )?;
        registry.register(Box::new(reconciles_total.clone()))?;

        let reconcile_duration_seconds = HistogramVec::new(
            HistogramOpts::new("reconcile_duration_seconds", "Reconcile cycle duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
            &["result"],
        )?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;

        let cluster_phase = IntGaugeVec::new(
            Opts::new("cluster_phase", "Current cluster phase"),
            &["cluster", "phase"],
        )?;
        registry.register(Box::new(cluster_phase.clone()))?;

        let scaling_decisions_total = IntCounterVec::new(
            Opts::new("scaling_decisions_total", "Scaling decisions"),
            &["role", "action"],
        )?;
        registry.register(Box::new(scaling_decisions_total.clone()))?;

        let applier_conflicts_total = IntCounterVec::new(
            Opts::new("applier_conflicts_total", "Version conflicts absorbed by the applier"),
            &["kind"],
        )?;
        registry.register(Box::new(applier_conflicts_total.clone()))?;

        let metric_fallbacks_total = IntCounterVec::new(
            Opts::new("metric_fallbacks_total", "Metric values replaced by fallbacks"),
            &["category"],
        )?;
        registry.register(Box::new(metric_fallbacks_total.clone()))?;

        Ok(Self {
            registry,
            reconciles_total,
            reconcile_duration_seconds,
            cluster_phase,
            scaling_decisions_total,
            applier_conflicts_total,
            metric_fallbacks_total,
        })
    }

    /// Record one finished cycle
    pub fn record_reconcile(&self, result: &str, duration_secs: f64) {
        self.reconciles_total.with_label_values(&[result]).inc();
        self.reconcile_duration_seconds
            .with_label_values(&[result])
            .observe(duration_secs);
    }

    pub fn set_phase(&self, cluster: &ClusterId, phase: ClusterPhase) {
        let key = cluster.key();
        for candidate in ClusterPhase::ALL {
            self.cluster_phase
                .with_label_values(&[key.as_str(), candidate.as_str()])
                .set(i64::from(candidate == phase));
        }
    }

    /// Drop every series of a cluster that left scope
    pub fn forget_cluster(&self, cluster: &ClusterId) {
        self.forget_phase_series(&cluster.key());
    }

    /// Drop the series of every cluster in `namespace`
    pub fn forget_namespace(&self, namespace: &str) {
        let prefix = format!("{namespace}/");
        let clusters: BTreeSet<String> = self
            .cluster_phase
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .flat_map(|metric| metric.get_label())
            .filter(|label| label.get_name() == "cluster" && label.get_value().starts_with(&prefix))
            .map(|label| label.get_value().to_string())
            .collect();
        for key in clusters {
            self.forget_phase_series(&key);
        }
    }

    fn forget_phase_series(&self, key: &str) {
        for candidate in ClusterPhase::ALL {
            let _ = self
                .cluster_phase
                .remove_label_values(&[key, candidate.as_str()]);
        }
    }

    pub fn record_decision(&self, role: ScalableRole, action: ScalingAction) {
        self.scaling_decisions_total
            .with_label_values(&[role.as_str(), action.as_str()])
            .inc();
    }

    pub fn record_conflicts(&self, kind: &str, conflicts: u32) {
        if conflicts > 0 {
            self.applier_conflicts_total
                .with_label_values(&[kind])
                .inc_by(u64::from(conflicts));
        }
    }

    pub fn record_fallback(&self, category: MetricCategory) {
        self.metric_fallbacks_total
            .with_label_values(&[category.as_str()])
            .inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_recorded_series() {
        let metrics = OperatorMetrics::new().unwrap();
        metrics.record_reconcile("success", 0.2);
        metrics.record_decision(ScalableRole::Primary, ScalingAction::Up);
        metrics.record_fallback(MetricCategory::Cpu);

        let output = metrics.export().unwrap();
        assert!(output.contains("quorum_reconciles_total"));
        assert!(output.contains("quorum_scaling_decisions_total{"));
        assert!(output.contains(r#"role="primary""#));
        assert!(output.contains(r#"quorum_metric_fallbacks_total{category="cpu"} 1"#));
    }

    #[test]
    fn test_phase_gauge_is_one_hot() {
        let metrics = OperatorMetrics::with_prefix("test").unwrap();
        let id = ClusterId::new("data", "orders");
        metrics.set_phase(&id, ClusterPhase::Forming);
        metrics.set_phase(&id, ClusterPhase::Ready);

        let ready = metrics
            .cluster_phase
            .with_label_values(&["data/orders", "Ready"])
            .get();
        let forming = metrics
            .cluster_phase
            .with_label_values(&["data/orders", "Forming"])
            .get();
        assert_eq!((ready, forming), (1, 0));

        metrics.forget_cluster(&id);
        assert!(!metrics.export().unwrap().contains("data/orders"));
    }

    #[test]
    fn test_forget_namespace_keeps_other_namespaces() {
        let metrics = OperatorMetrics::with_prefix("ns").unwrap();
        metrics.set_phase(&ClusterId::new("data", "orders"), ClusterPhase::Ready);
        metrics.set_phase(&ClusterId::new("data", "users"), ClusterPhase::Forming);
        metrics.set_phase(&ClusterId::new("logs", "events"), ClusterPhase::Ready);

        metrics.forget_namespace("data");
        let output = metrics.export().unwrap();
        assert!(!output.contains("data/orders"));
        assert!(!output.contains("data/users"));
        assert!(output.contains("logs/events"));
    }

    #[test]
    fn test_zero_conflicts_not_recorded() {
        let metrics = OperatorMetrics::new().unwrap();
        metrics.record_conflicts("fleet", 0);
        assert!(!metrics.export().unwrap().contains("applier_conflicts_total{"));
        metrics.record_conflicts("fleet", 2);
        assert!(metrics
            .export()
            .unwrap()
            .contains(r#"quorum_applier_conflicts_total{kind="fleet"} 2"#));
    }
}
