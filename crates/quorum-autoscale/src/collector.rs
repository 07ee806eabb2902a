//! Metric snapshot collection

use crate::config::QueryScope;
use crate::{FallbackValues, MetricsConfig, MetricsResult, MetricsSource, PrometheusSource};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use quorum_types::{
    ClusterId, LatencyPercentiles, MemberStatus, MemberUsage, MetricCategory, MetricKind,
    MetricOrigin, MetricSample, MetricSnapshot, MetricTarget, ScalableRole,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Collects per-group metric snapshots.
///
/// Only the latest snapshot per fleet is kept, to fill the `previous`
/// field of the next one.
pub struct MetricsCollector {
    config: MetricsConfig,
    source: Option<Arc<dyn MetricsSource>>,
    history: DashMap<String, MetricSnapshot>,
}

/// Value resolved for one query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedValue {
    pub value: f64,
    pub origin: MetricOrigin,
    pub category: MetricCategory,
}

impl MetricsCollector {
    pub fn new(config: MetricsConfig, source: Option<Arc<dyn MetricsSource>>) -> Self {
        Self {
            config,
            source,
            history: DashMap::new(),
        }
    }

    /// Build a collector, with a Prometheus source when a URL is configured
    pub fn from_config(config: MetricsConfig) -> MetricsResult<Self> {
        let source = match config.prometheus_url.as_deref() {
            Some(url) => {
                let source: Arc<dyn MetricsSource> =
                    Arc::new(PrometheusSource::new(url, config.query_timeout())?);
                Some(source)
            }
            None => None,
        };
        Ok(Self::new(config, source))
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn fallback(&self) -> &FallbackValues {
        &self.config.fallback
    }

    /// Run `query` against the external source, substituting the fallback
    /// for its category on any failure or when no source is configured
    pub async fn query_or_fallback(&self, query: &str, at: DateTime<Utc>) -> ResolvedValue {
        let (category, fallback) = self.config.fallback.for_query(query);
        let Some(source) = self.source.as_ref() else {
            return ResolvedValue {
                value: fallback,
                origin: MetricOrigin::Fallback,
                category,
            };
        };
        match source.query(query, at).await {
            Ok(value) => ResolvedValue {
                value,
                origin: MetricOrigin::Live,
                category,
            },
            Err(error) => {
                warn!(
                    query,
                    category = category.as_str(),
                    fallback,
                    error = %error,
                    "Metrics source unavailable, using fallback value"
                );
                ResolvedValue {
                    value: fallback,
                    origin: MetricOrigin::Fallback,
                    category,
                }
            }
        }
    }

    /// Prefer the external source; without one, use member-reported usage
    async fn resolve(&self, query: String, local: Option<f64>, at: DateTime<Utc>) -> ResolvedValue {
        match (&self.source, local) {
            (None, Some(value)) => ResolvedValue {
                value,
                origin: MetricOrigin::Live,
                category: FallbackValues::classify_query(&query),
            },
            _ => self.query_or_fallback(&query, at).await,
        }
    }

    /// Produce a fresh snapshot for one scalable group
    #[instrument(skip(self, members, targets), fields(cluster = %cluster))]
    pub async fn collect(
        &self,
        cluster: &ClusterId,
        group: &str,
        role: ScalableRole,
        members: &[MemberStatus],
        targets: &[MetricTarget],
    ) -> MetricSnapshot {
        let now = Utc::now();
        let fleet_key = cluster.fleet_key(group);
        let group_members: Vec<&MemberStatus> =
            members.iter().filter(|m| m.group == group).collect();
        let scope = QueryScope {
            namespace: cluster.namespace(),
            cluster: cluster.name(),
            group,
            role: role.as_str(),
        };
        let queries = &self.config.queries;
        let local = |pick: fn(&MemberUsage) -> Option<f64>| average_usage(&group_members, pick);

        let (cpu, memory, connections, throughput, p50, p95, p99) = tokio::join!(
            self.resolve(scope.render(&queries.cpu), local(|u| u.cpu_percent), now),
            self.resolve(scope.render(&queries.memory), local(|u| u.memory_percent), now),
            self.resolve(scope.render(&queries.connections), local(|u| u.connections), now),
            self.resolve(scope.render(&queries.throughput), local(|u| u.ops_per_sec), now),
            self.resolve(scope.render(&queries.latency_p50), None, now),
            self.resolve(
                scope.render(&queries.latency_p95),
                local(|u| u.query_latency_p95_ms),
                now
            ),
            self.resolve(scope.render(&queries.latency_p99), None, now),
        );

        let external: Vec<(&String, String)> = targets
            .iter()
            .filter_map(|t| match &t.metric {
                MetricKind::External { name, query } => Some((name, scope.render(query))),
                _ => None,
            })
            .collect();
        let resolved = join_all(
            external
                .iter()
                .map(|(_, query)| self.query_or_fallback(query, now)),
        )
        .await;

        let previous = self.history.get(&fleet_key).map(|p| p.clone());
        let sample = |value: ResolvedValue, prior: Option<&MetricSample>| {
            MetricSample::new(value.value, prior.map(|p| p.current), value.origin)
        };

        let custom: BTreeMap<String, MetricSample> = external
            .iter()
            .zip(resolved)
            .map(|((name, _), value)| {
                let prior = previous.as_ref().and_then(|p| p.custom.get(*name));
                ((*name).clone(), sample(value, prior))
            })
            .collect();

        let prev = previous.as_ref();
        let snapshot = MetricSnapshot {
            cluster: cluster.clone(),
            role,
            group: group.to_string(),
            healthy: group_members.iter().filter(|m| m.healthy).count() as u32,
            total: group_members.len() as u32,
            cpu: sample(cpu, prev.map(|p| &p.cpu)),
            memory: sample(memory, prev.map(|p| &p.memory)),
            connections: sample(connections, prev.map(|p| &p.connections)),
            throughput: sample(throughput, prev.map(|p| &p.throughput)),
            latency: LatencyPercentiles {
                p50: sample(p50, prev.map(|p| &p.latency.p50)),
                p95: sample(p95, prev.map(|p| &p.latency.p95)),
                p99: sample(p99, prev.map(|p| &p.latency.p99)),
            },
            custom,
            collected_at: now,
        };

        debug!(
            group,
            healthy = snapshot.healthy,
            total = snapshot.total,
            cpu = snapshot.cpu.current,
            fallbacks = snapshot.fallback_categories().len(),
            "Metric snapshot collected"
        );
        self.history.insert(fleet_key, snapshot.clone());
        snapshot
    }

    /// Drop retained history for a fleet that no longer exists
    pub fn forget(&self, cluster: &ClusterId, group: &str) {
        self.history.remove(&cluster.fleet_key(group));
    }

    /// Drop retained history for every fleet whose key starts with `prefix`
    pub fn forget_prefix(&self, prefix: &str) {
        self.history.retain(|key, _| !key.starts_with(prefix));
    }
}

fn average_usage(members: &[&MemberStatus], pick: fn(&MemberUsage) -> Option<f64>) -> Option<f64> {
    let values: Vec<f64> = members
        .iter()
        .filter(|m| m.ready)
        .filter_map(|m| m.usage.as_ref().and_then(pick))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsError;
    use async_trait::async_trait;
    use quorum_types::{MemberName, RoleConstraint, Trend};
    use std::sync::Mutex;

    struct ScriptedSource {
        values: Mutex<Vec<MetricsResult<f64>>>,
    }

    impl ScriptedSource {
        fn constant(value: f64) -> Self {
            Self {
                values: Mutex::new((0..64).map(|_| Ok(value)).collect()),
            }
        }
    }

    #[async_trait]
    impl MetricsSource for ScriptedSource {
        async fn query(&self, _query: &str, _at: DateTime<Utc>) -> MetricsResult<f64> {
            self.values
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(MetricsError::EmptyResult))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl MetricsSource for FailingSource {
        async fn query(&self, _query: &str, _at: DateTime<Utc>) -> MetricsResult<f64> {
            Err(MetricsError::BadStatus(503))
        }
    }

    fn members(cpu: f64) -> Vec<MemberStatus> {
        let cluster = ClusterId::new("data", "orders");
        (0..3)
            .map(|i| {
                let mut m = MemberStatus::new(
                    MemberName::for_ordinal(&cluster, "data", i),
                    "data",
                    i,
                    RoleConstraint::SecondaryOnly,
                );
                m.ready = true;
                m.healthy = i != 2;
                m.usage = Some(MemberUsage {
                    cpu_percent: Some(cpu),
                    ..Default::default()
                });
                m
            })
            .collect()
    }

    #[tokio::test]
    async fn test_local_usage_without_source() {
        let collector = MetricsCollector::new(MetricsConfig::default(), None);
        let cluster = ClusterId::new("data", "orders");
        let snapshot = collector
            .collect(&cluster, "data", ScalableRole::Secondary, &members(80.0), &[])
            .await;

        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.healthy, 2);
        assert_eq!(snapshot.cpu.current, 80.0);
        assert_eq!(snapshot.cpu.origin, MetricOrigin::Live);
        // No member reports memory and no source is configured.
        assert_eq!(snapshot.memory.origin, MetricOrigin::Fallback);
        assert_eq!(snapshot.memory.current, 50.0);
    }

    #[tokio::test]
    async fn test_previous_value_and_trend_carried_forward() {
        let collector = MetricsCollector::new(MetricsConfig::default(), None);
        let cluster = ClusterId::new("data", "orders");
        collector
            .collect(&cluster, "data", ScalableRole::Secondary, &members(40.0), &[])
            .await;
        let second = collector
            .collect(&cluster, "data", ScalableRole::Secondary, &members(60.0), &[])
            .await;

        assert_eq!(second.cpu.previous, Some(40.0));
        assert_eq!(second.cpu.trend, Trend::Rising);
    }

    #[tokio::test]
    async fn test_source_failure_uses_fallbacks() {
        let config = MetricsConfig {
            fallback: FallbackValues {
                cpu: 33.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let source: Arc<dyn MetricsSource> = Arc::new(FailingSource);
        let collector = MetricsCollector::new(config, Some(source));
        let cluster = ClusterId::new("data", "orders");
        let targets = vec![MetricTarget::new(
            MetricKind::External {
                name: "queue".into(),
                query: "queue_depth{cluster=\"{cluster}\"}".into(),
            },
            10.0,
        )];
        let snapshot = collector
            .collect(&cluster, "data", ScalableRole::Secondary, &members(90.0), &targets)
            .await;

        assert_eq!(snapshot.cpu.current, 33.0);
        assert!(snapshot.cpu.is_fallback());
        assert!(snapshot.custom["queue"].is_fallback());
        assert!(snapshot
            .fallback_categories()
            .contains(&MetricCategory::Custom));
    }

    #[tokio::test]
    async fn test_source_values_are_live() {
        let source: Arc<dyn MetricsSource> = Arc::new(ScriptedSource::constant(12.0));
        let collector = MetricsCollector::new(MetricsConfig::default(), Some(source));
        let cluster = ClusterId::new("data", "orders");
        let snapshot = collector
            .collect(&cluster, "data", ScalableRole::Secondary, &members(90.0), &[])
            .await;
        assert_eq!(snapshot.cpu.current, 12.0);
        assert!(snapshot.fallback_categories().is_empty());
    }

    #[tokio::test]
    async fn test_from_config_without_url_has_no_source() {
        let collector = MetricsCollector::from_config(MetricsConfig::default()).unwrap();
        let resolved = collector.query_or_fallback("avg(node_cpu_seconds_total)", Utc::now()).await;
        assert_eq!(resolved.category, MetricCategory::Cpu);
        assert_eq!(resolved.origin, MetricOrigin::Fallback);
    }
}
