//! Scale decision engine
//!
//! Turns a [`MetricSnapshot`] into a one-step [`ScalingDecision`] for a
//! single scalable group. Quorum protection is checked before anything
//! else, so a suppressed primary decision never carries a new target.

use crate::{distribute_across_zones, IdleScoring, MetricRule, MetricsConfig};
use quorum_types::{
    AutoscalingPolicy, GroupScalingPolicy, MetricSnapshot, ScalableRole, ScalingAction,
    ScalingDecision,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Nudge an even `target` to the nearest odd count within `[min, max]`.
///
/// `+1` is preferred over `-1`. If neither neighbour fits the bounds the
/// target is returned unchanged.
pub fn ensure_odd_replicas(target: u32, min: u32, max: u32) -> u32 {
    if target % 2 == 1 {
        return target;
    }
    let in_bounds = |v: u32| v >= min && v <= max;
    if let Some(up) = target.checked_add(1).filter(|v| in_bounds(*v)) {
        return up;
    }
    if let Some(down) = target.checked_sub(1).filter(|v| in_bounds(*v)) {
        return down;
    }
    target
}

/// Weighted evaluation of every metric configured for a group
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Weighted average score in [0, 1]
    pub score: f64,
    /// One reason per metric, in policy order
    pub reasons: Vec<String>,
    /// Mean per-metric confidence
    pub confidence: f64,
}

/// Inputs for one group decision
#[derive(Debug, Clone)]
pub struct ScalingContext<'a> {
    pub role: ScalableRole,
    /// Current fleet size
    pub current: u32,
    pub policy: &'a GroupScalingPolicy,
    pub cluster_policy: &'a AutoscalingPolicy,
    pub snapshot: &'a MetricSnapshot,
    /// Current member count per zone; empty disables zone distribution
    pub zone_counts: BTreeMap<String, u32>,
}

/// Threshold-based scaling with quorum and parity constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleDecisionEngine {
    scale_up_threshold: f64,
    scale_down_threshold: f64,
    fallback_confidence: f64,
    default_weight: f64,
    idle_scoring: IdleScoring,
}

impl Default for ScaleDecisionEngine {
    fn default() -> Self {
        Self::new(&MetricsConfig::default())
    }
}

impl ScaleDecisionEngine {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            scale_up_threshold: config.scale_up_threshold,
            scale_down_threshold: config.scale_down_threshold,
            fallback_confidence: config.fallback_confidence.clamp(0.0, 1.0),
            default_weight: config.default_weight,
            idle_scoring: config.idle_scoring,
        }
    }

    /// Score every configured metric and combine them by weight.
    ///
    /// A group without metrics is neutral at full confidence.
    pub fn evaluate(&self, policy: &GroupScalingPolicy, snapshot: &MetricSnapshot) -> Evaluation {
        if policy.metrics.is_empty() {
            return Evaluation {
                score: 0.5,
                reasons: vec!["no metrics configured".to_string()],
                confidence: 1.0,
            };
        }

        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        let mut confidence = 0.0;
        let mut reasons = Vec::with_capacity(policy.metrics.len());

        for target in &policy.metrics {
            let weight = target.weight.unwrap_or(self.default_weight).max(0.0);
            let label = target.metric.label();
            let (score, reason, metric_confidence) = match snapshot.sample(&target.metric) {
                Some(sample) => {
                    let rule = MetricRule::for_kind(&target.metric);
                    let outcome =
                        rule.evaluate_with(label, sample.current, target.target, self.idle_scoring);
                    let credit = if sample.is_fallback() {
                        self.fallback_confidence
                    } else {
                        1.0
                    };
                    let reason = if sample.is_fallback() {
                        format!("{} (fallback)", outcome.reason)
                    } else {
                        outcome.reason
                    };
                    (outcome.score, reason, credit)
                }
                None => (
                    0.5,
                    format!("{label}: no sample, treated as neutral"),
                    self.fallback_confidence,
                ),
            };
            weighted += score * weight;
            total_weight += weight;
            confidence += metric_confidence;
            reasons.push(reason);
        }

        let score = if total_weight > 0.0 {
            weighted / total_weight
        } else {
            0.5
        };
        Evaluation {
            score,
            reasons,
            confidence: confidence / policy.metrics.len() as f64,
        }
    }

    /// Healthy primaries missing before quorum protection lifts.
    ///
    /// `None` when protection is off, the group holds secondaries, or
    /// enough primaries are healthy.
    pub fn quorum_deficit(&self, ctx: &ScalingContext<'_>) -> Option<u32> {
        if ctx.role != ScalableRole::Primary || !ctx.cluster_policy.quorum_protection {
            return None;
        }
        ctx.cluster_policy
            .min_healthy_primaries
            .checked_sub(ctx.snapshot.healthy)
            .filter(|deficit| *deficit > 0)
    }

    /// Decide the next size for one group
    pub fn decide(&self, ctx: &ScalingContext<'_>) -> ScalingDecision {
        let evaluation = self.evaluate(ctx.policy, ctx.snapshot);
        let group = ctx.policy.group.as_str();

        if !ctx.cluster_policy.enabled {
            return ScalingDecision::none(ctx.current, "autoscaling disabled", evaluation.confidence);
        }

        if let Some(deficit) = self.quorum_deficit(ctx) {
            let healthy = ctx.snapshot.healthy;
            let required = ctx.cluster_policy.min_healthy_primaries;
            warn!(
                cluster = %ctx.snapshot.cluster,
                group,
                healthy,
                required,
                deficit,
                "Primary scaling suppressed by quorum protection"
            );
            return ScalingDecision::none(
                ctx.current,
                format!(
                    "quorum protection: {healthy} healthy primaries, {required} required (deficit {deficit})"
                ),
                evaluation.confidence,
            );
        }

        let stepped = if evaluation.score > self.scale_up_threshold {
            ctx.current.saturating_add(1)
        } else if evaluation.score < self.scale_down_threshold {
            ctx.current.saturating_sub(1)
        } else {
            ctx.current
        };
        let min = ctx.policy.min_replicas;
        let max = ctx.policy.max_replicas.max(min);
        let mut target = ctx.policy.clamp(stepped);

        if ctx.role == ScalableRole::Primary && !ctx.cluster_policy.allow_even_primaries {
            target = ensure_odd_replicas(target, min, max);
        }

        let summary = format!("score {:.2}: {}", evaluation.score, evaluation.reasons.join("; "));
        let action = match target.cmp(&ctx.current) {
            std::cmp::Ordering::Greater => ScalingAction::Up,
            std::cmp::Ordering::Less => ScalingAction::Down,
            std::cmp::Ordering::Equal => {
                debug!(group, score = evaluation.score, "No scaling action");
                return ScalingDecision::none(ctx.current, summary, evaluation.confidence);
            }
        };

        let zone_targets = if ctx.role == ScalableRole::Secondary && !ctx.zone_counts.is_empty() {
            distribute_across_zones(&ctx.zone_counts, target, ctx.cluster_policy.min_per_zone)
        } else {
            BTreeMap::new()
        };

        info!(
            cluster = %ctx.snapshot.cluster,
            group,
            role = %ctx.role,
            action = %action,
            from = ctx.current,
            to = target,
            score = evaluation.score,
            confidence = evaluation.confidence,
            "Scaling decision"
        );

        ScalingDecision {
            action,
            current: ctx.current,
            target,
            reason: summary,
            confidence: evaluation.confidence,
            zone_targets,
        }
    }
}
