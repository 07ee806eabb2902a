//! Autoscaling policy and decisions

use crate::MetricKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scaling action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingAction {
    None,
    Up,
    Down,
}

impl ScalingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for ScalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the decision engine for one scalable group.
///
/// Consumed once, applied to the fleet size, then discarded; only its
/// record in the observed state survives the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub action: ScalingAction,

    /// Fleet size the decision was made against
    pub current: u32,

    /// Fleet size to apply
    pub target: u32,

    /// Human-readable reason
    pub reason: String,

    /// Confidence in [0, 1]; lowered when fallback metrics were used
    pub confidence: f64,

    /// Per-zone targets for zone-aware groups
    #[serde(default)]
    pub zone_targets: BTreeMap<String, u32>,
}

impl ScalingDecision {
    pub fn none(current: u32, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            action: ScalingAction::None,
            current,
            target: current,
            reason: reason.into(),
            confidence,
            zone_targets: BTreeMap::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.action == ScalingAction::None
    }
}

/// Cluster-level autoscaling policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoscalingPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Policy for the primary-eligible group
    #[serde(default)]
    pub primaries: Option<GroupScalingPolicy>,

    /// Policy for the secondary group
    #[serde(default)]
    pub secondaries: Option<GroupScalingPolicy>,

    /// Suppress primary scaling while healthy primaries are below minimum
    #[serde(default = "default_true")]
    pub quorum_protection: bool,

    #[serde(default = "default_min_healthy_primaries")]
    pub min_healthy_primaries: u32,

    /// Permit even primary counts
    #[serde(default)]
    pub allow_even_primaries: bool,

    /// Zones secondaries are spread across, in addition to observed zones
    #[serde(default)]
    pub zones: Vec<String>,

    /// Floor applied to every zone after distribution
    #[serde(default)]
    pub min_per_zone: u32,
}

impl Default for AutoscalingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            primaries: None,
            secondaries: None,
            quorum_protection: true,
            min_healthy_primaries: default_min_healthy_primaries(),
            allow_even_primaries: false,
            zones: Vec::new(),
            min_per_zone: 0,
        }
    }
}

/// Bounds and metric targets for one scalable group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupScalingPolicy {
    /// Member group this policy resizes
    pub group: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    #[serde(default)]
    pub metrics: Vec<MetricTarget>,
}

impl GroupScalingPolicy {
    pub fn new(group: impl Into<String>, min_replicas: u32, max_replicas: u32) -> Self {
        Self {
            group: group.into(),
            min_replicas,
            max_replicas,
            metrics: Vec::new(),
        }
    }

    pub fn with_metric(mut self, target: MetricTarget) -> Self {
        self.metrics.push(target);
        self
    }

    pub fn clamp(&self, count: u32) -> u32 {
        count.clamp(self.min_replicas, self.max_replicas.max(self.min_replicas))
    }
}

/// A metric and the value the group should hover around
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTarget {
    pub metric: MetricKind,
    pub target: f64,

    /// Relative weight; unspecified means 1
    #[serde(default)]
    pub weight: Option<f64>,
}

impl MetricTarget {
    pub fn new(metric: MetricKind, target: f64) -> Self {
        Self {
            metric,
            target,
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}

fn default_true() -> bool {
    true
}

fn default_min_healthy_primaries() -> u32 {
    2
}
