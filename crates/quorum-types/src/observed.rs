//! Observed state derived by the core every cycle

use crate::{ClusterId, MemberName, RoleConstraint, ScalableRole, ScalingDecision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cluster lifecycle phase.
///
/// `Forming → AwaitingQuorum → Ready`, `Ready → Scaling → Ready`, and any
/// phase may move to `Degraded`. No phase is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClusterPhase {
    #[default]
    Forming,
    AwaitingQuorum,
    Ready,
    Scaling,
    Degraded,
}

impl ClusterPhase {
    pub const ALL: [ClusterPhase; 5] = [
        Self::Forming,
        Self::AwaitingQuorum,
        Self::Ready,
        Self::Scaling,
        Self::Degraded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forming => "Forming",
            Self::AwaitingQuorum => "AwaitingQuorum",
            Self::Ready => "Ready",
            Self::Scaling => "Scaling",
            Self::Degraded => "Degraded",
        }
    }

    /// The cluster has completed formation and serves traffic
    pub fn is_formed(&self) -> bool {
        matches!(self, Self::Ready | Self::Scaling)
    }
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Formed,
    SplitBrainDetected,
    FormationTimedOut,
    TemplateUpdateDeferred,
    QuorumProtected,
    MetricsDegraded,
    ScalingInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Structured diagnostic written into the observed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition: Utc::now(),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Per-member health as last observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberObservation {
    pub name: MemberName,
    pub group: String,
    pub role: RoleConstraint,
    pub ready: bool,
    pub healthy: bool,
    pub zone: Option<String>,
    /// Number of peers the member reported as visible
    pub visible_peers: usize,
}

/// Last scaling decision for one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRecord {
    pub role: ScalableRole,
    pub group: String,
    pub decision: ScalingDecision,
    /// A scaling write was committed for this decision
    pub applied: bool,
    pub decided_at: DateTime<Utc>,
}

/// State derived by the reconciliation loop, overwritten wholesale each cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterObservedState {
    pub cluster: ClusterId,
    pub phase: ClusterPhase,

    /// Desired-state generation this observation was computed against
    pub observed_generation: u64,

    pub members: Vec<MemberObservation>,

    /// Last-applied template fingerprint per member group
    pub template_fingerprints: BTreeMap<String, String>,

    pub last_scaling: Vec<ScalingRecord>,
    pub conditions: Vec<Condition>,

    /// When first formation started, if the cluster has not formed yet
    pub formation_started_at: Option<DateTime<Utc>>,

    /// When the cluster first reached `Ready`
    pub formed_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl ClusterObservedState {
    pub fn new(cluster: ClusterId) -> Self {
        Self {
            cluster,
            phase: ClusterPhase::Forming,
            observed_generation: 0,
            members: Vec::new(),
            template_fingerprints: BTreeMap::new(),
            last_scaling: Vec::new(),
            conditions: Vec::new(),
            formation_started_at: None,
            formed_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    pub fn has_condition(&self, condition_type: ConditionType) -> bool {
        self.condition(condition_type)
            .map(Condition::is_true)
            .unwrap_or(false)
    }

    /// Insert or replace a condition.
    ///
    /// The transition time is carried over from `previous` when the status
    /// did not change.
    pub fn set_condition(&mut self, mut condition: Condition, previous: Option<&ClusterObservedState>) {
        if let Some(prior) = previous.and_then(|p| p.condition(condition.condition_type)) {
            if prior.status == condition.status {
                condition.last_transition = prior.last_transition;
            }
        }
        self.conditions
            .retain(|c| c.condition_type != condition.condition_type);
        self.conditions.push(condition);
    }

    pub fn healthy_members(&self) -> usize {
        self.members.iter().filter(|m| m.healthy).count()
    }

    pub fn scaling_record(&self, group: &str) -> Option<&ScalingRecord> {
        self.last_scaling.iter().find(|r| r.group == group)
    }
}
