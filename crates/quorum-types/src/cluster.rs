//! Desired state of a managed database cluster
//!
//! A ClusterDesiredState is owned by the caller and read-only to the core.
//! Admission has already validated it by the time the core sees it.

use crate::{AutoscalingPolicy, ClusterId, EnvVar, MemberName, ResourceRequirements};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// User-declared intent for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDesiredState {
    /// Cluster identifier
    pub id: ClusterId,

    /// Bumped by the caller on every user update
    #[serde(default)]
    pub generation: u64,

    /// Runtime image reference
    pub image: String,

    /// Member groups in declaration order
    pub groups: Vec<MemberGroupSpec>,

    /// Resource requests and limits applied to every member
    #[serde(default)]
    pub resources: ResourceRequirements,

    /// Custom engine configuration rendered into each member
    #[serde(default)]
    pub engine_config: BTreeMap<String, String>,

    /// Additional environment entries
    #[serde(default)]
    pub env: Vec<EnvVar>,

    /// Service identity bound to every member
    #[serde(default)]
    pub service_account: String,

    /// Execution units run next to the engine, in order
    #[serde(default)]
    pub sidecars: Vec<String>,

    /// Autoscaling policy
    #[serde(default)]
    pub autoscaling: Option<AutoscalingPolicy>,
}

impl ClusterDesiredState {
    pub fn new(id: ClusterId, image: impl Into<String>) -> Self {
        Self {
            id,
            generation: 1,
            image: image.into(),
            groups: Vec::new(),
            resources: ResourceRequirements::default(),
            engine_config: BTreeMap::new(),
            env: Vec::new(),
            service_account: String::new(),
            sidecars: Vec::new(),
            autoscaling: None,
        }
    }

    pub fn with_group(mut self, group: MemberGroupSpec) -> Self {
        self.groups.push(group);
        self
    }

    pub fn with_autoscaling(mut self, policy: AutoscalingPolicy) -> Self {
        self.autoscaling = Some(policy);
        self
    }

    pub fn group(&self, name: &str) -> Option<&MemberGroupSpec> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Total declared member count across all groups
    pub fn member_count(&self) -> u32 {
        self.groups.iter().map(|g| g.replicas).sum()
    }

    /// Members that take part in quorum formation, in bootstrap order.
    ///
    /// Groups that may hold the primary role are walked in declaration
    /// order; index 0 of the result is the preferred bootstrapper.
    pub fn quorum_members(&self) -> Vec<MemberName> {
        self.groups
            .iter()
            .filter(|g| g.role.is_primary_eligible())
            .flat_map(|g| {
                (0..g.replicas).map(move |i| MemberName::for_ordinal(&self.id, &g.name, i))
            })
            .collect()
    }

    /// Member count N the formation gate is sized against
    pub fn quorum_member_count(&self) -> u32 {
        self.groups
            .iter()
            .filter(|g| g.role.is_primary_eligible())
            .map(|g| g.replicas)
            .sum()
    }
}

/// One homogeneous group of members backed by a single fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberGroupSpec {
    /// Group name, unique within the cluster
    pub name: String,

    /// Declared member count
    pub replicas: u32,

    /// Role constraint shared by every member of the group
    #[serde(default)]
    pub role: RoleConstraint,
}

impl MemberGroupSpec {
    pub fn new(name: impl Into<String>, replicas: u32, role: RoleConstraint) -> Self {
        Self {
            name: name.into(),
            replicas,
            role,
        }
    }
}

/// Role a member is allowed to take in the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleConstraint {
    /// May be elected primary or serve as secondary
    #[default]
    Unconstrained,
    /// Primary-eligible only
    PrimaryOnly,
    /// Never primary-eligible
    SecondaryOnly,
}

impl RoleConstraint {
    /// Whether members with this constraint count toward the quorum gate
    pub fn is_primary_eligible(&self) -> bool {
        !matches!(self, Self::SecondaryOnly)
    }

    /// Scalable group the constraint belongs to
    pub fn scalable_role(&self) -> ScalableRole {
        if self.is_primary_eligible() {
            ScalableRole::Primary
        } else {
            ScalableRole::Secondary
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconstrained => "unconstrained",
            Self::PrimaryOnly => "primary-only",
            Self::SecondaryOnly => "secondary-only",
        }
    }
}

/// Scalable role groups the autoscaler reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalableRole {
    Primary,
    Secondary,
}

impl ScalableRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for ScalableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
