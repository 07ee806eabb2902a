//! Member status as reported by the substrate

use crate::{MemberName, RoleConstraint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Observed state of one workload unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberStatus {
    pub name: MemberName,

    /// Member group (fleet) the unit belongs to
    pub group: String,

    /// Stable ordinal within the group
    pub ordinal: u32,

    pub role: RoleConstraint,

    /// Scheduled and running
    pub ready: bool,

    /// Passing engine health checks
    pub healthy: bool,

    /// Zone label of the execution host
    #[serde(default)]
    pub zone: Option<String>,

    /// Persisted data already present on the member's volume
    #[serde(default)]
    pub has_data: bool,

    /// The member's own view of cluster membership, if it reports one
    #[serde(default)]
    pub view: Option<MemberView>,

    /// Resource usage reported by the substrate
    #[serde(default)]
    pub usage: Option<MemberUsage>,
}

impl MemberStatus {
    pub fn new(
        name: MemberName,
        group: impl Into<String>,
        ordinal: u32,
        role: RoleConstraint,
    ) -> Self {
        Self {
            name,
            group: group.into(),
            ordinal,
            role,
            ready: false,
            healthy: false,
            zone: None,
            has_data: false,
            view: None,
            usage: None,
        }
    }

    pub fn is_quorate(&self) -> bool {
        self.view.as_ref().map(|v| v.quorate).unwrap_or(false)
    }
}

/// Membership as seen from inside one member
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemberView {
    /// The member believes it is part of a quorate, authoritative cluster
    pub quorate: bool,

    /// Identity of the cluster the member joined, once formed
    #[serde(default)]
    pub cluster_uuid: Option<String>,

    /// Peers the member can currently see (excluding itself)
    #[serde(default)]
    pub visible_peers: BTreeSet<MemberName>,
}

/// Point-in-time resource usage of one member
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemberUsage {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub connections: Option<f64>,
    pub ops_per_sec: Option<f64>,
    pub query_latency_p95_ms: Option<f64>,
}
