//! Replicated-unit construct backing one member group

use crate::{ClusterId, MemberRuntimeTemplate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Writable fleet object: runtime template, target size and zone targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSpec {
    pub cluster: ClusterId,
    pub group: String,
    pub replicas: u32,
    pub template: MemberRuntimeTemplate,

    /// Per-zone member targets; empty means unconstrained placement
    #[serde(default)]
    pub zone_targets: BTreeMap<String, u32>,
}

impl FleetSpec {
    pub fn new(
        cluster: ClusterId,
        group: impl Into<String>,
        replicas: u32,
        template: MemberRuntimeTemplate,
    ) -> Self {
        Self {
            cluster,
            group: group.into(),
            replicas,
            template,
            zone_targets: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> String {
        self.cluster.fleet_key(&self.group)
    }
}
