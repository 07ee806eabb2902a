//! Identifier types for clusters, members and reconcile cycles

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespaced identifier of a managed cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId {
    namespace: String,
    name: String,
}

impl ClusterId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store key of the cluster object (`namespace/name`)
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Store key of the fleet backing one member group
    pub fn fleet_key(&self, group: &str) -> String {
        format!("{}/{}/{}", self.namespace, self.name, group)
    }

    /// Parse a `namespace/name` key
    pub fn parse(key: &str) -> Option<Self> {
        let (namespace, name) = key.split_once('/')?;
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(namespace, name))
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Stable name of one workload unit in a cluster fleet
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberName(String);

impl MemberName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Deterministic name of the member at `ordinal` in `group`
    pub fn for_ordinal(cluster: &ClusterId, group: &str, ordinal: u32) -> Self {
        Self(format!("{}-{}-{}", cluster.name(), group, ordinal))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation identifier for one reconcile cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReconcileId(Uuid);

impl ReconcileId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ReconcileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reconcile:{}", self.0)
    }
}
