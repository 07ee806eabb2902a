//! Substrate trait definitions

use async_trait::async_trait;
use quorum_store::{StoreResult, VersionedStore};
use quorum_types::{ClusterDesiredState, ClusterId, ClusterObservedState, FleetSpec, MemberStatus};
use tokio::sync::broadcast;

/// Change notifications published by the substrate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstrateEvent {
    /// Desired state was created or updated
    ClusterChanged(ClusterId),
    /// Desired state was removed
    ClusterDeleted(ClusterId),
    /// Member readiness, health or views changed
    MembersChanged(ClusterId),
    NamespaceAdded(String),
    NamespaceRemoved(String),
}

impl SubstrateEvent {
    pub fn namespace(&self) -> &str {
        match self {
            Self::ClusterChanged(id) | Self::ClusterDeleted(id) | Self::MembersChanged(id) => {
                id.namespace()
            }
            Self::NamespaceAdded(ns) | Self::NamespaceRemoved(ns) => ns,
        }
    }

    /// Cluster the event is about, if any
    pub fn cluster(&self) -> Option<&ClusterId> {
        match self {
            Self::ClusterChanged(id) | Self::ClusterDeleted(id) | Self::MembersChanged(id) => {
                Some(id)
            }
            Self::NamespaceAdded(_) | Self::NamespaceRemoved(_) => None,
        }
    }
}

/// Everything the reconciler reads from and writes to
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Desired cluster state, keyed by `namespace/name`; read-only to the core
    fn desired(&self) -> &dyn VersionedStore<ClusterDesiredState>;

    /// Observed cluster state, keyed by `namespace/name`
    fn observed(&self) -> &dyn VersionedStore<ClusterObservedState>;

    /// Fleets, keyed by `namespace/name/group`
    fn fleets(&self) -> &dyn VersionedStore<FleetSpec>;

    /// Current status of every member of a cluster
    async fn members(&self, cluster: &ClusterId) -> StoreResult<Vec<MemberStatus>>;

    /// Subscribe to change notifications
    fn subscribe(&self) -> broadcast::Receiver<SubstrateEvent>;
}
