//! In-memory substrate implementation

use super::traits::{Substrate, SubstrateEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use quorum_store::{InMemoryVersionedStore, StoreResult, VersionedStore};
use quorum_types::{
    ClusterDesiredState, ClusterId, ClusterObservedState, FleetSpec, MemberName, MemberStatus,
    MemberView, RoleConstraint, VersionToken,
};
use std::collections::BTreeSet;
use tokio::sync::broadcast;

/// In-memory substrate for development and testing.
///
/// Member status is whatever the test or the dev harness last reported;
/// [`InMemorySubstrate::materialize_members`] derives it from the fleets.
pub struct InMemorySubstrate {
    desired: InMemoryVersionedStore<ClusterDesiredState>,
    observed: InMemoryVersionedStore<ClusterObservedState>,
    fleets: InMemoryVersionedStore<FleetSpec>,
    members: DashMap<String, Vec<MemberStatus>>,
    events: broadcast::Sender<SubstrateEvent>,
}

impl Default for InMemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySubstrate {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            desired: InMemoryVersionedStore::new(),
            observed: InMemoryVersionedStore::new(),
            fleets: InMemoryVersionedStore::new(),
            members: DashMap::new(),
            events,
        }
    }

    fn publish(&self, event: SubstrateEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Create or replace the desired state of a cluster
    pub async fn put_cluster(&self, desired: ClusterDesiredState) -> StoreResult<VersionToken> {
        let key = desired.id.key();
        let id = desired.id.clone();
        let token = match self.desired.get(&key).await? {
            Some(current) => self.desired.update(&key, desired, current.version).await?,
            None => self.desired.create(&key, desired).await?,
        };
        self.publish(SubstrateEvent::ClusterChanged(id));
        Ok(token)
    }

    /// Remove a cluster with its fleets, members and observed state
    pub async fn remove_cluster(&self, cluster: &ClusterId) -> StoreResult<()> {
        let key = cluster.key();
        self.desired.delete(&key).await?;
        self.observed.delete(&key).await?;
        for (fleet_key, _) in self.fleets.list(&format!("{key}/")).await? {
            self.fleets.delete(&fleet_key).await?;
        }
        self.members.remove(&key);
        self.publish(SubstrateEvent::ClusterDeleted(cluster.clone()));
        Ok(())
    }

    pub async fn fleet(&self, cluster: &ClusterId, group: &str) -> StoreResult<Option<FleetSpec>> {
        Ok(self
            .fleets
            .get(&cluster.fleet_key(group))
            .await?
            .map(|f| f.value))
    }

    pub async fn observed_state(&self, cluster: &ClusterId) -> StoreResult<Option<ClusterObservedState>> {
        Ok(self.observed.get(&cluster.key()).await?.map(|o| o.value))
    }

    /// Replace the reported members of a cluster
    pub fn set_members(&self, cluster: &ClusterId, members: Vec<MemberStatus>) {
        self.members.insert(cluster.key(), members);
        self.publish(SubstrateEvent::MembersChanged(cluster.clone()));
    }

    /// Mutate every reported member of a cluster in place
    pub fn update_members(&self, cluster: &ClusterId, mut f: impl FnMut(&mut MemberStatus)) {
        if let Some(mut members) = self.members.get_mut(&cluster.key()) {
            members.iter_mut().for_each(&mut f);
        }
        self.publish(SubstrateEvent::MembersChanged(cluster.clone()));
    }

    pub fn add_namespace(&self, namespace: impl Into<String>) {
        self.publish(SubstrateEvent::NamespaceAdded(namespace.into()));
    }

    pub fn remove_namespace(&self, namespace: impl Into<String>) {
        self.publish(SubstrateEvent::NamespaceRemoved(namespace.into()));
    }

    /// Report one member per fleet slot.
    ///
    /// With `ready` set every member is healthy, holds data and sees every
    /// other member in a single quorate view. Zones follow the fleet's zone
    /// targets in key order. Usage reported earlier is kept.
    pub async fn materialize_members(
        &self,
        cluster: &ClusterId,
        ready: bool,
    ) -> StoreResult<Vec<MemberStatus>> {
        let key = cluster.key();
        let desired = self.desired.get(&key).await?.map(|d| d.value);
        let fleets = self.fleets.list(&format!("{key}/")).await?;
        let previous = self.members.get(&key).map(|m| m.clone()).unwrap_or_default();

        let mut members = Vec::new();
        for (_, fleet) in fleets {
            let fleet = fleet.value;
            let role = desired
                .as_ref()
                .and_then(|d| d.group(&fleet.group))
                .map(|g| g.role)
                .unwrap_or(RoleConstraint::Unconstrained);
            let zones: Vec<&String> = fleet
                .zone_targets
                .iter()
                .flat_map(|(zone, count)| std::iter::repeat(zone).take(*count as usize))
                .collect();

            for ordinal in 0..fleet.replicas {
                let name = MemberName::for_ordinal(cluster, &fleet.group, ordinal);
                let mut member = MemberStatus::new(name.clone(), fleet.group.clone(), ordinal, role);
                member.ready = ready;
                member.healthy = ready;
                member.zone = zones.get(ordinal as usize).map(|z| z.to_string());
                if let Some(prior) = previous.iter().find(|m| m.name == name) {
                    member.usage = prior.usage;
                    member.has_data = prior.has_data;
                }
                member.has_data |= ready;
                members.push(member);
            }
        }

        if ready {
            let everyone: BTreeSet<MemberName> = members.iter().map(|m| m.name.clone()).collect();
            for member in &mut members {
                let mut visible_peers = everyone.clone();
                visible_peers.remove(&member.name);
                member.view = Some(MemberView {
                    quorate: true,
                    cluster_uuid: Some(format!("{}-uuid", cluster.name())),
                    visible_peers,
                });
            }
        }

        self.set_members(cluster, members.clone());
        Ok(members)
    }
}

#[async_trait]
impl Substrate for InMemorySubstrate {
    fn desired(&self) -> &dyn VersionedStore<ClusterDesiredState> {
        &self.desired
    }

    fn observed(&self) -> &dyn VersionedStore<ClusterObservedState> {
        &self.observed
    }

    fn fleets(&self) -> &dyn VersionedStore<FleetSpec> {
        &self.fleets
    }

    async fn members(&self, cluster: &ClusterId) -> StoreResult<Vec<MemberStatus>> {
        Ok(self
            .members
            .get(&cluster.key())
            .map(|m| m.clone())
            .unwrap_or_default())
    }

    fn subscribe(&self) -> broadcast::Receiver<SubstrateEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_types::{MemberGroupSpec, MemberRuntimeTemplate};

    fn cluster() -> ClusterDesiredState {
        ClusterDesiredState::new(ClusterId::new("data", "orders"), "db:1.0")
            .with_group(MemberGroupSpec::new("masters", 3, RoleConstraint::PrimaryOnly))
    }

    #[tokio::test]
    async fn test_put_cluster_bumps_version_and_notifies() {
        let substrate = InMemorySubstrate::new();
        let mut events = substrate.subscribe();

        let first = substrate.put_cluster(cluster()).await.unwrap();
        let second = substrate.put_cluster(cluster()).await.unwrap();
        assert_eq!(second, first.next());

        let id = ClusterId::new("data", "orders");
        assert_eq!(events.recv().await.unwrap(), SubstrateEvent::ClusterChanged(id));
    }

    #[tokio::test]
    async fn test_materialize_members_from_fleet() {
        let substrate = InMemorySubstrate::new();
        let desired = cluster();
        let id = desired.id.clone();
        substrate.put_cluster(desired).await.unwrap();

        let mut fleet = FleetSpec::new(id.clone(), "masters", 3, MemberRuntimeTemplate::default());
        fleet.zone_targets = [("zone-a".to_string(), 2), ("zone-b".to_string(), 1)].into();
        substrate.fleets().create(&fleet.key(), fleet).await.unwrap();

        let members = substrate.materialize_members(&id, true).await.unwrap();
        assert_eq!(members.len(), 3);
        assert!(members.iter().all(|m| m.ready && m.is_quorate()));
        assert_eq!(members[0].role, RoleConstraint::PrimaryOnly);
        assert_eq!(members[2].zone.as_deref(), Some("zone-b"));
        assert_eq!(
            members[0].view.as_ref().unwrap().visible_peers.len(),
            2
        );
        assert_eq!(substrate.members(&id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_remove_cluster_clears_everything() {
        let substrate = InMemorySubstrate::new();
        let desired = cluster();
        let id = desired.id.clone();
        substrate.put_cluster(desired).await.unwrap();
        let fleet = FleetSpec::new(id.clone(), "masters", 3, MemberRuntimeTemplate::default());
        substrate.fleets().create(&fleet.key(), fleet).await.unwrap();
        substrate.materialize_members(&id, false).await.unwrap();

        substrate.remove_cluster(&id).await.unwrap();
        assert!(substrate.desired().get(&id.key()).await.unwrap().is_none());
        assert!(substrate.fleet(&id, "masters").await.unwrap().is_none());
        assert!(substrate.members(&id).await.unwrap().is_empty());
    }
}
