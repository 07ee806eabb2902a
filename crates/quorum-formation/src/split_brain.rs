//! Disjoint quorate subset detection

use quorum_types::{MemberName, MemberStatus};
use std::collections::BTreeSet;

/// A set of members that reports itself quorate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Members reporting quorate plus the peers they see
    pub members: BTreeSet<MemberName>,
    /// Cluster identities reported inside the partition
    pub cluster_uuids: BTreeSet<String>,
}

impl Partition {
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.members.iter().map(|m| m.as_str()).collect();
        if self.cluster_uuids.is_empty() {
            format!("[{}]", names.join(", "))
        } else {
            let ids: Vec<&str> = self.cluster_uuids.iter().map(String::as_str).collect();
            format!("[{}] (cluster {})", names.join(", "), ids.join("/"))
        }
    }
}

/// Group quorate members into partitions.
///
/// A quorate member's reach is itself plus its visible peers; reporters
/// whose reaches overlap belong to the same partition. More than one
/// partition means disjoint subsets each believe they are authoritative.
pub fn quorate_partitions(members: &[MemberStatus]) -> Vec<Partition> {
    let mut partitions: Vec<Partition> = Vec::new();

    for member in members {
        let Some(view) = member.view.as_ref().filter(|v| v.quorate) else {
            continue;
        };
        let mut reach: BTreeSet<MemberName> = view.visible_peers.clone();
        reach.insert(member.name.clone());
        let mut merged = Partition {
            members: reach,
            cluster_uuids: view.cluster_uuid.iter().cloned().collect(),
        };

        let (overlapping, rest): (Vec<_>, Vec<_>) = partitions
            .into_iter()
            .partition(|p| !p.members.is_disjoint(&merged.members));
        for p in overlapping {
            merged.members.extend(p.members);
            merged.cluster_uuids.extend(p.cluster_uuids);
        }
        partitions = rest;
        partitions.push(merged);
    }

    partitions.sort_by(|a, b| a.members.iter().next().cmp(&b.members.iter().next()));
    partitions
}
