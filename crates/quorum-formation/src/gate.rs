//! Formation gate computation

use crate::{FormationConfig, FormationError, FormationResult, RestartGate};
use quorum_types::{BootstrapHint, ClusterDesiredState, ClusterId, FormationGate, MemberName};
use std::collections::BTreeMap;

/// Stable address of a member, used to seed the bootstrap peer list
pub fn peer_address(cluster: &ClusterId, member: &MemberName, config: &FormationConfig) -> String {
    format!(
        "{}.{}-{}.{}.{}:{}",
        member,
        cluster.name(),
        config.discovery_service_suffix,
        cluster.namespace(),
        config.domain,
        config.transport_port
    )
}

/// Compute the gate for `desired`.
///
/// `has_existing_data` selects restart semantics. The seed peer list and
/// the hints are derived from declaration order only, so every cycle and
/// every member sees the same values.
pub fn compute_gate(
    desired: &ClusterDesiredState,
    has_existing_data: bool,
    config: &FormationConfig,
) -> FormationResult<FormationGate> {
    let members = desired.quorum_members();
    if members.is_empty() {
        return Err(FormationError::NoQuorumMembers(desired.id.clone()));
    }
    let n = members.len() as u32;

    let min_members = if has_existing_data {
        match config.restart_gate {
            RestartGate::Omit => None,
            RestartGate::Majority => Some(n / 2 + 1).filter(|m| *m < n),
        }
    } else {
        Some(n)
    };

    let hints: BTreeMap<MemberName, BootstrapHint> = members
        .iter()
        .enumerate()
        .map(|(index, member)| {
            let hint = if index == 0 && !has_existing_data {
                BootstrapHint::PreferredBootstrapper
            } else {
                BootstrapHint::Joiner
            };
            (member.clone(), hint)
        })
        .collect();

    let seed_peers = members
        .iter()
        .map(|member| peer_address(&desired.id, member, config))
        .collect();

    Ok(FormationGate {
        min_members,
        hints,
        seed_peers,
        first_formation: !has_existing_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quorum_types::{MemberGroupSpec, RoleConstraint};

    fn desired(primaries: u32, secondaries: u32) -> ClusterDesiredState {
        ClusterDesiredState::new(ClusterId::new("data", "orders"), "db:1.0")
            .with_group(MemberGroupSpec::new("masters", primaries, RoleConstraint::PrimaryOnly))
            .with_group(MemberGroupSpec::new("data", secondaries, RoleConstraint::SecondaryOnly))
    }

    #[test]
    fn test_first_formation_gate() {
        let gate = compute_gate(&desired(3, 2), false, &FormationConfig::default()).unwrap();
        assert_eq!(gate.min_members, Some(3));
        assert!(gate.first_formation);
        assert_eq!(
            gate.preferred_bootstrapper().map(|m| m.as_str()),
            Some("orders-masters-0")
        );
        assert_eq!(gate.seed_peers.len(), 3);
        assert_eq!(
            gate.seed_peers[0],
            "orders-masters-0.orders-discovery.data.svc.cluster.local:9300"
        );
    }

    #[test]
    fn test_restart_gate_omitted() {
        let gate = compute_gate(&desired(3, 0), true, &FormationConfig::default()).unwrap();
        assert_eq!(gate.min_members, None);
        assert!(gate.preferred_bootstrapper().is_none());
        assert!(!gate.first_formation);
    }

    #[test]
    fn test_restart_gate_majority() {
        let config = FormationConfig {
            restart_gate: RestartGate::Majority,
            ..Default::default()
        };
        let gate = compute_gate(&desired(5, 0), true, &config).unwrap();
        assert_eq!(gate.min_members, Some(3));

        let single = compute_gate(&desired(1, 0), true, &config).unwrap();
        assert_eq!(single.min_members, None);
    }

    #[test]
    fn test_no_quorum_members() {
        let err = compute_gate(&desired(0, 3), false, &FormationConfig::default()).unwrap_err();
        assert!(matches!(err, FormationError::NoQuorumMembers(_)));
    }

    proptest! {
        #[test]
        fn prop_first_formation_single_bootstrapper(n in 2u32..40) {
            let gate = compute_gate(&desired(n, 1), false, &FormationConfig::default()).unwrap();
            let bootstrappers = gate
                .hints
                .values()
                .filter(|h| **h == BootstrapHint::PreferredBootstrapper)
                .count();
            prop_assert_eq!(bootstrappers, 1);
            prop_assert_eq!(gate.min_members, Some(n));
        }

        #[test]
        fn prop_restart_gate_below_n(n in 2u32..40, majority in any::<bool>()) {
            let config = FormationConfig {
                restart_gate: if majority { RestartGate::Majority } else { RestartGate::Omit },
                ..Default::default()
            };
            let gate = compute_gate(&desired(n, 0), true, &config).unwrap();
            prop_assert!(gate.min_members.map(|m| m < n).unwrap_or(true));
        }
    }
}
