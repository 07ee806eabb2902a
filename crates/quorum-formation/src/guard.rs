//! Bootstrap & quorum guard

use crate::{compute_gate, quorate_partitions, FormationConfig, FormationResult, Partition, PhaseMachine};
use chrono::{DateTime, Utc};
use quorum_types::{
    ClusterDesiredState, ClusterObservedState, ClusterPhase, Condition, ConditionStatus,
    ConditionType, FormationGate, MemberStatus,
};
use tracing::{error, info, warn};

/// Formation-level view of one cycle
#[derive(Debug, Clone)]
pub struct FormationAssessment {
    /// Phase after at most one lifecycle step from the previous phase
    pub phase: ClusterPhase,
    pub conditions: Vec<Condition>,
    pub formation_started_at: Option<DateTime<Utc>>,
    pub formed_at: Option<DateTime<Utc>>,
    /// Disjoint quorate partitions, when more than one exists
    pub split_brain: Vec<Partition>,
    /// Every declared member is present and healthy
    pub fleet_stable: bool,
    /// Healthy members that may hold the primary role
    pub healthy_primaries: u32,
}

/// Computes the formation gate and derives the formation phase
#[derive(Debug, Clone, Default)]
pub struct QuorumGuard {
    config: FormationConfig,
}

impl QuorumGuard {
    pub fn new(config: FormationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FormationConfig {
        &self.config
    }

    /// Gate for this cycle.
    ///
    /// Restart semantics apply once any member holds data or the cluster
    /// has formed before.
    pub fn gate(
        &self,
        desired: &ClusterDesiredState,
        members: &[MemberStatus],
        previous: Option<&ClusterObservedState>,
    ) -> FormationResult<FormationGate> {
        let has_data = members.iter().any(|m| m.has_data)
            || previous.and_then(|p| p.formed_at).is_some();
        compute_gate(desired, has_data, &self.config)
    }

    /// Derive the formation phase and conditions from member reports.
    pub fn assess(
        &self,
        desired: &ClusterDesiredState,
        gate: &FormationGate,
        members: &[MemberStatus],
        previous: Option<&ClusterObservedState>,
        now: DateTime<Utc>,
    ) -> FormationAssessment {
        let cluster = &desired.id;
        let previous_phase = previous.map(|p| p.phase).unwrap_or_default();
        let formed_before = previous.and_then(|p| p.formed_at);

        let quorum_members = desired.quorum_members();
        let ready_quorum = members
            .iter()
            .filter(|m| m.ready && quorum_members.contains(&m.name))
            .count() as u32;
        let healthy_primaries = members
            .iter()
            .filter(|m| m.healthy && m.role.is_primary_eligible())
            .count() as u32;
        let fleet_stable = members.len() as u32 >= desired.member_count()
            && members.iter().all(|m| m.ready && m.healthy);

        let partitions = quorate_partitions(members);
        let split_brain = partitions.len() > 1;

        let formation_started_at = if formed_before.is_some() {
            None
        } else {
            previous.and_then(|p| p.formation_started_at).or(Some(now))
        };
        let timed_out = formation_started_at
            .map(|started| {
                now.signed_duration_since(started).to_std().unwrap_or_default()
                    >= self.config.timeout()
            })
            .unwrap_or(false);

        // A quorate group only counts once it spans the gate; a smaller
        // subset reporting quorum early must not form on its own.
        let required = gate.min_members.unwrap_or(1);
        let quorum_reached = match partitions.as_slice() {
            [partition] => {
                let covered = quorum_members
                    .iter()
                    .filter(|name| partition.members.contains(*name))
                    .count() as u32;
                covered >= required && ready_quorum >= required
            }
            _ => false,
        };
        if partitions.len() == 1 && !quorum_reached {
            warn!(
                cluster = %cluster,
                required,
                ready = ready_quorum,
                "Quorate subset smaller than the formation gate"
            );
        }

        let target = if split_brain {
            ClusterPhase::Degraded
        } else if quorum_reached {
            ClusterPhase::Ready
        } else if formed_before.is_none() && timed_out {
            ClusterPhase::Degraded
        } else if ready_quorum >= gate.min_members.unwrap_or(1) {
            ClusterPhase::AwaitingQuorum
        } else {
            ClusterPhase::Forming
        };

        let mut phase = PhaseMachine::step(previous_phase, target);
        // A formed cluster stays in Scaling until the reconciler says otherwise.
        if phase == ClusterPhase::Ready && previous_phase == ClusterPhase::Scaling {
            phase = ClusterPhase::Scaling;
        }
        let formed_at = formed_before.or_else(|| (phase == ClusterPhase::Ready).then_some(now));

        let mut conditions = Vec::new();

        if split_brain {
            let described: Vec<String> = partitions.iter().map(Partition::describe).collect();
            let message = format!(
                "{} disjoint member subsets each report quorum: {}. Operator intervention required; no automatic merge is attempted",
                partitions.len(),
                described.join(" vs ")
            );
            error!(cluster = %cluster, partitions = partitions.len(), "Split-brain detected");
            conditions.push(Condition::new(
                ConditionType::SplitBrainDetected,
                ConditionStatus::True,
                "DisjointQuorateSubsets",
                message,
            ));
        } else {
            conditions.push(Condition::new(
                ConditionType::SplitBrainDetected,
                ConditionStatus::False,
                "SingleQuorateGroup",
                "no disjoint quorate subsets observed",
            ));
        }

        if target == ClusterPhase::Degraded && !split_brain {
            let visibility = describe_visibility(&quorum_members, members);
            warn!(cluster = %cluster, ready = ready_quorum, "Formation timed out");
            conditions.push(Condition::new(
                ConditionType::FormationTimedOut,
                ConditionStatus::True,
                "QuorumNotReached",
                format!(
                    "formation did not reach quorum within {}s; last known visibility: {}",
                    self.config.timeout_secs, visibility
                ),
            ));
        } else {
            conditions.push(Condition::new(
                ConditionType::FormationTimedOut,
                ConditionStatus::False,
                "WithinWindow",
                "formation has not exceeded its window",
            ));
        }

        let (status, reason, message) = if phase.is_formed() {
            (ConditionStatus::True, "QuorumReached", "cluster reports a single quorate group".to_string())
        } else {
            (
                ConditionStatus::False,
                phase.as_str(),
                format!("{ready_quorum} of {} quorum members ready", quorum_members.len()),
            )
        };
        conditions.push(Condition::new(ConditionType::Formed, status, reason, message));

        if phase != previous_phase {
            info!(cluster = %cluster, from = %previous_phase, to = %phase, "Formation phase changed");
        }

        FormationAssessment {
            phase,
            conditions,
            formation_started_at: if formed_at.is_some() { None } else { formation_started_at },
            formed_at,
            split_brain: if split_brain { partitions } else { Vec::new() },
            fleet_stable,
            healthy_primaries,
        }
    }
}

fn describe_visibility(
    quorum_members: &[quorum_types::MemberName],
    members: &[MemberStatus],
) -> String {
    let total_peers = quorum_members.len().saturating_sub(1);
    quorum_members
        .iter()
        .map(|name| match members.iter().find(|m| &m.name == name) {
            None => format!("{name}: absent"),
            Some(m) if !m.ready => format!("{name}: not ready"),
            Some(m) => {
                let seen = m.view.as_ref().map(|v| v.visible_peers.len()).unwrap_or(0);
                format!("{name}: ready, sees {seen}/{total_peers} peers")
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
