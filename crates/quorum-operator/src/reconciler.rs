//! One reconcile cycle for one cluster
//!
//! The cycle reads the desired state, member reports and current fleets,
//! then in order: computes the formation gate, renders and classifies each
//! group's template, writes fleets through the conflict-safe applier,
//! collects metrics and evaluates scaling (quorum protection first), and
//! finally overwrites the observed state.

use crate::context::OperatorContext;
use crate::error::{ReconcileError, ReconcileResult};
use chrono::{DateTime, Utc};
use quorum_autoscale::ScalingContext;
use quorum_formation::FormationAssessment;
use quorum_template::render::ENV_MEMBER_ROLE;
use quorum_template::{Classification, FormationSnapshot, TemplateField};
use quorum_types::{
    AutoscalingPolicy, ClusterDesiredState, ClusterId, ClusterObservedState, ClusterPhase,
    Condition, ConditionStatus, ConditionType, EnvValue, FleetSpec, FormationGate,
    MemberObservation, MemberStatus, MetricCategory, MetricSnapshot, OperatorEvent, ReconcileId,
    ScalableRole, ScalingDecision, ScalingRecord,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Result of a successful cycle
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub reconcile_id: ReconcileId,
    /// Observed state as written
    pub observed: ClusterObservedState,
    /// Template verdict per group
    pub classifications: BTreeMap<String, Classification>,
    pub snapshots: Vec<MetricSnapshot>,
    /// Fleet writes committed this cycle
    pub fleet_writes: usize,
}

#[derive(Default)]
struct TemplateStep {
    classifications: BTreeMap<String, Classification>,
    fingerprints: BTreeMap<String, String>,
    deferred: BTreeMap<String, Vec<TemplateField>>,
    fleets: BTreeMap<String, FleetSpec>,
    writes: usize,
    resized: bool,
}

#[derive(Default)]
struct ScalingStep {
    records: Vec<ScalingRecord>,
    snapshots: Vec<MetricSnapshot>,
    protected: Vec<String>,
    writes: usize,
}

/// Drives one cluster toward its desired state
#[derive(Clone)]
pub struct Reconciler {
    ctx: Arc<OperatorContext>,
}

impl Reconciler {
    pub fn new(ctx: Arc<OperatorContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<OperatorContext> {
        &self.ctx
    }

    /// Run one full cycle
    #[instrument(skip(self), fields(cluster = %cluster))]
    pub async fn reconcile(&self, cluster: &ClusterId) -> ReconcileResult<ReconcileOutcome> {
        let reconcile_id = ReconcileId::generate();
        let substrate = self.ctx.substrate();
        let key = cluster.key();
        let now = Utc::now();

        let desired = substrate
            .desired()
            .get(&key)
            .await?
            .map(|d| d.value)
            .ok_or_else(|| ReconcileError::ClusterNotFound(key.clone()))?;
        let previous = substrate.observed().get(&key).await?.map(|o| o.value);
        let members = substrate.members(cluster).await?;

        let mut fleets = BTreeMap::new();
        for group in &desired.groups {
            if let Some(fleet) = substrate.fleets().get(&cluster.fleet_key(&group.name)).await? {
                fleets.insert(group.name.clone(), fleet.value);
            }
        }

        let autoscaled = autoscaled_groups(&desired);
        let effective = effective_desired(&desired, &fleets, &autoscaled);
        check_role_constraints(&effective, &fleets, &members, previous.as_ref())?;

        // Rendered templates embed the gate, so it comes first.
        let gate = self.ctx.guard().gate(&effective, &members, previous.as_ref())?;
        let assessment =
            self.ctx
                .guard()
                .assess(&effective, &gate, &members, previous.as_ref(), now);
        debug!(
            reconcile_id = %reconcile_id,
            phase = %assessment.phase,
            min_members = ?gate.min_members,
            fleet_stable = assessment.fleet_stable,
            "Formation assessed"
        );

        let templates = self
            .apply_templates(reconcile_id, &effective, &gate, &assessment, &fleets, &autoscaled)
            .await?;

        let scaling = match effective.autoscaling.as_ref() {
            Some(policy) => {
                self.autoscale(reconcile_id, &effective, policy, &assessment, &members, &templates.fleets, now)
                    .await?
            }
            None => ScalingStep::default(),
        };

        let phase = finalize_phase(&assessment, templates.resized, scaling.writes > 0);
        let observed = self
            .write_observed(
                reconcile_id,
                &effective,
                previous.as_ref(),
                &members,
                &assessment,
                phase,
                &templates,
                &scaling,
                now,
            )
            .await?;

        Ok(ReconcileOutcome {
            reconcile_id,
            observed,
            classifications: templates.classifications,
            snapshots: scaling.snapshots,
            fleet_writes: templates.writes + scaling.writes,
        })
    }

    async fn apply_templates(
        &self,
        reconcile_id: ReconcileId,
        desired: &ClusterDesiredState,
        gate: &FormationGate,
        assessment: &FormationAssessment,
        fleets: &BTreeMap<String, FleetSpec>,
        autoscaled: &BTreeSet<String>,
    ) -> ReconcileResult<TemplateStep> {
        let cluster = &desired.id;
        let snapshot = FormationSnapshot {
            phase: assessment.phase,
            fleet_stable: assessment.fleet_stable,
        };
        let classifier = self.ctx.classifier();
        let mut step = TemplateStep::default();

        for group in &desired.groups {
            let rendered = self.ctx.renderer().render(desired, &group.name, gate)?;
            let owned_by_autoscaler = autoscaled.contains(&group.name);
            let declared = group.replicas;
            let current = fleets.get(&group.name);

            let classification = match current {
                Some(fleet) => classifier.classify(&fleet.template, &rendered, &snapshot),
                None => Classification {
                    apply: true,
                    reason: "fleet does not exist yet".to_string(),
                    changed: Vec::new(),
                    deferred: Vec::new(),
                    applied: rendered.clone(),
                },
            };

            let merge = |current: Option<&FleetSpec>| match current {
                None => FleetSpec::new(cluster.clone(), group.name.clone(), declared, rendered.clone()),
                Some(current) => {
                    let mut next = current.clone();
                    next.template = classifier.classify(&current.template, &rendered, &snapshot).applied;
                    if !owned_by_autoscaler {
                        next.replicas = declared;
                    }
                    next
                }
            };
            let outcome = self
                .ctx
                .applier()
                .apply(self.ctx.substrate().fleets(), &cluster.fleet_key(&group.name), merge)
                .await?;
            self.ctx.metrics().record_conflicts("fleet", outcome.conflicts);

            let fleet = outcome.object.value.clone();
            let fingerprint = fleet.template.fingerprint();

            if outcome.is_write() {
                step.writes += 1;
                if classification.apply {
                    info!(
                        reconcile_id = %reconcile_id,
                        group = %group.name,
                        fingerprint = %fingerprint,
                        reason = %classification.reason,
                        "Template applied"
                    );
                    self.ctx.emit(
                        cluster,
                        Some(reconcile_id),
                        OperatorEvent::TemplateApplied {
                            group: group.name.clone(),
                            fingerprint: fingerprint.clone(),
                            reason: classification.reason.clone(),
                        },
                    );
                }
            }

            if !classification.deferred.is_empty() {
                debug!(
                    reconcile_id = %reconcile_id,
                    group = %group.name,
                    reason = %classification.reason,
                    "Template change deferred"
                );
                self.ctx.emit(
                    cluster,
                    Some(reconcile_id),
                    OperatorEvent::TemplateDeferred {
                        group: group.name.clone(),
                        reason: classification.reason.clone(),
                    },
                );
                step.deferred.insert(group.name.clone(), classification.deferred.clone());
            }

            if let Some(previous) = current {
                if !owned_by_autoscaler && previous.replicas != declared {
                    info!(
                        reconcile_id = %reconcile_id,
                        group = %group.name,
                        from = previous.replicas,
                        to = declared,
                        "Group resized"
                    );
                    step.resized = true;
                }
            }

            step.fingerprints.insert(group.name.clone(), fingerprint);
            step.classifications.insert(group.name.clone(), classification);
            step.fleets.insert(group.name.clone(), fleet);
        }

        Ok(step)
    }

    #[allow(clippy::too_many_arguments)]
    async fn autoscale(
        &self,
        reconcile_id: ReconcileId,
        desired: &ClusterDesiredState,
        policy: &AutoscalingPolicy,
        assessment: &FormationAssessment,
        members: &[MemberStatus],
        fleets: &BTreeMap<String, FleetSpec>,
        now: DateTime<Utc>,
    ) -> ReconcileResult<ScalingStep> {
        let cluster = &desired.id;
        let mut step = ScalingStep::default();
        let groups = [
            (ScalableRole::Primary, policy.primaries.as_ref()),
            (ScalableRole::Secondary, policy.secondaries.as_ref()),
        ];

        for (role, group_policy) in groups {
            let Some(group_policy) = group_policy else {
                continue;
            };
            let group = group_policy.group.as_str();
            let Some(fleet) = fleets.get(group) else {
                warn!(reconcile_id = %reconcile_id, group, "Autoscaling policy names an unknown group");
                continue;
            };

            let snapshot = self
                .ctx
                .collector()
                .collect(cluster, group, role, members, &group_policy.metrics)
                .await;
            for category in snapshot.fallback_categories() {
                self.ctx.metrics().record_fallback(category);
            }

            let zone_counts = match role {
                ScalableRole::Secondary => zone_counts(members, group, &policy.zones),
                ScalableRole::Primary => BTreeMap::new(),
            };
            let scaling_ctx = ScalingContext {
                role,
                current: fleet.replicas,
                policy: group_policy,
                cluster_policy: policy,
                snapshot: &snapshot,
                zone_counts,
            };

            // Quorum protection is part of the decision, before any write.
            let engine = self.ctx.engine();
            let mut decision = engine.decide(&scaling_ctx);
            let deficit = engine.quorum_deficit(&scaling_ctx);
            if deficit.is_some() {
                step.protected.push(format!("{group}: {}", decision.reason));
            }

            let mut applied = false;
            if !assessment.phase.is_formed() {
                decision = ScalingDecision::none(fleet.replicas, "cluster not formed", decision.confidence);
            } else if deficit.is_some() {
                self.ctx.emit(
                    cluster,
                    Some(reconcile_id),
                    OperatorEvent::ScalingSuppressed {
                        group: group.to_string(),
                        reason: decision.reason.clone(),
                    },
                );
            } else if !decision.is_noop() && !assessment.fleet_stable {
                // One resize at a time: wait for the previous one to land.
                decision = ScalingDecision::none(
                    fleet.replicas,
                    format!("fleet not stable, holding {}", decision.reason),
                    decision.confidence,
                );
            } else if !decision.is_noop() {
                applied = self.write_scaling(reconcile_id, cluster, role, group, fleet, &decision).await?;
                if applied {
                    step.writes += 1;
                }
            }

            self.ctx.metrics().record_decision(role, decision.action);
            step.records.push(ScalingRecord {
                role,
                group: group.to_string(),
                decision,
                applied,
                decided_at: now,
            });
            step.snapshots.push(snapshot);
        }

        Ok(step)
    }

    async fn write_scaling(
        &self,
        reconcile_id: ReconcileId,
        cluster: &ClusterId,
        role: ScalableRole,
        group: &str,
        fleet: &FleetSpec,
        decision: &ScalingDecision,
    ) -> ReconcileResult<bool> {
        let target = decision.target;
        let zone_targets = &decision.zone_targets;
        let outcome = self
            .ctx
            .applier()
            .apply(self.ctx.substrate().fleets(), &cluster.fleet_key(group), |current: Option<&FleetSpec>| {
                let mut next = current.cloned().unwrap_or_else(|| fleet.clone());
                next.replicas = target;
                if !zone_targets.is_empty() {
                    next.zone_targets = zone_targets.clone();
                }
                next
            })
            .await?;
        self.ctx.metrics().record_conflicts("fleet", outcome.conflicts);

        if outcome.is_write() {
            info!(
                reconcile_id = %reconcile_id,
                group,
                role = %role,
                from = decision.current,
                to = target,
                confidence = decision.confidence,
                reason = %decision.reason,
                "Scaling applied"
            );
            self.ctx.emit(
                cluster,
                Some(reconcile_id),
                OperatorEvent::ScalingApplied {
                    group: group.to_string(),
                    role,
                    from: decision.current,
                    to: target,
                    reason: decision.reason.clone(),
                },
            );
        }
        Ok(outcome.is_write())
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_observed(
        &self,
        reconcile_id: ReconcileId,
        desired: &ClusterDesiredState,
        previous: Option<&ClusterObservedState>,
        members: &[MemberStatus],
        assessment: &FormationAssessment,
        phase: ClusterPhase,
        templates: &TemplateStep,
        scaling: &ScalingStep,
        now: DateTime<Utc>,
    ) -> ReconcileResult<ClusterObservedState> {
        let cluster = &desired.id;
        let mut observed = ClusterObservedState::new(cluster.clone());
        observed.phase = phase;
        observed.observed_generation = desired.generation;
        observed.members = members.iter().map(observe_member).collect();
        observed.template_fingerprints = templates.fingerprints.clone();
        observed.last_scaling = scaling.records.clone();
        observed.formation_started_at = assessment.formation_started_at;
        observed.formed_at = assessment.formed_at;
        observed.updated_at = now;

        for condition in assessment.conditions.iter().cloned() {
            observed.set_condition(condition, previous);
        }
        observed.set_condition(deferred_condition(&templates.deferred), previous);
        observed.set_condition(quorum_condition(&scaling.protected), previous);
        observed.set_condition(metrics_condition(&scaling.snapshots, &scaling.records), previous);
        observed.set_condition(scaling_condition(phase, &scaling.records), previous);

        // Observed state is derived data: overwrite it wholesale.
        let written = self
            .ctx
            .applier()
            .apply(self.ctx.substrate().observed(), &cluster.key(), |_| observed.clone())
            .await?;
        self.ctx.metrics().record_conflicts("observed", written.conflicts);

        let previous_phase = previous.map(|p| p.phase).unwrap_or_default();
        if phase != previous_phase {
            self.ctx.emit(
                cluster,
                Some(reconcile_id),
                OperatorEvent::PhaseChanged {
                    from: previous_phase,
                    to: phase,
                },
            );
        }
        let split_brain_known =
            previous.map(|p| p.has_condition(ConditionType::SplitBrainDetected)).unwrap_or(false);
        if !assessment.split_brain.is_empty() && !split_brain_known {
            self.ctx.emit(
                cluster,
                Some(reconcile_id),
                OperatorEvent::SplitBrainDetected {
                    partitions: assessment
                        .split_brain
                        .iter()
                        .map(|p| p.members.iter().cloned().collect())
                        .collect(),
                },
            );
        }
        self.ctx.metrics().set_phase(cluster, phase);

        Ok(written.object.value)
    }
}

/// Groups whose size the autoscaler owns
fn autoscaled_groups(desired: &ClusterDesiredState) -> BTreeSet<String> {
    desired
        .autoscaling
        .as_ref()
        .filter(|p| p.enabled)
        .map(|p| {
            [p.primaries.as_ref(), p.secondaries.as_ref()]
                .into_iter()
                .flatten()
                .map(|g| g.group.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Desired state with autoscaled groups sized by their current fleet.
///
/// Declared replicas only size an autoscaled group when its fleet is first
/// created.
fn effective_desired(
    desired: &ClusterDesiredState,
    fleets: &BTreeMap<String, FleetSpec>,
    autoscaled: &BTreeSet<String>,
) -> ClusterDesiredState {
    let mut effective = desired.clone();
    for group in &mut effective.groups {
        if !autoscaled.contains(&group.name) {
            continue;
        }
        if let Some(fleet) = fleets.get(&group.name) {
            group.replicas = fleet.replicas;
        }
    }
    effective
}

/// Reject a role change on a group that already took part in quorum
fn check_role_constraints(
    desired: &ClusterDesiredState,
    fleets: &BTreeMap<String, FleetSpec>,
    members: &[MemberStatus],
    previous: Option<&ClusterObservedState>,
) -> ReconcileResult<()> {
    let formed_before = previous.and_then(|p| p.formed_at).is_some();
    for group in &desired.groups {
        let Some(fleet) = fleets.get(&group.name) else {
            continue;
        };
        let Some(EnvValue::Literal(current_role)) = fleet.template.env_value(ENV_MEMBER_ROLE) else {
            continue;
        };
        if current_role == group.role.as_str() {
            continue;
        }
        let participated = formed_before
            || members
                .iter()
                .any(|m| m.group == group.name && (m.has_data || m.is_quorate()));
        if participated {
            return Err(ReconcileError::RoleReassignment {
                group: group.name.clone(),
                from: current_role.clone(),
                to: group.role.as_str().to_string(),
            });
        }
    }
    Ok(())
}

fn zone_counts(members: &[MemberStatus], group: &str, declared: &[String]) -> BTreeMap<String, u32> {
    let mut counts: BTreeMap<String, u32> = declared.iter().map(|z| (z.clone(), 0)).collect();
    for member in members.iter().filter(|m| m.group == group) {
        if let Some(zone) = &member.zone {
            *counts.entry(zone.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// Scaling entry and exit on top of the formation phase
fn finalize_phase(assessment: &FormationAssessment, resized: bool, scaled: bool) -> ClusterPhase {
    let changing = resized || scaled;
    match assessment.phase {
        ClusterPhase::Ready if changing => ClusterPhase::Scaling,
        ClusterPhase::Scaling if !changing && assessment.fleet_stable => ClusterPhase::Ready,
        phase => phase,
    }
}

fn observe_member(member: &MemberStatus) -> MemberObservation {
    MemberObservation {
        name: member.name.clone(),
        group: member.group.clone(),
        role: member.role,
        ready: member.ready,
        healthy: member.healthy,
        zone: member.zone.clone(),
        visible_peers: member.view.as_ref().map(|v| v.visible_peers.len()).unwrap_or(0),
    }
}

fn deferred_condition(deferred: &BTreeMap<String, Vec<TemplateField>>) -> Condition {
    if deferred.is_empty() {
        return Condition::new(
            ConditionType::TemplateUpdateDeferred,
            ConditionStatus::False,
            "TemplatesCurrent",
            "no template change is held back",
        );
    }
    let described: Vec<String> = deferred
        .iter()
        .map(|(group, fields)| {
            let fields: Vec<String> = fields.iter().map(ToString::to_string).collect();
            format!("{group} ({})", fields.join(", "))
        })
        .collect();
    Condition::new(
        ConditionType::TemplateUpdateDeferred,
        ConditionStatus::True,
        "AwaitingStableFleet",
        format!("non-critical changes held until the fleet is stable: {}", described.join("; ")),
    )
}

fn quorum_condition(protected: &[String]) -> Condition {
    if protected.is_empty() {
        Condition::new(
            ConditionType::QuorumProtected,
            ConditionStatus::False,
            "QuorumHealthy",
            "healthy primaries meet the protection floor",
        )
    } else {
        Condition::new(
            ConditionType::QuorumProtected,
            ConditionStatus::True,
            "PrimaryScalingSuppressed",
            protected.join("; "),
        )
    }
}

fn metrics_condition(snapshots: &[MetricSnapshot], records: &[ScalingRecord]) -> Condition {
    let categories: BTreeSet<MetricCategory> = snapshots
        .iter()
        .flat_map(MetricSnapshot::fallback_categories)
        .collect();
    if categories.is_empty() {
        return Condition::new(
            ConditionType::MetricsDegraded,
            ConditionStatus::False,
            "MetricsLive",
            "all scaling inputs came from the metrics source",
        );
    }
    let names: Vec<&str> = categories.iter().map(MetricCategory::as_str).collect();
    let confidence = records
        .iter()
        .map(|r| r.decision.confidence)
        .fold(f64::INFINITY, f64::min);
    let confidence = if confidence.is_finite() { confidence } else { 0.0 };
    Condition::new(
        ConditionType::MetricsDegraded,
        ConditionStatus::True,
        "FallbackValuesUsed",
        format!(
            "fallback values used for {}; decision confidence {:.2}",
            names.join(", "),
            confidence
        ),
    )
}

fn scaling_condition(phase: ClusterPhase, records: &[ScalingRecord]) -> Condition {
    if phase != ClusterPhase::Scaling {
        return Condition::new(
            ConditionType::ScalingInProgress,
            ConditionStatus::False,
            "Steady",
            "no resize in progress",
        );
    }
    let applied: Vec<String> = records
        .iter()
        .filter(|r| r.applied)
        .map(|r| format!("{} {} -> {}", r.group, r.decision.current, r.decision.target))
        .collect();
    let message = if applied.is_empty() {
        "waiting for the fleet to settle".to_string()
    } else {
        applied.join("; ")
    };
    Condition::new(ConditionType::ScalingInProgress, ConditionStatus::True, "Resizing", message)
}
