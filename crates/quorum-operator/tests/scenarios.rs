//! End-to-end reconcile scenarios against the in-memory substrate

use quorum_operator::{
    InMemorySubstrate, OperatorConfig, OperatorContext, ReconcileOutcome, Reconciler, Substrate,
};
use quorum_types::{
    AutoscalingPolicy, ClusterDesiredState, ClusterId, ClusterPhase, ConditionType, EnvVar,
    GroupScalingPolicy, MemberGroupSpec, MetricKind, MetricTarget, OperatorEvent, RoleConstraint,
    ScalingAction,
};
use std::sync::Arc;

fn orders(replicas: u32) -> ClusterDesiredState {
    ClusterDesiredState::new(ClusterId::new("data", "orders"), "db:1.0")
        .with_group(MemberGroupSpec::new("masters", replicas, RoleConstraint::PrimaryOnly))
}

fn harness(config: OperatorConfig) -> (Arc<InMemorySubstrate>, Arc<OperatorContext>, Reconciler) {
    let substrate = Arc::new(InMemorySubstrate::new());
    let dyn_substrate: Arc<dyn Substrate> = substrate.clone();
    let ctx = OperatorContext::new(config, dyn_substrate).unwrap();
    let reconciler = Reconciler::new(ctx.clone());
    (substrate, ctx, reconciler)
}

/// Reconcile until a cycle writes nothing to the fleets
async fn settle(reconciler: &Reconciler, id: &ClusterId) -> ReconcileOutcome {
    for _ in 0..10 {
        let outcome = reconciler.reconcile(id).await.unwrap();
        if outcome.fleet_writes == 0 {
            return outcome;
        }
    }
    panic!("cluster {id} did not settle");
}

/// Bring a cluster to Ready with every member reporting one quorate view
async fn form(substrate: &InMemorySubstrate, reconciler: &Reconciler, id: &ClusterId) {
    reconciler.reconcile(id).await.unwrap();
    substrate.materialize_members(id, true).await.unwrap();
    for _ in 0..3 {
        reconciler.reconcile(id).await.unwrap();
    }
    let outcome = settle(reconciler, id).await;
    assert_eq!(outcome.observed.phase, ClusterPhase::Ready);
}

#[tokio::test]
async fn scenario_a_first_formation_reaches_ready() {
    let (substrate, ctx, reconciler) = harness(OperatorConfig::default());
    let mut events = ctx.subscribe_events();
    let desired = orders(3);
    let id = desired.id.clone();
    substrate.put_cluster(desired).await.unwrap();

    // No members yet
    let outcome = reconciler.reconcile(&id).await.unwrap();
    assert_eq!(outcome.observed.phase, ClusterPhase::Forming);
    assert!(outcome.observed.formation_started_at.is_some());

    // Every member up, none reporting quorum
    substrate.materialize_members(&id, false).await.unwrap();
    substrate.update_members(&id, |m| {
        m.ready = true;
        m.healthy = true;
    });
    let outcome = reconciler.reconcile(&id).await.unwrap();
    assert_eq!(outcome.observed.phase, ClusterPhase::AwaitingQuorum);

    // A single quorate group
    substrate.materialize_members(&id, true).await.unwrap();
    let outcome = reconciler.reconcile(&id).await.unwrap();
    assert_eq!(outcome.observed.phase, ClusterPhase::Ready);
    assert!(outcome.observed.formed_at.is_some());
    assert!(outcome.observed.formation_started_at.is_none());
    assert!(outcome.observed.has_condition(ConditionType::Formed));
    assert!(!outcome.observed.has_condition(ConditionType::SplitBrainDetected));

    let mut transitions = Vec::new();
    while let Ok(envelope) = events.try_recv() {
        if let OperatorEvent::PhaseChanged { from, to } = envelope.event {
            transitions.push((from, to));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (ClusterPhase::Forming, ClusterPhase::AwaitingQuorum),
            (ClusterPhase::AwaitingQuorum, ClusterPhase::Ready),
        ]
    );
}

#[tokio::test]
async fn scenario_b_image_change_applies_mid_formation() {
    let (substrate, _ctx, reconciler) = harness(OperatorConfig::default());
    let desired = orders(3);
    let id = desired.id.clone();
    substrate.put_cluster(desired.clone()).await.unwrap();
    reconciler.reconcile(&id).await.unwrap();
    substrate.materialize_members(&id, false).await.unwrap();
    let before = substrate.fleet(&id, "masters").await.unwrap().unwrap();

    let mut resized = desired;
    resized.groups[0].replicas = 4;
    resized.image = "db:1.1".to_string();
    resized.generation = 2;
    substrate.put_cluster(resized).await.unwrap();

    let outcome = reconciler.reconcile(&id).await.unwrap();
    assert_ne!(outcome.observed.phase, ClusterPhase::Ready);

    let classification = &outcome.classifications["masters"];
    assert!(classification.apply);
    assert!(classification.reason.contains("db:1.1"));

    let fleet = substrate.fleet(&id, "masters").await.unwrap().unwrap();
    assert_eq!(fleet.template.image, "db:1.1");
    assert_eq!(fleet.replicas, 4);
    // Peer seeding for the new size waits for a stable fleet.
    assert_eq!(
        fleet.template.env,
        before.template.env,
        "non-critical changes stay deferred while members are missing"
    );
    assert!(outcome
        .observed
        .has_condition(ConditionType::TemplateUpdateDeferred));
}

#[tokio::test]
async fn scenario_c_external_env_entries_are_tolerated() {
    let (substrate, _ctx, reconciler) = harness(OperatorConfig::default());
    let desired = orders(3);
    let id = desired.id.clone();
    substrate.put_cluster(desired).await.unwrap();
    form(&substrate, &reconciler, &id).await;

    // Another controller injects two entries into the fleet template.
    let key = id.fleet_key("masters");
    let current = substrate.fleets().get(&key).await.unwrap().unwrap();
    let mut injected = current.value.clone();
    injected.template.env.push(EnvVar::literal("SIDECAR_INJECTED", "true"));
    injected.template.env.push(EnvVar::literal("MESH_ID", "mesh-7"));
    let token = substrate
        .fleets()
        .update(&key, injected, current.version)
        .await
        .unwrap();

    let outcome = reconciler.reconcile(&id).await.unwrap();
    let classification = &outcome.classifications["masters"];
    assert!(!classification.apply);
    assert_eq!(outcome.fleet_writes, 0);

    let after = substrate.fleets().get(&key).await.unwrap().unwrap();
    assert_eq!(after.version, token);
    assert!(after.value.template.env_value("MESH_ID").is_some());
    assert_eq!(outcome.observed.phase, ClusterPhase::Ready);
}

#[tokio::test]
async fn scenario_d_unreachable_metrics_fall_back() {
    let mut config = OperatorConfig::default();
    config.metrics.prometheus_url = Some("http://127.0.0.1:1".to_string());
    config.metrics.query_timeout_ms = 1_000;
    let (substrate, ctx, reconciler) = harness(config);

    let policy = AutoscalingPolicy {
        enabled: true,
        primaries: Some(
            GroupScalingPolicy::new("masters", 3, 7)
                .with_metric(MetricTarget::new(MetricKind::Cpu, 70.0)),
        ),
        ..AutoscalingPolicy::default()
    };
    let desired = orders(3).with_autoscaling(policy);
    let id = desired.id.clone();
    substrate.put_cluster(desired).await.unwrap();
    form(&substrate, &reconciler, &id).await;

    let outcome = reconciler.reconcile(&id).await.unwrap();
    let snapshot = &outcome.snapshots[0];
    assert!(snapshot.cpu.is_fallback());
    assert_eq!(snapshot.cpu.current, 50.0);

    let record = outcome.observed.scaling_record("masters").unwrap();
    assert_eq!(record.decision.action, ScalingAction::None);
    assert_eq!(record.decision.current, 3);
    assert!((record.decision.confidence - 0.5).abs() < 1e-9);

    let degraded = outcome
        .observed
        .condition(ConditionType::MetricsDegraded)
        .unwrap();
    assert!(degraded.is_true());
    assert!(degraded.message.contains("cpu"));

    let cpu_query = "avg(rate(container_cpu_usage_seconds_total[5m])) * 100";
    let resolved = ctx.collector().query_or_fallback(cpu_query, chrono::Utc::now()).await;
    assert_eq!(resolved.value, 50.0);
    assert!(ctx
        .metrics()
        .export()
        .unwrap()
        .contains(r#"quorum_metric_fallbacks_total{category="cpu"}"#));
}
