//! Reconcile scheduling
//!
//! Periodic sweeps over every in-scope cluster plus on-demand triggers.
//! Cycles run concurrently up to `max_concurrent`; a cluster never has two
//! cycles in flight.

use crate::context::{cancelled, OperatorContext};
use crate::error::{ReconcileError, ReconcileResult};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::watcher::ReconcileScope;
use dashmap::DashSet;
use quorum_types::{ClusterId, OperatorEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Request for reconcile work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileTrigger {
    Cluster(ClusterId),
    Sweep,
}

/// Releases a cluster's in-flight slot when dropped, including on panic
struct InFlightSlot<'a> {
    in_flight: &'a DashSet<String>,
    key: &'a str,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(self.key);
    }
}

/// Scheduler state
pub struct Scheduler {
    ctx: Arc<OperatorContext>,
    reconciler: Reconciler,
    trigger_tx: mpsc::Sender<ReconcileTrigger>,
    permits: Arc<Semaphore>,
    in_flight: DashSet<String>,
    /// Clusters triggered while a cycle was running; re-queued when it ends
    rerun: DashSet<String>,
}

impl Scheduler {
    /// Create a new scheduler and the receiving end of its trigger channel
    pub fn new(ctx: Arc<OperatorContext>) -> (Arc<Self>, mpsc::Receiver<ReconcileTrigger>) {
        let config = &ctx.config().reconciler;
        let (trigger_tx, trigger_rx) = mpsc::channel(config.trigger_capacity.max(1));
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

        let scheduler = Arc::new(Self {
            reconciler: Reconciler::new(ctx.clone()),
            ctx,
            trigger_tx,
            permits,
            in_flight: DashSet::new(),
            rerun: DashSet::new(),
        });
        (scheduler, trigger_rx)
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Queue one cluster for reconciliation
    pub async fn trigger(&self, cluster: ClusterId) {
        if self.trigger_tx.send(ReconcileTrigger::Cluster(cluster)).await.is_err() {
            debug!("Scheduler stopped, trigger dropped");
        }
    }

    /// Queue a sweep over every in-scope cluster
    pub async fn trigger_sweep(&self) {
        if self.trigger_tx.send(ReconcileTrigger::Sweep).await.is_err() {
            debug!("Scheduler stopped, sweep dropped");
        }
    }

    /// Whether a cycle for `cluster` is running
    pub fn is_in_flight(&self, cluster: &ClusterId) -> bool {
        self.in_flight.contains(&cluster.key())
    }

    /// Run until shutdown
    pub async fn run(
        self: Arc<Self>,
        mut triggers: mpsc::Receiver<ReconcileTrigger>,
        scope: watch::Receiver<ReconcileScope>,
    ) {
        let mut shutdown = self.ctx.shutdown_token();
        let mut ticker = interval(self.ctx.config().reconciler.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.ctx.config().reconciler.interval_secs,
            max_concurrent = self.ctx.config().reconciler.max_concurrent,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancelled(&mut shutdown) => break,
                _ = ticker.tick() => {
                    let current = scope.borrow().clone();
                    self.sweep(&current).await;
                }
                Some(trigger) = triggers.recv() => {
                    let current = scope.borrow().clone();
                    match trigger {
                        ReconcileTrigger::Sweep => {
                            self.sweep(&current).await;
                        }
                        ReconcileTrigger::Cluster(cluster) if current.contains(&cluster) => {
                            self.dispatch(cluster, current);
                        }
                        ReconcileTrigger::Cluster(cluster) => {
                            debug!(cluster = %cluster, "Trigger outside scope ignored");
                        }
                    }
                }
                else => break,
            }
        }

        info!("Scheduler stopped");
    }

    /// Start a cycle for every in-scope cluster
    pub async fn sweep(self: &Arc<Self>, scope: &ReconcileScope) -> usize {
        let clusters = match self.ctx.substrate().desired().list("").await {
            Ok(clusters) => clusters,
            Err(e) => {
                error!(error = %e, "Failed to list clusters for sweep");
                return 0;
            }
        };

        let mut started = 0;
        for (_, desired) in clusters {
            let cluster = desired.value.id;
            if scope.contains(&cluster) && self.spawn_cycle(cluster, scope.clone()).is_some() {
                started += 1;
            }
        }
        debug!(started, generation = scope.generation(), "Sweep dispatched");
        started
    }

    /// Start a cycle for a triggered cluster.
    ///
    /// A trigger that lands while the cluster's cycle is running is
    /// coalesced into one follow-up cycle. Returns whether a cycle started.
    pub fn dispatch(self: &Arc<Self>, cluster: ClusterId, scope: ReconcileScope) -> bool {
        let key = cluster.key();
        if self.spawn_cycle(cluster, scope).is_some() {
            return true;
        }
        self.rerun.insert(key);
        false
    }

    /// Start a background cycle unless one is already running for the cluster
    pub fn spawn_cycle(self: &Arc<Self>, cluster: ClusterId, scope: ReconcileScope) -> Option<JoinHandle<()>> {
        let key = cluster.key();
        if !self.in_flight.insert(key.clone()) {
            debug!(cluster = %cluster, "Reconcile already in flight, skipping");
            return None;
        }

        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move {
            {
                let _slot = InFlightSlot {
                    in_flight: &scheduler.in_flight,
                    key: &key,
                };
                // Errors are logged and recorded inside run_cycle.
                let _ = scheduler.run_cycle(&cluster, scope).await;
            }
            if scheduler.rerun.remove(&key).is_some() {
                debug!(cluster = %cluster, "Re-queueing trigger received mid-cycle");
                scheduler.trigger(cluster).await;
            }
        }))
    }

    /// One bounded, cancellable cycle.
    ///
    /// The cycle ends early when its deadline passes, when the scope it was
    /// started under is restarted, or on shutdown.
    pub async fn run_cycle(
        &self,
        cluster: &ClusterId,
        scope: ReconcileScope,
    ) -> ReconcileResult<ReconcileOutcome> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ReconcileError::Cancelled)?;

        let deadline = self.ctx.config().reconciler.cycle_deadline();
        let mut scope_token = scope.cancel_token();
        let mut shutdown = self.ctx.shutdown_token();
        let started = Instant::now();

        let result = tokio::select! {
            result = tokio::time::timeout(deadline, self.reconciler.reconcile(cluster)) => {
                result.unwrap_or_else(|_| Err(ReconcileError::DeadlineExceeded(deadline.as_millis() as u64)))
            }
            _ = cancelled(&mut scope_token) => Err(ReconcileError::Cancelled),
            _ = cancelled(&mut shutdown) => Err(ReconcileError::Cancelled),
        };
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(outcome) => {
                self.ctx.metrics().record_reconcile("success", elapsed);
                debug!(
                    cluster = %cluster,
                    reconcile_id = %outcome.reconcile_id,
                    phase = %outcome.observed.phase,
                    writes = outcome.fleet_writes,
                    "Reconcile finished"
                );
            }
            Err(ReconcileError::Cancelled) => {
                self.ctx.metrics().record_reconcile("cancelled", elapsed);
                debug!(cluster = %cluster, "Reconcile cancelled");
            }
            Err(e) => {
                let transient = e.is_transient();
                self.ctx.metrics().record_reconcile("error", elapsed);
                if transient {
                    warn!(cluster = %cluster, error = %e, "Reconcile failed, retrying next sweep");
                } else {
                    error!(cluster = %cluster, error = %e, "Reconcile failed");
                }
                self.ctx.emit(
                    cluster,
                    None,
                    OperatorEvent::ReconcileFailed {
                        error: e.to_string(),
                        transient,
                    },
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorConfig;
    use crate::substrate::{InMemorySubstrate, Substrate};
    use quorum_types::{ClusterDesiredState, ClusterPhase, MemberGroupSpec, RoleConstraint};
    use std::collections::BTreeSet;

    fn setup() -> (Arc<InMemorySubstrate>, Arc<OperatorContext>, Arc<Scheduler>) {
        let substrate = Arc::new(InMemorySubstrate::new());
        let dyn_substrate: Arc<dyn Substrate> = substrate.clone();
        let ctx = OperatorContext::with_metrics_source(OperatorConfig::default(), dyn_substrate, None)
            .unwrap();
        let (scheduler, _) = Scheduler::new(ctx.clone());
        (substrate, ctx, scheduler)
    }

    fn cluster(namespace: &str, name: &str) -> ClusterDesiredState {
        ClusterDesiredState::new(ClusterId::new(namespace, name), "db:1.0")
            .with_group(MemberGroupSpec::new("masters", 3, RoleConstraint::PrimaryOnly))
    }

    #[tokio::test]
    async fn test_run_cycle_records_success() {
        let (substrate, ctx, scheduler) = setup();
        let desired = cluster("data", "orders");
        let id = desired.id.clone();
        substrate.put_cluster(desired).await.unwrap();

        let (scope, _cancel) = ReconcileScope::initial(BTreeSet::new());
        let outcome = scheduler.run_cycle(&id, scope).await.unwrap();
        assert_eq!(outcome.observed.phase, ClusterPhase::Forming);
        assert!(ctx
            .metrics()
            .export()
            .unwrap()
            .contains(r#"quorum_reconciles_total{result="success"} 1"#));
    }

    #[tokio::test]
    async fn test_failed_cycle_emits_event() {
        let (_, ctx, scheduler) = setup();
        let mut events = ctx.subscribe_events();
        let (scope, _cancel) = ReconcileScope::initial(BTreeSet::new());

        let id = ClusterId::new("data", "ghost");
        assert!(scheduler.run_cycle(&id, scope).await.is_err());

        let envelope = events.recv().await.unwrap();
        assert!(matches!(
            envelope.event,
            OperatorEvent::ReconcileFailed { transient: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_scope_stops_cycle() {
        let (substrate, _, scheduler) = setup();
        let desired = cluster("data", "orders");
        let id = desired.id.clone();
        substrate.put_cluster(desired).await.unwrap();

        let (scope, cancel) = ReconcileScope::initial(BTreeSet::new());
        cancel.send_replace(true);
        let err = scheduler.run_cycle(&id, scope).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Cancelled));
    }

    #[tokio::test]
    async fn test_sweep_respects_scope() {
        let (substrate, _, scheduler) = setup();
        substrate.put_cluster(cluster("data", "orders")).await.unwrap();
        substrate.put_cluster(cluster("logs", "events")).await.unwrap();

        let (scope, _cancel) = ReconcileScope::initial(["data".to_string()].into());
        assert_eq!(scheduler.sweep(&scope).await, 1);
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let (substrate, _, scheduler) = setup();
        let desired = cluster("data", "orders");
        let id = desired.id.clone();
        substrate.put_cluster(desired).await.unwrap();

        let (scope, _cancel) = ReconcileScope::initial(BTreeSet::new());
        let first = scheduler.spawn_cycle(id.clone(), scope.clone());
        assert!(first.is_some());
        assert!(scheduler.is_in_flight(&id));
        assert!(scheduler.spawn_cycle(id.clone(), scope).is_none());

        first.unwrap().await.unwrap();
        assert!(!scheduler.is_in_flight(&id));
    }

    #[tokio::test]
    async fn test_trigger_during_cycle_is_requeued() {
        let (substrate, ctx, _) = setup();
        let (scheduler, mut triggers) = Scheduler::new(ctx);
        let desired = cluster("data", "orders");
        let id = desired.id.clone();
        substrate.put_cluster(desired).await.unwrap();

        let (scope, _cancel) = ReconcileScope::initial(BTreeSet::new());
        let first = scheduler.spawn_cycle(id.clone(), scope.clone()).unwrap();
        assert!(!scheduler.dispatch(id.clone(), scope));

        first.await.unwrap();
        assert!(!scheduler.is_in_flight(&id));
        assert_eq!(triggers.recv().await, Some(ReconcileTrigger::Cluster(id)));
    }

    #[test]
    fn test_in_flight_slot_released_on_panic() {
        let in_flight = DashSet::new();
        in_flight.insert("data/orders".to_string());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _slot = InFlightSlot {
                in_flight: &in_flight,
                key: "data/orders",
            };
            panic!("cycle panicked");
        }));
        assert!(result.is_err());
        assert!(!in_flight.contains("data/orders"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_, ctx, _) = setup();
        let (scheduler, triggers) = Scheduler::new(ctx.clone());
        let (scope, _cancel) = ReconcileScope::initial(BTreeSet::new());
        let (_scope_tx, scope_rx) = watch::channel(scope);

        let handle = tokio::spawn(scheduler.run(triggers, scope_rx));
        ctx.shutdown();
        handle.await.unwrap();
    }
}
