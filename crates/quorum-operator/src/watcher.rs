//! Scope watching
//!
//! A watcher task forwards substrate events for watched namespaces into a
//! bounded channel. The supervisor drains that channel, waits for a quiet
//! period, then acts on the whole burst at once: changed clusters are
//! triggered, and namespace changes restart the reconcile scope. Restarting
//! cancels every cycle still running under the old scope.

use crate::context::{cancelled, OperatorContext};
use crate::scheduler::Scheduler;
use crate::substrate::SubstrateEvent;
use quorum_types::ClusterId;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Namespaces currently reconciled, with the token that cancels them
#[derive(Debug, Clone)]
pub struct ReconcileScope {
    /// Configured namespaces; empty means every namespace
    namespaces: BTreeSet<String>,
    /// Namespaces reported removed since startup
    removed: BTreeSet<String>,
    generation: u64,
    cancel: watch::Receiver<bool>,
}

impl ReconcileScope {
    /// First scope, with the sender that cancels it
    pub fn initial(namespaces: BTreeSet<String>) -> (Self, watch::Sender<bool>) {
        let (cancel_tx, cancel) = watch::channel(false);
        let scope = Self {
            namespaces,
            removed: BTreeSet::new(),
            generation: 0,
            cancel,
        };
        (scope, cancel_tx)
    }

    /// Scope for a namespace that is configured to be watched
    pub fn watches(&self, namespace: &str) -> bool {
        self.namespaces.is_empty() || self.namespaces.contains(namespace)
    }

    pub fn contains(&self, cluster: &ClusterId) -> bool {
        self.watches(cluster.namespace()) && !self.removed.contains(cluster.namespace())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel_token(&self) -> watch::Receiver<bool> {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn restarted(&self, added: &BTreeSet<String>, removed: &BTreeSet<String>) -> (Self, watch::Sender<bool>) {
        let (cancel_tx, cancel) = watch::channel(false);
        let mut next_removed: BTreeSet<String> = self.removed.difference(added).cloned().collect();
        next_removed.extend(removed.iter().cloned());
        let scope = Self {
            namespaces: self.namespaces.clone(),
            removed: next_removed,
            generation: self.generation + 1,
            cancel,
        };
        (scope, cancel_tx)
    }
}

/// What the watcher hands the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSignal {
    Event(SubstrateEvent),
    /// Events were dropped; a full sweep is needed
    Resync,
}

/// Changes accumulated during one debounce window
#[derive(Debug, Default)]
struct PendingChanges {
    changed: BTreeSet<ClusterId>,
    deleted: BTreeSet<ClusterId>,
    added_namespaces: BTreeSet<String>,
    removed_namespaces: BTreeSet<String>,
    resync: bool,
}

impl PendingChanges {
    fn absorb(&mut self, signal: ScopeSignal) {
        match signal {
            ScopeSignal::Resync => self.resync = true,
            ScopeSignal::Event(SubstrateEvent::ClusterChanged(id))
            | ScopeSignal::Event(SubstrateEvent::MembersChanged(id)) => {
                self.deleted.remove(&id);
                self.changed.insert(id);
            }
            ScopeSignal::Event(SubstrateEvent::ClusterDeleted(id)) => {
                self.changed.remove(&id);
                self.deleted.insert(id);
            }
            ScopeSignal::Event(SubstrateEvent::NamespaceAdded(ns)) => {
                self.removed_namespaces.remove(&ns);
                self.added_namespaces.insert(ns);
            }
            ScopeSignal::Event(SubstrateEvent::NamespaceRemoved(ns)) => {
                self.added_namespaces.remove(&ns);
                self.removed_namespaces.insert(ns);
            }
        }
    }

    fn scope_changed(&self) -> bool {
        !self.added_namespaces.is_empty() || !self.removed_namespaces.is_empty()
    }
}

/// Forward substrate events for watched namespaces into `tx`
pub fn spawn_watcher(
    ctx: Arc<OperatorContext>,
    tx: mpsc::Sender<ScopeSignal>,
) -> JoinHandle<()> {
    let mut events = ctx.substrate().subscribe();
    let mut shutdown = ctx.shutdown_token();
    tokio::spawn(async move {
        let watched = &ctx.config().scope.namespaces;

        loop {
            let signal = tokio::select! {
                _ = cancelled(&mut shutdown) => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        if !watched.is_empty() && !watched.contains(event.namespace()) {
                            continue;
                        }
                        ScopeSignal::Event(event)
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Substrate events dropped, requesting resync");
                        ScopeSignal::Resync
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            if tx.send(signal).await.is_err() {
                break;
            }
        }
        debug!("Scope watcher stopped");
    })
}

/// Debounces scope signals and restarts the reconcile scope
pub struct ScopeSupervisor {
    ctx: Arc<OperatorContext>,
    scheduler: Arc<Scheduler>,
    scope_tx: watch::Sender<ReconcileScope>,
    cancel_tx: watch::Sender<bool>,
}

impl ScopeSupervisor {
    /// Supervisor and the receiver the scheduler reads the live scope from
    pub fn new(
        ctx: Arc<OperatorContext>,
        scheduler: Arc<Scheduler>,
    ) -> (Self, watch::Receiver<ReconcileScope>) {
        let (scope, cancel_tx) = ReconcileScope::initial(ctx.config().scope.namespaces.clone());
        let (scope_tx, scope_rx) = watch::channel(scope);
        let supervisor = Self {
            ctx,
            scheduler,
            scope_tx,
            cancel_tx,
        };
        (supervisor, scope_rx)
    }

    pub fn scope(&self) -> watch::Receiver<ReconcileScope> {
        self.scope_tx.subscribe()
    }

    /// Drain `rx` until shutdown or until every watcher is gone
    pub async fn run(mut self, mut rx: mpsc::Receiver<ScopeSignal>) {
        let debounce = self.ctx.config().scope.debounce();
        let mut shutdown = self.ctx.shutdown_token();
        let mut pending = PendingChanges::default();
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = cancelled(&mut shutdown) => break,
                signal = rx.recv() => match signal {
                    Some(signal) => {
                        pending.absorb(signal);
                        deadline = Some(Instant::now() + debounce);
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.flush(std::mem::take(&mut pending)).await;
                }
            }
        }

        // Stop whatever still runs under the current scope.
        self.cancel_tx.send_replace(true);
        debug!("Scope supervisor stopped");
    }

    async fn flush(&mut self, pending: PendingChanges) {
        for cluster in &pending.deleted {
            self.forget(cluster);
        }

        if pending.scope_changed() {
            self.restart_scope(&pending.added_namespaces, &pending.removed_namespaces);
            self.scheduler.trigger_sweep().await;
            return;
        }
        if pending.resync {
            self.scheduler.trigger_sweep().await;
            return;
        }

        let scope = self.scope_tx.borrow().clone();
        for cluster in pending.changed {
            if scope.contains(&cluster) {
                self.scheduler.trigger(cluster).await;
            }
        }
    }

    fn restart_scope(&mut self, added: &BTreeSet<String>, removed: &BTreeSet<String>) {
        let (scope, cancel_tx) = self.scope_tx.borrow().restarted(added, removed);
        let previous = std::mem::replace(&mut self.cancel_tx, cancel_tx);
        previous.send_replace(true);

        for namespace in removed {
            self.ctx.collector().forget_prefix(&format!("{namespace}/"));
            self.ctx.metrics().forget_namespace(namespace);
        }

        info!(
            generation = scope.generation(),
            added = ?added,
            removed = ?removed,
            "Reconcile scope restarted"
        );
        self.scope_tx.send_replace(scope);
    }

    fn forget(&self, cluster: &ClusterId) {
        debug!(cluster = %cluster, "Forgetting deleted cluster");
        self.ctx.collector().forget_prefix(&format!("{}/", cluster.key()));
        self.ctx.metrics().forget_cluster(cluster);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorConfig;
    use crate::substrate::{InMemorySubstrate, Substrate};
    use std::time::Duration;

    fn namespaces(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_empty_scope_contains_everything() {
        let (scope, _cancel) = ReconcileScope::initial(BTreeSet::new());
        assert!(scope.contains(&ClusterId::new("anything", "orders")));
    }

    #[test]
    fn test_scope_filters_namespaces() {
        let (scope, _cancel) = ReconcileScope::initial(namespaces(&["data"]));
        assert!(scope.contains(&ClusterId::new("data", "orders")));
        assert!(!scope.contains(&ClusterId::new("logs", "events")));
    }

    #[test]
    fn test_restart_tracks_removed_namespaces() {
        let (scope, _cancel) = ReconcileScope::initial(BTreeSet::new());
        let (next, _next_cancel) = scope.restarted(&BTreeSet::new(), &namespaces(&["data"]));
        assert_eq!(next.generation(), 1);
        assert!(!next.contains(&ClusterId::new("data", "orders")));

        let (again, _) = next.restarted(&namespaces(&["data"]), &BTreeSet::new());
        assert!(again.contains(&ClusterId::new("data", "orders")));
    }

    #[test]
    fn test_pending_changes_keep_latest_cluster_state() {
        let id = ClusterId::new("data", "orders");
        let mut pending = PendingChanges::default();
        pending.absorb(ScopeSignal::Event(SubstrateEvent::ClusterChanged(id.clone())));
        pending.absorb(ScopeSignal::Event(SubstrateEvent::ClusterDeleted(id.clone())));
        assert!(pending.changed.is_empty());
        assert!(pending.deleted.contains(&id));
        assert!(!pending.scope_changed());

        pending.absorb(ScopeSignal::Event(SubstrateEvent::NamespaceRemoved("data".into())));
        assert!(pending.scope_changed());
    }

    fn setup(config: OperatorConfig) -> (Arc<InMemorySubstrate>, Arc<OperatorContext>) {
        let substrate = Arc::new(InMemorySubstrate::new());
        let dyn_substrate: Arc<dyn Substrate> = substrate.clone();
        let ctx = OperatorContext::with_metrics_source(config, dyn_substrate, None).unwrap();
        (substrate, ctx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_namespace_change_restarts_scope_after_debounce() {
        let (_, ctx) = setup(OperatorConfig::default());
        let (scheduler, _triggers) = Scheduler::new(ctx.clone());
        let (supervisor, mut scope_rx) = ScopeSupervisor::new(ctx.clone(), scheduler);
        let old_token = scope_rx.borrow().cancel_token();

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(supervisor.run(rx));

        tx.send(ScopeSignal::Event(SubstrateEvent::NamespaceRemoved("data".into())))
            .await
            .unwrap();
        tx.send(ScopeSignal::Event(SubstrateEvent::NamespaceAdded("logs".into())))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scope_rx.borrow().generation(), 0);

        scope_rx.changed().await.unwrap();
        let scope = scope_rx.borrow().clone();
        assert_eq!(scope.generation(), 1);
        assert!(!scope.contains(&ClusterId::new("data", "orders")));
        assert!(*old_token.borrow());

        ctx.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_watcher_drops_unwatched_namespaces() {
        let mut config = OperatorConfig::default();
        config.scope.namespaces = namespaces(&["data"]);
        let (substrate, ctx) = setup(config);

        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn_watcher(ctx.clone(), tx);

        substrate.add_namespace("logs");
        substrate.add_namespace("data");

        let signal = rx.recv().await.unwrap();
        assert_eq!(signal, ScopeSignal::Event(SubstrateEvent::NamespaceAdded("data".into())));

        ctx.shutdown();
        handle.await.unwrap();
    }
}
