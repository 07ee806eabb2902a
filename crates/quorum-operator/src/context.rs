//! Operator context
//!
//! Every long-lived collaborator is built once at startup and handed to the
//! reconciler, scheduler, watcher and API through this object. Shutdown goes
//! through the shared cancellation token it owns.

use crate::config::OperatorConfig;
use crate::error::OperatorResult;
use crate::metrics::OperatorMetrics;
use crate::substrate::Substrate;
use quorum_autoscale::{MetricsCollector, MetricsSource, ScaleDecisionEngine};
use quorum_formation::QuorumGuard;
use quorum_store::ConflictSafeApplier;
use quorum_template::{TemplateClassifier, TemplateRenderer};
use quorum_types::{ClusterId, OperatorEvent, OperatorEventEnvelope, ReconcileId};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Shared, immutable operator state
pub struct OperatorContext {
    config: OperatorConfig,
    substrate: Arc<dyn Substrate>,
    guard: QuorumGuard,
    renderer: TemplateRenderer,
    classifier: TemplateClassifier,
    applier: ConflictSafeApplier,
    collector: MetricsCollector,
    engine: ScaleDecisionEngine,
    metrics: OperatorMetrics,
    events: broadcast::Sender<OperatorEventEnvelope>,
    shutdown: watch::Sender<bool>,
}

impl OperatorContext {
    /// Build the context; a Prometheus source is created when configured
    pub fn new(config: OperatorConfig, substrate: Arc<dyn Substrate>) -> OperatorResult<Arc<Self>> {
        let collector = MetricsCollector::from_config(config.metrics.clone())?;
        Self::assemble(config, substrate, collector)
    }

    /// Build the context with an explicit metrics source
    pub fn with_metrics_source(
        config: OperatorConfig,
        substrate: Arc<dyn Substrate>,
        source: Option<Arc<dyn MetricsSource>>,
    ) -> OperatorResult<Arc<Self>> {
        let collector = MetricsCollector::new(config.metrics.clone(), source);
        Self::assemble(config, substrate, collector)
    }

    fn assemble(
        config: OperatorConfig,
        substrate: Arc<dyn Substrate>,
        collector: MetricsCollector,
    ) -> OperatorResult<Arc<Self>> {
        let (events, _) = broadcast::channel(1024);
        let (shutdown, _) = watch::channel(false);
        Ok(Arc::new(Self {
            guard: QuorumGuard::new(config.formation.clone()),
            renderer: TemplateRenderer::new(config.render.clone()),
            classifier: TemplateClassifier::new(),
            applier: ConflictSafeApplier::new(config.applier.clone()),
            engine: ScaleDecisionEngine::new(&config.metrics),
            metrics: OperatorMetrics::new()?,
            collector,
            substrate,
            events,
            shutdown,
            config,
        }))
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn substrate(&self) -> &dyn Substrate {
        self.substrate.as_ref()
    }

    pub fn guard(&self) -> &QuorumGuard {
        &self.guard
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    pub fn classifier(&self) -> &TemplateClassifier {
        &self.classifier
    }

    pub fn applier(&self) -> &ConflictSafeApplier {
        &self.applier
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    pub fn engine(&self) -> &ScaleDecisionEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &OperatorMetrics {
        &self.metrics
    }

    /// Publish an operator event to in-process subscribers
    pub fn emit(&self, cluster: &ClusterId, reconcile_id: Option<ReconcileId>, event: OperatorEvent) {
        let mut envelope = OperatorEventEnvelope::new(cluster.clone(), event);
        if let Some(id) = reconcile_id {
            envelope = envelope.with_reconcile_id(id);
        }
        // No subscribers is fine
        let _ = self.events.send(envelope);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<OperatorEventEnvelope> {
        self.events.subscribe()
    }

    /// Token that flips to `true` on shutdown
    pub fn shutdown_token(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Wait until `token` is set.
///
/// A token whose sender is dropped without ever being set never fires.
pub async fn cancelled(token: &mut watch::Receiver<bool>) {
    if token.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
