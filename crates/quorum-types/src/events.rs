//! Event types for operator observability
//!
//! Events provide an in-process stream of reconciliation activity.

use crate::{ClusterId, ClusterPhase, MemberName, ReconcileId, ScalableRole};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all operator events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Cluster the event concerns
    pub cluster: ClusterId,

    /// Event severity
    pub severity: EventSeverity,

    /// Reconcile cycle that produced the event
    pub reconcile_id: Option<ReconcileId>,

    /// The actual event
    pub event: OperatorEvent,
}

impl OperatorEventEnvelope {
    pub fn new(cluster: ClusterId, event: OperatorEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            cluster,
            severity: event.severity(),
            reconcile_id: None,
            event,
        }
    }

    pub fn with_reconcile_id(mut self, id: ReconcileId) -> Self {
        self.reconcile_id = Some(id);
        self
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Reconciliation events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperatorEvent {
    PhaseChanged {
        from: ClusterPhase,
        to: ClusterPhase,
    },
    TemplateApplied {
        group: String,
        fingerprint: String,
        reason: String,
    },
    TemplateDeferred {
        group: String,
        reason: String,
    },
    ScalingApplied {
        group: String,
        role: ScalableRole,
        from: u32,
        to: u32,
        reason: String,
    },
    ScalingSuppressed {
        group: String,
        reason: String,
    },
    SplitBrainDetected {
        partitions: Vec<Vec<MemberName>>,
    },
    ReconcileFailed {
        error: String,
        transient: bool,
    },
}

impl OperatorEvent {
    pub fn severity(&self) -> EventSeverity {
        match self {
            Self::PhaseChanged {
                to: ClusterPhase::Degraded,
                ..
            } => EventSeverity::Error,
            Self::PhaseChanged { .. } => EventSeverity::Info,
            Self::TemplateApplied { .. } | Self::ScalingApplied { .. } => EventSeverity::Info,
            Self::TemplateDeferred { .. } | Self::ScalingSuppressed { .. } => {
                EventSeverity::Warning
            }
            Self::SplitBrainDetected { .. } => EventSeverity::Critical,
            Self::ReconcileFailed { transient: true, .. } => EventSeverity::Warning,
            Self::ReconcileFailed { .. } => EventSeverity::Error,
        }
    }
}
