//! Quorum Types - Core types for database cluster reconciliation
//!
//! Quorum drives a multi-node database cluster (primaries and secondaries),
//! running as a fleet of replicated workload units, toward a declared desired
//! state without ever handing the engine an unsafe initial membership or an
//! unsafe rolling change.
//!
//! ## Architectural Boundaries
//!
//! - **Quorum** owns: formation gating, template change classification,
//!   conflict-safe writes, autoscaling decisions
//! - **Database engine** owns: leader election, replication, consensus
//! - **Substrate** owns: persistence, placement, service discovery
//!
//! ## Key Concepts
//!
//! - **ClusterDesiredState**: user-declared intent, read-only to the core
//! - **ClusterObservedState**: derived every cycle, overwritten wholesale
//! - **MemberRuntimeTemplate**: rendered per-member execution template
//! - **FormationGate**: minimum member count plus per-member bootstrap hints
//! - **MetricSnapshot** / **ScalingDecision**: autoscaling inputs and outputs
//! - **VersionToken**: optimistic-concurrency stamp on every stored object

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cluster;
pub mod events;
pub mod fleet;
pub mod gate;
pub mod ids;
pub mod member;
pub mod metrics;
pub mod observed;
pub mod scaling;
pub mod template;
pub mod version;

// Re-export main types
pub use cluster::{ClusterDesiredState, MemberGroupSpec, RoleConstraint, ScalableRole};
pub use events::{EventSeverity, OperatorEvent, OperatorEventEnvelope};
pub use fleet::FleetSpec;
pub use gate::{BootstrapHint, FormationGate};
pub use ids::{ClusterId, MemberName, ReconcileId};
pub use member::{MemberStatus, MemberUsage, MemberView};
pub use metrics::{
    LatencyPercentiles, MetricCategory, MetricKind, MetricOrigin, MetricSample, MetricSnapshot,
    Trend,
};
pub use observed::{
    ClusterObservedState, ClusterPhase, Condition, ConditionStatus, ConditionType,
    MemberObservation, ScalingRecord,
};
pub use scaling::{
    AutoscalingPolicy, GroupScalingPolicy, MetricTarget, ScalingAction, ScalingDecision,
};
pub use template::{
    EnvValue, EnvVar, MemberRuntimeTemplate, ReferenceSource, ResourceList,
    ResourceRequirements, ValueReference,
};
pub use version::{VersionToken, Versioned};
