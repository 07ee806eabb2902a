//! Error types for quorum-formation.

use quorum_types::{ClusterId, ClusterPhase};
use thiserror::Error;

/// Errors raised by the quorum guard.
#[derive(Debug, Clone, Error)]
pub enum FormationError {
    /// No member group may hold the primary role.
    #[error("cluster {0} declares no primary-eligible members")]
    NoQuorumMembers(ClusterId),

    /// Phase change outside the lifecycle graph.
    #[error("invalid phase transition from {from} to {to}")]
    InvalidTransition { from: ClusterPhase, to: ClusterPhase },
}

/// Result type for formation operations.
pub type FormationResult<T> = std::result::Result<T, FormationError>;
