//! # Quorum Formation
//!
//! The bootstrap and quorum guard. Every cycle it sizes the formation gate
//! handed to members, derives the formation phase from member reports, and
//! watches for split-brain.
//!
//! ## Safety rules
//!
//! - First formation: member 0 is the preferred bootstrapper and the gate is
//!   the full quorum member count N, so no premature subset can form alone.
//! - Restart: the gate is relaxed so members rejoin individually.
//! - Two or more disjoint quorate subsets mark the cluster `Degraded`. The
//!   guard never merges them and never forces a bootstrap.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod phase;
pub mod split_brain;

pub use config::{FormationConfig, RestartGate};
pub use error::{FormationError, FormationResult};
pub use gate::{compute_gate, peer_address};
pub use guard::{FormationAssessment, QuorumGuard};
pub use phase::PhaseMachine;
pub use split_brain::{quorate_partitions, Partition};
