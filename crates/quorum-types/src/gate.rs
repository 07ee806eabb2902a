//! Formation gate values rendered into member startup configuration

use crate::MemberName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-member bootstrap hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapHint {
    /// Initiates formation
    PreferredBootstrapper,
    /// Waits to join an existing cluster
    Joiner,
}

impl BootstrapHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreferredBootstrapper => "preferred-bootstrapper",
            Self::Joiner => "joiner",
        }
    }
}

/// Transient formation gate, recomputed every cycle and never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationGate {
    /// Minimum mutually-visible members before the engine may declare
    /// formation complete. `None` lets members rejoin individually.
    pub min_members: Option<u32>,

    /// Hint for each quorum member
    pub hints: BTreeMap<MemberName, BootstrapHint>,

    /// Deterministic peer addresses, one per quorum member, in bootstrap order
    pub seed_peers: Vec<String>,

    /// True when no member holds persisted data yet
    pub first_formation: bool,
}

impl FormationGate {
    pub fn preferred_bootstrapper(&self) -> Option<&MemberName> {
        self.hints
            .iter()
            .find(|(_, hint)| **hint == BootstrapHint::PreferredBootstrapper)
            .map(|(name, _)| name)
    }

    pub fn hint_for(&self, member: &MemberName) -> BootstrapHint {
        self.hints
            .get(member)
            .copied()
            .unwrap_or(BootstrapHint::Joiner)
    }
}
