//! Formation configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the gate is relaxed when members already hold data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartGate {
    /// No minimum; members rejoin one at a time.
    #[default]
    Omit,
    /// Strict majority of N, when that is below N.
    Majority,
}

/// Configuration for the quorum guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationConfig {
    /// Window for first formation to reach quorum before `Degraded`.
    pub timeout_secs: u64,

    /// Suffix of the headless discovery service (`<cluster>-<suffix>`).
    pub discovery_service_suffix: String,

    /// DNS domain appended to peer addresses.
    pub domain: String,

    /// Engine transport port appended to seed peers.
    pub transport_port: u16,

    /// Gate used on restart.
    pub restart_gate: RestartGate,
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            discovery_service_suffix: "discovery".to_string(),
            domain: "svc.cluster.local".to_string(),
            transport_port: 9300,
            restart_gate: RestartGate::Omit,
        }
    }
}

impl FormationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
