//! Desired template rendering
//!
//! The formation gate is embedded in both the environment and the engine
//! configuration file, so it must be computed before rendering.

use crate::{TemplateError, TemplateResult};
use quorum_types::{
    ClusterDesiredState, EnvVar, FormationGate, MemberGroupSpec, MemberRuntimeTemplate,
    ReferenceSource, ValueReference,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

pub const ENV_CLUSTER_NAME: &str = "QUORUM_CLUSTER_NAME";
pub const ENV_MEMBER_NAME: &str = "QUORUM_MEMBER_NAME";
pub const ENV_MEMBER_ROLE: &str = "QUORUM_MEMBER_ROLE";
pub const ENV_SEED_PEERS: &str = "QUORUM_SEED_PEERS";
pub const ENV_BOOTSTRAP_MODE: &str = "QUORUM_BOOTSTRAP_MODE";
pub const ENV_PREFERRED_BOOTSTRAPPER: &str = "QUORUM_PREFERRED_BOOTSTRAPPER";
pub const ENV_MIN_MEMBERS: &str = "QUORUM_MIN_MEMBERS";

/// Rendering settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Name of the engine execution unit, always first
    pub engine_unit: String,
    /// File the engine configuration is mounted as
    pub config_file: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            engine_unit: "engine".to_string(),
            config_file: "engine.yml".to_string(),
        }
    }
}

/// Renders the desired member template for one group
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    config: RenderConfig,
}

impl TemplateRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn render(
        &self,
        desired: &ClusterDesiredState,
        group: &str,
        gate: &FormationGate,
    ) -> TemplateResult<MemberRuntimeTemplate> {
        let group = desired
            .group(group)
            .ok_or_else(|| TemplateError::GroupNotFound(group.to_string()))?;

        let mut env = vec![
            EnvVar::literal(ENV_CLUSTER_NAME, desired.id.name()),
            EnvVar::reference(
                ENV_MEMBER_NAME,
                ValueReference::new(ReferenceSource::Field, "metadata", "name"),
            ),
            EnvVar::literal(ENV_MEMBER_ROLE, group.role.as_str()),
            EnvVar::literal(ENV_SEED_PEERS, gate.seed_peers.join(",")),
            EnvVar::literal(ENV_BOOTSTRAP_MODE, bootstrap_mode(gate)),
        ];
        if let Some(bootstrapper) = gate.preferred_bootstrapper() {
            env.push(EnvVar::literal(ENV_PREFERRED_BOOTSTRAPPER, bootstrapper.as_str()));
        }
        if let Some(min) = gate.min_members {
            env.push(EnvVar::literal(ENV_MIN_MEMBERS, min.to_string()));
        }
        env.extend(desired.env.iter().cloned());

        let mut execution_units = vec![self.config.engine_unit.clone()];
        execution_units.extend(desired.sidecars.iter().cloned());

        let mounted_config = BTreeMap::from([(
            self.config.config_file.clone(),
            render_engine_config(desired, group, gate)?,
        )]);

        Ok(MemberRuntimeTemplate {
            image: desired.image.clone(),
            resources: desired.resources.clone(),
            env,
            mounted_config,
            service_identity: desired.service_account.clone(),
            execution_units,
        })
    }
}

fn bootstrap_mode(gate: &FormationGate) -> &'static str {
    if gate.first_formation {
        "first-formation"
    } else {
        "restart"
    }
}

fn render_engine_config(
    desired: &ClusterDesiredState,
    group: &MemberGroupSpec,
    gate: &FormationGate,
) -> TemplateResult<String> {
    let mut out = String::new();
    let _ = writeln!(out, "cluster.name: {}", desired.id.name());
    let _ = writeln!(out, "node.roles: {}", group.role.as_str());
    let _ = writeln!(out, "discovery.seed_hosts: [{}]", gate.seed_peers.join(", "));
    let _ = writeln!(out, "bootstrap.mode: {}", bootstrap_mode(gate));
    if let Some(bootstrapper) = gate.preferred_bootstrapper() {
        let _ = writeln!(out, "bootstrap.preferred: {bootstrapper}");
    }
    if let Some(min) = gate.min_members {
        let _ = writeln!(out, "bootstrap.min_members: {min}");
    }
    for (key, value) in &desired.engine_config {
        if key.is_empty() || key.contains(['\n', ':']) {
            return Err(TemplateError::InvalidConfigKey(key.clone()));
        }
        let _ = writeln!(out, "{key}: {value}");
    }
    Ok(out)
}
