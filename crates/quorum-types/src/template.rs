//! Per-member runtime templates
//!
//! Two templates exist each cycle: the one the substrate reports as running
//! and the one freshly rendered from desired state. Neither is mutated in
//! place; classification produces a third, applied, template.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Rendered execution template shared by every member of a fleet
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemberRuntimeTemplate {
    /// Runtime image reference
    pub image: String,

    /// Resource requests and limits
    #[serde(default)]
    pub resources: ResourceRequirements,

    /// Environment entries, in render order
    #[serde(default)]
    pub env: Vec<EnvVar>,

    /// Mounted configuration files (file name to contents)
    #[serde(default)]
    pub mounted_config: BTreeMap<String, String>,

    /// Member identity / service-account binding
    #[serde(default)]
    pub service_identity: String,

    /// Ordered execution units (engine first, then sidecars)
    #[serde(default)]
    pub execution_units: Vec<String>,
}

impl MemberRuntimeTemplate {
    pub fn env_value(&self, name: &str) -> Option<&EnvValue> {
        self.env.iter().find(|e| e.name == name).map(|e| &e.value)
    }

    /// Comparable fingerprint of the template.
    ///
    /// Environment entries are hashed in name order so that appending or
    /// reordering entries does not change the fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"image\0");
        hasher.update(self.image.as_bytes());
        hasher.update(b"\0identity\0");
        hasher.update(self.service_identity.as_bytes());
        for (label, list) in [
            ("requests", &self.resources.requests),
            ("limits", &self.resources.limits),
        ] {
            hasher.update(label.as_bytes());
            for (field, value) in list.fields() {
                hasher.update(field.as_bytes());
                hasher.update(value.unwrap_or("-").as_bytes());
            }
        }
        hasher.update(b"\0units\0");
        for unit in &self.execution_units {
            hasher.update(unit.as_bytes());
            hasher.update(b"\0");
        }
        let mut env: Vec<_> = self.env.iter().collect();
        env.sort_by(|a, b| a.name.cmp(&b.name));
        hasher.update(b"\0env\0");
        for var in env {
            hasher.update(var.name.as_bytes());
            hasher.update(b"=");
            hasher.update(var.value.canonical().as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\0config\0");
        for (file, contents) in &self.mounted_config {
            hasher.update(file.as_bytes());
            hasher.update(b"\0");
            hasher.update(contents.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

/// Environment entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: EnvValue,
}

impl EnvVar {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: EnvValue::Literal(value.into()),
        }
    }

    pub fn reference(name: impl Into<String>, reference: ValueReference) -> Self {
        Self {
            name: name.into(),
            value: EnvValue::Reference(reference),
        }
    }
}

/// Literal value or indirect reference resolved by the substrate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvValue {
    Literal(String),
    Reference(ValueReference),
}

impl EnvValue {
    fn canonical(&self) -> String {
        match self {
            Self::Literal(v) => format!("lit:{v}"),
            Self::Reference(r) => format!("ref:{}:{}:{}", r.source.as_str(), r.name, r.key),
        }
    }
}

/// Indirect value reference (secret key, config key or member field)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueReference {
    pub source: ReferenceSource,
    pub name: String,
    pub key: String,
}

impl ValueReference {
    pub fn new(source: ReferenceSource, name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source,
            name: name.into(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    Secret,
    ConfigMap,
    Field,
}

impl ReferenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::ConfigMap => "config_map",
            Self::Field => "field",
        }
    }
}

/// Resource requests and limits
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceList,
    #[serde(default)]
    pub limits: ResourceList,
}

/// Quantities per resource kind; absent means unset
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

impl ResourceList {
    pub fn new(cpu: Option<&str>, memory: Option<&str>) -> Self {
        Self {
            cpu: cpu.map(str::to_string),
            memory: memory.map(str::to_string),
            storage: None,
        }
    }

    /// Every field with its name, in a fixed order
    pub fn fields(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("cpu", self.cpu.as_deref()),
            ("memory", self.memory.as_deref()),
            ("storage", self.storage.as_deref()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> MemberRuntimeTemplate {
        MemberRuntimeTemplate {
            image: "db:1.0".into(),
            resources: ResourceRequirements {
                requests: ResourceList::new(Some("500m"), Some("1Gi")),
                limits: ResourceList::new(Some("1"), Some("2Gi")),
            },
            env: vec![EnvVar::literal("A", "1"), EnvVar::literal("B", "2")],
            mounted_config: BTreeMap::from([("engine.yml".into(), "x: 1\n".into())]),
            service_identity: "orders-sa".into(),
            execution_units: vec!["engine".into()],
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(template().fingerprint(), template().fingerprint());
        assert_eq!(template().fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_env_order() {
        let mut reordered = template();
        reordered.env.reverse();
        assert_eq!(reordered.fingerprint(), template().fingerprint());
    }

    #[test]
    fn test_fingerprint_tracks_image() {
        let mut changed = template();
        changed.image = "db:1.1".into();
        assert_ne!(changed.fingerprint(), template().fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_absent_resources() {
        let mut changed = template();
        changed.resources.limits.cpu = None;
        assert_ne!(changed.fingerprint(), template().fingerprint());
    }
}
