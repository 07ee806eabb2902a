//! Template change classification

use crate::{env_differences, merge_env, resource_differences};
use quorum_types::{ClusterPhase, MemberRuntimeTemplate};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Template fields the classifier compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateField {
    Image,
    Resources,
    ServiceIdentity,
    ExecutionUnits,
    Environment,
    MountedConfig,
}

impl TemplateField {
    /// Critical differences apply regardless of formation state
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Image | Self::Resources | Self::ServiceIdentity | Self::ExecutionUnits
        )
    }
}

impl fmt::Display for TemplateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Resources => "resources",
            Self::ServiceIdentity => "service identity",
            Self::ExecutionUnits => "execution units",
            Self::Environment => "environment",
            Self::MountedConfig => "mounted configuration",
        };
        f.write_str(name)
    }
}

/// Formation state the classifier needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormationSnapshot {
    pub phase: ClusterPhase,
    /// All members currently present and healthy
    pub fleet_stable: bool,
}

/// Classifier verdict for one fleet
#[derive(Debug, Clone)]
pub struct Classification {
    /// Write `applied` to the fleet now
    pub apply: bool,
    pub reason: String,
    /// Differing fields, critical first
    pub changed: Vec<TemplateField>,
    /// Non-critical fields held back until the fleet is stable
    pub deferred: Vec<TemplateField>,
    /// Template to write; equals `current` when nothing applies
    pub applied: MemberRuntimeTemplate,
}

/// Decides whether a template difference is significant enough to apply now
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateClassifier;

impl TemplateClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(
        &self,
        current: &MemberRuntimeTemplate,
        desired: &MemberRuntimeTemplate,
        snapshot: &FormationSnapshot,
    ) -> Classification {
        let mut details = Vec::new();
        let mut changed = Vec::new();

        if current.image != desired.image {
            details.push(format!("image {} -> {}", current.image, desired.image));
            changed.push(TemplateField::Image);
        }
        let resource_diffs = resource_differences(&current.resources, &desired.resources);
        if !resource_diffs.is_empty() {
            details.push(resource_diffs.join(", "));
            changed.push(TemplateField::Resources);
        }
        if current.service_identity != desired.service_identity {
            details.push(format!(
                "service identity {:?} -> {:?}",
                current.service_identity, desired.service_identity
            ));
            changed.push(TemplateField::ServiceIdentity);
        }
        if current.execution_units != desired.execution_units {
            details.push(format!(
                "execution units [{}] -> [{}]",
                current.execution_units.join(", "),
                desired.execution_units.join(", ")
            ));
            changed.push(TemplateField::ExecutionUnits);
        }
        let env_diffs = env_differences(&current.env, &desired.env);
        if !env_diffs.is_empty() {
            details.push(format!("environment entries {}", env_diffs.join(", ")));
            changed.push(TemplateField::Environment);
        }
        let config_diffs = config_differences(&current.mounted_config, &desired.mounted_config);
        if !config_diffs.is_empty() {
            details.push(format!("mounted configuration {}", config_diffs.join(", ")));
            changed.push(TemplateField::MountedConfig);
        }

        if changed.is_empty() {
            return Classification {
                apply: false,
                reason: "template up to date".to_string(),
                changed,
                deferred: Vec::new(),
                applied: current.clone(),
            };
        }

        let critical = changed.iter().any(TemplateField::is_critical);
        let non_critical: Vec<TemplateField> =
            changed.iter().copied().filter(|f| !f.is_critical()).collect();
        let summary = details.join("; ");

        let (apply, deferred, applied, reason) = match (critical, snapshot.fleet_stable) {
            (_, true) => (
                true,
                Vec::new(),
                merged(current, desired, true),
                format!("applying {summary}"),
            ),
            (true, false) => {
                let reason = if non_critical.is_empty() {
                    format!("applying critical change during formation: {summary}")
                } else {
                    format!(
                        "applying critical change during formation, deferring {}: {summary}",
                        join_fields(&non_critical)
                    )
                };
                (true, non_critical, merged(current, desired, false), reason)
            }
            (false, false) => (
                false,
                non_critical,
                current.clone(),
                format!("deferring non-critical change until all members are healthy: {summary}"),
            ),
        };

        debug!(
            apply,
            phase = %snapshot.phase,
            fleet_stable = snapshot.fleet_stable,
            changed = %join_fields(&changed),
            "Template classified"
        );

        Classification {
            apply,
            reason,
            changed,
            deferred,
            applied,
        }
    }
}

/// Build the template to write.
///
/// Critical fields always come from `desired`. Non-critical fields come
/// from `desired` merged over `current` only when `include_non_critical`.
fn merged(
    current: &MemberRuntimeTemplate,
    desired: &MemberRuntimeTemplate,
    include_non_critical: bool,
) -> MemberRuntimeTemplate {
    let (env, mounted_config) = if include_non_critical {
        let mut config = current.mounted_config.clone();
        config.extend(desired.mounted_config.clone());
        (merge_env(&current.env, &desired.env), config)
    } else {
        (current.env.clone(), current.mounted_config.clone())
    };
    MemberRuntimeTemplate {
        image: desired.image.clone(),
        resources: desired.resources.clone(),
        env,
        mounted_config,
        service_identity: desired.service_identity.clone(),
        execution_units: desired.execution_units.clone(),
    }
}

fn config_differences<'a>(
    current: &BTreeMap<String, String>,
    desired: &'a BTreeMap<String, String>,
) -> Vec<&'a str> {
    desired
        .iter()
        .filter(|(file, contents)| current.get(*file) != Some(*contents))
        .map(|(file, _)| file.as_str())
        .collect()
}

fn join_fields(fields: &[TemplateField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quorum_types::{EnvVar, ResourceList, ResourceRequirements};

    fn template() -> MemberRuntimeTemplate {
        MemberRuntimeTemplate {
            image: "db:1.0".into(),
            resources: ResourceRequirements {
                requests: ResourceList::new(Some("500m"), Some("1Gi")),
                limits: ResourceList::new(Some("1"), Some("2Gi")),
            },
            env: vec![EnvVar::literal("QUORUM_CLUSTER_NAME", "orders")],
            mounted_config: BTreeMap::from([("engine.yml".into(), "a: 1\n".into())]),
            service_identity: "orders".into(),
            execution_units: vec!["engine".into()],
        }
    }

    fn forming() -> FormationSnapshot {
        FormationSnapshot {
            phase: ClusterPhase::Forming,
            fleet_stable: false,
        }
    }

    fn stable() -> FormationSnapshot {
        FormationSnapshot {
            phase: ClusterPhase::Ready,
            fleet_stable: true,
        }
    }

    #[test]
    fn test_identical_templates_not_applied() {
        let t = template();
        for snapshot in [forming(), stable()] {
            let c = TemplateClassifier::new().classify(&t, &t, &snapshot);
            assert!(!c.apply);
            assert!(c.changed.is_empty());
            assert_eq!(c.applied, t);
        }
    }

    #[test]
    fn test_image_change_applies_during_formation() {
        let current = template();
        let mut desired = template();
        desired.image = "db:1.1".into();

        let c = TemplateClassifier::new().classify(&current, &desired, &forming());
        assert!(c.apply);
        assert_eq!(c.changed, vec![TemplateField::Image]);
        assert_eq!(c.applied.image, "db:1.1");
    }

    #[test]
    fn test_env_change_deferred_during_formation() {
        let current = template();
        let mut desired = template();
        desired.env.push(EnvVar::literal("NEW", "1"));

        let c = TemplateClassifier::new().classify(&current, &desired, &forming());
        assert!(!c.apply);
        assert_eq!(c.deferred, vec![TemplateField::Environment]);
        assert_eq!(c.applied, current);
        assert!(c.reason.contains("deferring"));
    }

    #[test]
    fn test_env_change_applied_when_stable() {
        let current = template();
        let mut desired = template();
        desired.env.push(EnvVar::literal("NEW", "1"));

        let c = TemplateClassifier::new().classify(&current, &desired, &stable());
        assert!(c.apply);
        assert!(c.applied.env.contains(&EnvVar::literal("NEW", "1")));
    }

    #[test]
    fn test_critical_change_during_formation_keeps_current_env() {
        let current = template();
        let mut desired = template();
        desired.image = "db:1.1".into();
        desired.env.push(EnvVar::literal("NEW", "1"));

        let c = TemplateClassifier::new().classify(&current, &desired, &forming());
        assert!(c.apply);
        assert_eq!(c.deferred, vec![TemplateField::Environment]);
        assert_eq!(c.applied.image, "db:1.1");
        assert_eq!(c.applied.env, current.env);
    }

    #[test]
    fn test_foreign_env_entries_ignored_and_preserved() {
        let mut current = template();
        current.env.push(EnvVar::literal("PLUGIN_A", "1"));
        current.env.push(EnvVar::literal("PLUGIN_B", "2"));
        let desired = template();

        let c = TemplateClassifier::new().classify(&current, &desired, &stable());
        assert!(!c.apply);

        let mut upgraded = template();
        upgraded.image = "db:1.1".into();
        let c = TemplateClassifier::new().classify(&current, &upgraded, &stable());
        assert!(c.apply);
        assert!(c.applied.env.contains(&EnvVar::literal("PLUGIN_A", "1")));
        assert!(c.applied.env.contains(&EnvVar::literal("PLUGIN_B", "2")));
    }

    #[test]
    fn test_sidecar_change_is_critical() {
        let current = template();
        let mut desired = template();
        desired.execution_units.push("exporter".into());

        let c = TemplateClassifier::new().classify(&current, &desired, &forming());
        assert!(c.apply);
        assert_eq!(c.changed, vec![TemplateField::ExecutionUnits]);
    }

    #[test]
    fn test_resource_limit_removal_is_critical() {
        let current = template();
        let mut desired = template();
        desired.resources.limits.cpu = None;

        let c = TemplateClassifier::new().classify(&current, &desired, &forming());
        assert!(c.apply);
        assert_eq!(c.changed, vec![TemplateField::Resources]);
    }

    proptest! {
        #[test]
        fn prop_classify_idempotent(
            image in "[a-z]{1,8}:[0-9]",
            env in prop::collection::vec(("[A-Z]{1,4}", "[a-z0-9]{0,4}"), 0..6),
            stable_fleet in any::<bool>(),
        ) {
            let t = MemberRuntimeTemplate {
                image,
                env: env.into_iter().map(|(k, v)| EnvVar::literal(k, v)).collect(),
                ..Default::default()
            };
            let snapshot = FormationSnapshot { phase: ClusterPhase::Ready, fleet_stable: stable_fleet };
            prop_assert!(!TemplateClassifier::new().classify(&t, &t, &snapshot).apply);
        }

        #[test]
        fn prop_applied_template_is_fixed_point(new_image in "[a-z]{1,8}:[0-9]") {
            let current = template();
            let mut desired = template();
            desired.image = new_image;
            desired.env.push(EnvVar::literal("EXTRA", "1"));
            let classifier = TemplateClassifier::new();
            let first = classifier.classify(&current, &desired, &stable());
            let second = classifier.classify(&first.applied, &desired, &stable());
            prop_assert!(!second.apply);
        }
    }
}
