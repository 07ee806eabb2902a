//! Field-by-field resource comparison

use quorum_types::{ResourceList, ResourceRequirements};

/// Requests and limits match field by field; set vs unset is a difference
pub fn resources_equal(current: &ResourceRequirements, desired: &ResourceRequirements) -> bool {
    resource_differences(current, desired).is_empty()
}

/// Human-readable differing fields, e.g. `limits.cpu: 1 -> unset`
pub fn resource_differences(current: &ResourceRequirements, desired: &ResourceRequirements) -> Vec<String> {
    let mut differences = list_differences("requests", &current.requests, &desired.requests);
    differences.extend(list_differences("limits", &current.limits, &desired.limits));
    differences
}

fn list_differences(label: &str, current: &ResourceList, desired: &ResourceList) -> Vec<String> {
    current
        .fields()
        .into_iter()
        .zip(desired.fields())
        .filter(|((_, have), (_, want))| have != want)
        .map(|((field, have), (_, want))| {
            format!(
                "{label}.{field}: {} -> {}",
                have.unwrap_or("unset"),
                want.unwrap_or("unset")
            )
        })
        .collect()
}
