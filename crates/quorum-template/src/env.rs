//! Environment subset comparison

use quorum_types::EnvVar;

/// True when every desired entry is present in `current` with the same
/// literal value or the same value reference. Extra entries in `current`
/// are ignored; an empty `desired` is trivially satisfied.
pub fn env_subset_equal(current: &[EnvVar], desired: &[EnvVar]) -> bool {
    desired
        .iter()
        .all(|want| current.iter().any(|have| have.name == want.name && have.value == want.value))
}

/// Names of desired entries that are missing from or differ in `current`
pub fn env_differences<'a>(current: &[EnvVar], desired: &'a [EnvVar]) -> Vec<&'a str> {
    desired
        .iter()
        .filter(|want| !current.iter().any(|have| have.name == want.name && have.value == want.value))
        .map(|want| want.name.as_str())
        .collect()
}

/// Desired entries in order, followed by entries other writers added to
/// `current` under names the core does not own
pub fn merge_env(current: &[EnvVar], desired: &[EnvVar]) -> Vec<EnvVar> {
    let mut merged = desired.to_vec();
    merged.extend(
        current
            .iter()
            .filter(|have| !desired.iter().any(|want| want.name == have.name))
            .cloned(),
    );
    merged
}
