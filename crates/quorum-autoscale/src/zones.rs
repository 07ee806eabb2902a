//! Zone-aware target distribution

use std::collections::BTreeMap;

/// Spread `total` members across the zones keyed in `current`.
///
/// Zones are taken in key order. With more zones than members the first
/// `total` zones get one member each. Otherwise every zone gets
/// `total / zones` and the remainder goes one each to the leading zones.
/// Finally each zone is raised to `min_per_zone`, which is the only way the
/// sum can exceed `total`.
pub fn distribute_across_zones(
    current: &BTreeMap<String, u32>,
    total: u32,
    min_per_zone: u32,
) -> BTreeMap<String, u32> {
    let zone_count = current.len() as u32;
    if zone_count == 0 {
        return BTreeMap::new();
    }

    current
        .keys()
        .enumerate()
        .map(|(index, zone)| {
            let index = index as u32;
            let assigned = if zone_count > total {
                u32::from(index < total)
            } else {
                total / zone_count + u32::from(index < total % zone_count)
            };
            (zone.clone(), assigned.max(min_per_zone))
        })
        .collect()
}
