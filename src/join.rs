use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::store::{self, AvailabilityResults, MergedRefuge, Refuge};

/// Join fetched availability back onto the refuge directory and write the
/// denormalized result.
pub fn run(date: NaiveDate) -> Result<usize> {
    let refuges: Vec<Refuge> = store::load_json(store::DIRECTORY_PATH)?;
    let availabilities: AvailabilityResults = store::load_json(store::AVAILABILITY_PATH)?;

    let target = date.format("%Y-%m-%d").to_string();
    let merged = join(&refuges, &availabilities, &target);

    store::save_json(store::JOINED_PATH, &merged)?;
    info!("Wrote {} merged refuges to {}", merged.len(), store::JOINED_PATH);
    Ok(merged.len())
}

/// In-memory join keyed by structure identifier. Each identifier maps to
/// at most one directory entry; fetched records with no matching entry
/// are warned about once and dropped.
pub fn join(
    refuges: &[Refuge],
    availabilities: &AvailabilityResults,
    target_date: &str,
) -> Vec<MergedRefuge> {
    let by_structure: HashMap<&str, &Refuge> = refuges
        .iter()
        .map(|r| (r.backend.structure.as_str(), r))
        .collect();

    let mut merged = Vec::new();
    for record in availabilities.values() {
        let Some(refuge) = by_structure.get(record.structure.as_str()) else {
            warn!(
                "No refuge found for structure ID {} (from {})",
                record.structure, record.name
            );
            continue;
        };

        let availability = record.availability.clone().unwrap_or_default();
        let places_on_target_date = availability.get(target_date).copied().unwrap_or(0);

        merged.push(MergedRefuge {
            name: refuge.name.clone(),
            structure: record.structure.clone(),
            lat: refuge.lat,
            lng: refuge.lng,
            places: refuge.places,
            availability,
            available_on_target_date: places_on_target_date > 0,
            places_on_target_date,
        });
    }
    merged
}
