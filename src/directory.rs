use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::listing::{self, ListingItem};
use crate::store::{self, BackendRef, Refuge, Registry};

pub struct MergeStats {
    pub parsed: usize,
    pub matched: usize,
    pub unmatched: usize,
}

/// Merge the curated registry with the scraped listing page and write the
/// unified directory.
pub fn run() -> Result<MergeStats> {
    let registry: Registry = store::load_json(store::REGISTRY_PATH)?;
    let html = fs::read_to_string(store::LISTING_PATH)
        .with_context(|| format!("Failed to read {}", store::LISTING_PATH))?;

    let items = listing::parse(&html);
    info!("Parsed {} listing entries", items.len());

    let stats_parsed = items.len();
    let merged = merge(&registry, items);
    let stats = MergeStats {
        parsed: stats_parsed,
        matched: merged.len(),
        unmatched: stats_parsed - merged.len(),
    };

    store::save_json(store::DIRECTORY_PATH, &merged)?;
    info!(
        "Wrote {} refuges to {} ({} listing entries had no registry match)",
        stats.matched,
        store::DIRECTORY_PATH,
        stats.unmatched
    );
    Ok(stats)
}

/// Match listing entries to registry records by normalized name. Entries
/// with no match are warned about and dropped; there is no fuzzy matching.
pub fn merge(registry: &Registry, items: Vec<ListingItem>) -> Vec<Refuge> {
    let by_name: HashMap<String, &BackendRef> = registry
        .values()
        .map(|info| (normalize_name(&info.name), info))
        .collect();

    let mut merged = Vec::new();
    for item in items {
        let Some(info) = by_name.get(&normalize_name(&item.name)) else {
            warn!("No registry match found for '{}'", item.name);
            continue;
        };
        merged.push(Refuge {
            name: item.name,
            lat: item.lat,
            lng: item.lng,
            altitude_m: item.altitude_m,
            places: item.places,
            gardien: item.gardien,
            description: item.description,
            urls: item.urls,
            backend: (*info).clone(),
        });
    }
    merged
}

/// Case-insensitive, whitespace-collapsed comparison key.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> Registry {
        serde_json::from_value(serde_json::json!({
            "1": { "name": "Refuge du Goûter", "structure": "BK_STRUCTURE:85", "capacity": 120 },
            "2": { "name": "refuge de l'estrop", "structure": "BK_STRUCTURE:12" }
        }))
        .unwrap()
    }

    #[test]
    fn normalization_is_case_and_whitespace_insensitive() {
        assert_eq!(
            normalize_name("Refuge  du  Goûter"),
            normalize_name("refuge du goûter")
        );
        assert_eq!(normalize_name("  Refuge\tde l'Estrop \n"), "refuge de l'estrop");
    }

    #[test]
    fn fixture_merge_matches_by_normalized_name() {
        let html = std::fs::read_to_string("tests/fixtures/refuges.html").unwrap();
        let items = listing::parse(&html);
        let merged = merge(&sample_registry(), items);

        // Goûter matches by case, Estrop by collapsed whitespace; the Pavé
        // has no registry record and is dropped.
        assert_eq!(merged.len(), 2);

        let gouter = merged.iter().find(|r| r.name == "Refuge du Goûter").unwrap();
        assert_eq!(gouter.backend.structure, "BK_STRUCTURE:85");
        assert_eq!(gouter.lat, Some(45.851));
        assert_eq!(gouter.places, Some(120));

        let estrop = merged.iter().find(|r| r.name == "Refuge de l'Estrop").unwrap();
        assert_eq!(estrop.backend.structure, "BK_STRUCTURE:12");
        assert!(estrop.gardien.is_none());
    }

    #[test]
    fn unmatched_listing_entry_is_dropped() {
        let items = vec![ListingItem {
            name: "Refuge inconnu".to_string(),
            lat: Some(45.5),
            lng: Some(6.0),
            altitude_m: None,
            places: None,
            gardien: None,
            description: String::new(),
            urls: Vec::new(),
        }];
        assert!(merge(&sample_registry(), items).is_empty());
    }

    #[test]
    fn listing_fields_flow_into_merged_record() {
        let items = vec![ListingItem {
            name: "Refuge du Goûter".to_string(),
            lat: Some(45.851),
            lng: Some(6.827),
            altitude_m: Some(3835),
            places: Some(120),
            gardien: Some("Antoine Rattier".to_string()),
            description: "Voie normale du Mont-Blanc.".to_string(),
            urls: vec!["https://refugedugouter.ffcam.fr/".to_string()],
        }];
        let merged = merge(&sample_registry(), items);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].gardien.as_deref(), Some("Antoine Rattier"));
        assert_eq!(merged[0].altitude_m, Some(3835));
        assert_eq!(merged[0].urls.len(), 1);
        assert_eq!(
            merged[0].backend.extra.get("capacity"),
            Some(&serde_json::json!(120))
        );
    }
}
