use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const REGISTRY_PATH: &str = "data/refuges.json";
pub const LISTING_PATH: &str = "data/refuges.html";
pub const DIRECTORY_PATH: &str = "data/merged_refuges.json";
pub const AVAILABILITY_PATH: &str = "data/refuge_availabilities.json";
pub const JOINED_PATH: &str = "data/merged_availability_refuges.json";

/// One record from the curated registry, keyed by an opaque id in the file.
/// Carries the booking backend's structure identifier (e.g. `BK_STRUCTURE:85`).
/// Unknown registry fields ride along so a directory round-trip loses nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRef {
    pub name: String,
    pub structure: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub type Registry = BTreeMap<String, BackendRef>;

/// Unified per-refuge record produced by the directory merge.
/// Coordinates are optional so downstream filters can fail open on
/// entries that never carried them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refuge {
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub altitude_m: Option<u32>,
    pub places: Option<u32>,
    pub gardien: Option<String>,
    pub description: String,
    pub urls: Vec<String>,
    pub backend: BackendRef,
}

/// ISO date string → open booking slots on that date.
pub type AvailabilityMap = BTreeMap<String, u32>;

/// Per-refuge fetch result, keyed by structure identifier in the output
/// file. Exactly one of `availability` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub name: String,
    pub structure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<AvailabilityMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type AvailabilityResults = BTreeMap<String, AvailabilityRecord>;

/// Denormalized join of directory and availability, with one target
/// date's capacity surfaced as a flag/count pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedRefuge {
    pub name: String,
    pub structure: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub places: Option<u32>,
    pub availability: AvailabilityMap,
    pub available_on_target_date: bool,
    pub places_on_target_date: u32,
}

pub fn load_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("Malformed JSON in {path}"))
}

pub fn save_json<T: Serialize>(path: &str, value: &T) -> Result<()> {
    if let Some(dir) = Path::new(path).parent() {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let pretty = serde_json::to_string_pretty(value)?;
    fs::write(path, pretty).with_context(|| format!("Failed to write {path}"))
}
