use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};
use reqwest::Client;
use tracing::{info, warn};

use crate::geo::TARGET_AREA;
use crate::store::{self, AvailabilityMap, AvailabilityRecord, AvailabilityResults, Refuge};

const BOOKING_URL: &str = "https://centrale.ffcam.fr/index.php?";
const BOOKING_ORIGIN: &str = "https://centrale.ffcam.fr";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after every request, success or not, to stay under the booking
/// service's rate tolerance.
const REQUEST_DELAY: Duration = Duration::from_millis(300);

/// The booking page embeds its calendar as a JavaScript assignment:
/// `BK.globalAvailability = {"2025-08-13": 4, ...};`
static AVAILABILITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BK\.globalAvailability\s*=\s*(\{.*?\});").unwrap());

static IDENT_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)\s*:").unwrap());
static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Fetch availability for every directory entry inside the target area,
/// one request at a time, and write the accumulated results. A single
/// entry's failure is recorded on that entry and never aborts the batch.
pub async fn run(limit: Option<usize>, date: NaiveDate) -> Result<FetchStats> {
    let refuges: Vec<Refuge> = store::load_json(store::DIRECTORY_PATH)?;
    let total_loaded = refuges.len();

    let mut selected: Vec<Refuge> = refuges
        .into_iter()
        .filter(|r| TARGET_AREA.retains(r))
        .collect();
    info!("{} of {} refuges inside the target area", selected.len(), total_loaded);

    if let Some(n) = limit {
        selected.truncate(n);
    }

    let client = booking_client()?;
    let date_str = date.format("%Y-%m-%d").to_string();

    let pb = ProgressBar::new(selected.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut results = AvailabilityResults::new();
    let mut ok = 0usize;
    let mut errors = 0usize;

    for refuge in &selected {
        let structure = refuge.backend.structure.clone();

        let record = match fetch_one(&client, &structure, &date_str).await {
            Ok(availability) => {
                ok += 1;
                AvailabilityRecord {
                    name: refuge.name.clone(),
                    structure: structure.clone(),
                    availability: Some(availability),
                    error: None,
                }
            }
            Err(e) => {
                errors += 1;
                warn!("Error fetching {}: {:#}", refuge.name, e);
                AvailabilityRecord {
                    name: refuge.name.clone(),
                    structure: structure.clone(),
                    availability: None,
                    error: Some(format!("{e:#}")),
                }
            }
        };

        results.insert(structure, record);
        pb.inc(1);
        tokio::time::sleep(REQUEST_DELAY).await;
    }

    pb.finish_and_clear();
    store::save_json(store::AVAILABILITY_PATH, &results)?;
    info!(
        "Fetched {} refuges ({} ok, {} errors), wrote {}",
        selected.len(),
        ok,
        errors,
        store::AVAILABILITY_PATH
    );

    Ok(FetchStats {
        total: selected.len(),
        ok,
        errors,
    })
}

fn booking_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ORIGIN, HeaderValue::from_static(BOOKING_ORIGIN));
    headers.insert(REFERER, HeaderValue::from_static(BOOKING_URL));

    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .default_headers(headers)
        .build()
        .context("Failed to build HTTP client")
}

async fn fetch_one(client: &Client, structure: &str, date: &str) -> Result<AvailabilityMap> {
    let body = client
        .post(BOOKING_URL)
        .form(&form_payload(structure, date))
        .send()
        .await?
        .text()
        .await?;
    extract_availability(&body)
}

/// Fixed form field set the booking widget posts; only `structure` and
/// `date` vary between requests.
fn form_payload<'a>(structure: &'a str, date: &'a str) -> Vec<(&'static str, &'a str)> {
    vec![
        ("action", "availability"),
        ("parent_url", ""),
        ("widgetHostCss", ""),
        ("apporigin", "FFCAM"),
        ("structures", ""),
        ("faqurl", ""),
        ("faqtitle", ""),
        ("mode", "FORM"),
        ("structure", structure),
        ("productCategory", "nomatter"),
        ("pax", "1"),
        ("date", date),
    ]
}

/// Pull the embedded availability object out of a booking page body.
///
/// A body without the marker yields an empty mapping. A captured payload
/// that fails strict JSON parsing is retried once after normalizing the
/// loose JavaScript literal (unquoted identifier keys, trailing commas).
pub fn extract_availability(body: &str) -> Result<AvailabilityMap> {
    let Some(caps) = AVAILABILITY_RE.captures(body) else {
        return Ok(AvailabilityMap::new());
    };

    let raw = caps.get(1).unwrap().as_str();
    match serde_json::from_str(raw) {
        Ok(map) => Ok(map),
        Err(_) => serde_json::from_str(&normalize_literal(raw))
            .with_context(|| format!("Unparseable availability payload: {raw}")),
    }
}

/// Quote bare identifier keys and drop trailing commas so a loose
/// JavaScript object literal becomes strict JSON.
fn normalize_literal(raw: &str) -> String {
    let quoted = IDENT_KEY_RE.replace_all(raw, "$1\"$2\":");
    TRAILING_COMMA_RE.replace_all(&quoted, "$1").to_string()
}
