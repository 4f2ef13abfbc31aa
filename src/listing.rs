use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Class marker on each refuge block in the scraped listing page.
const ITEM_MARKER: &str = "seolanMap-item";

static LAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-lat\s*=\s*"([^"]*)""#).unwrap());
static LNG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-lng\s*=\s*"([^"]*)""#).unwrap());
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<h3[^>]*>(.*?)</h3>").unwrap());
static DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)class="description"[^>]*>(.*?)</"#).unwrap());
static GARDIEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)class="gardien"[^>]*>(.*?)</"#).unwrap());
static INFOS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)class="infos"[^>]*>(.*?)</"#).unwrap());
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*"([^"]*)""#).unwrap());
static INFOS_VALUES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*m\s*-\s*(\d+)\s*places").unwrap());

/// One refuge block extracted from the listing page, before matching
/// against the registry.
#[derive(Debug, Clone)]
pub struct ListingItem {
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub altitude_m: Option<u32>,
    pub places: Option<u32>,
    pub gardien: Option<String>,
    pub description: String,
    pub urls: Vec<String>,
}

/// Split the listing document into per-refuge blocks and extract each one.
/// Blocks without a heading (stray marker matches in styles or scripts)
/// are skipped.
pub fn parse(doc: &str) -> Vec<ListingItem> {
    split_items(doc)
        .into_iter()
        .filter_map(|block| {
            let item = parse_item(block);
            if item.is_none() {
                debug!("Skipping listing block without a heading");
            }
            item
        })
        .collect()
}

/// Slice the document into one chunk per marker occurrence, each starting
/// at the opening tag that carries the marker class.
fn split_items(doc: &str) -> Vec<&str> {
    let mut starts = Vec::new();
    let mut from = 0;
    while let Some(pos) = doc[from..].find(ITEM_MARKER) {
        let abs = from + pos;
        starts.push(doc[..abs].rfind('<').unwrap_or(abs));
        from = abs + ITEM_MARKER.len();
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(doc.len());
            &doc[start..end]
        })
        .collect()
}

fn parse_item(block: &str) -> Option<ListingItem> {
    let name = capture(&NAME_RE, block).map(clean_text).filter(|n| !n.is_empty())?;

    let lat = capture(&LAT_RE, block).and_then(|v| v.trim().parse().ok());
    let lng = capture(&LNG_RE, block).and_then(|v| v.trim().parse().ok());

    let description = capture(&DESCRIPTION_RE, block).map(clean_text).unwrap_or_default();

    // "Gardien(ne) : Jean Dupont" → "Jean Dupont"
    let gardien = capture(&GARDIEN_RE, block)
        .map(clean_text)
        .map(|t| t.replace("Gardien(ne) :", "").trim().to_string())
        .filter(|t| !t.is_empty());

    // "<altitude> m - <places> places"; anything else carries no numbers
    let infos = capture(&INFOS_RE, block).map(clean_text).unwrap_or_default();
    let (altitude_m, places) = match INFOS_VALUES_RE.captures(&infos) {
        Some(caps) => (caps[1].parse().ok(), caps[2].parse().ok()),
        None => (None, None),
    };

    let urls = HREF_RE
        .captures_iter(block)
        .map(|caps| caps[1].to_string())
        .collect();

    Some(ListingItem {
        name,
        lat,
        lng,
        altitude_m,
        places,
        gardien,
        description,
        urls,
    })
}

fn capture<'a>(re: &Regex, block: &'a str) -> Option<&'a str> {
    re.captures(block).map(|caps| caps.get(1).unwrap().as_str())
}

/// Drop tags, decode entities, collapse whitespace.
fn clean_text(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&decode_entities(&out))
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the entities the listing actually uses: the XML named set, the
/// accented characters common in French refuge names, and numeric forms.
/// Unknown entities pass through untouched.
fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let Some(semi) = tail.find(';').filter(|&i| i > 1 && i <= 9) else {
            out.push('&');
            rest = &rest[amp + 1..];
            continue;
        };

        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            "eacute" => Some('é'),
            "egrave" => Some('è'),
            "ecirc" => Some('ê'),
            "agrave" => Some('à'),
            "acirc" => Some('â'),
            "ocirc" => Some('ô'),
            "ucirc" => Some('û'),
            "ccedil" => Some('ç'),
            "Eacute" => Some('É'),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[amp + semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[amp + 1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_ITEM: &str = r#"
        <div class="seolanMap-item" data-lat="45.8510" data-lng="6.8270">
          <h3>Refuge du Go&ucirc;ter</h3>
          <p class="infos">3835 m - 120 places</p>
          <p class="gardien">Gardien(ne) : Antoine Rattier</p>
          <p class="description">Sur la voie normale du Mont-Blanc.</p>
          <a href="https://refugedugouter.ffcam.fr/">Site du refuge</a>
          <a href="https://centrale.ffcam.fr/index.php?structure=BK_STRUCTURE:85">Réserver</a>
        </div>
    "#;

    #[test]
    fn single_item() {
        let items = parse(ONE_ITEM);
        assert_eq!(items.len(), 1);

        let item = &items[0];
        assert_eq!(item.name, "Refuge du Goûter");
        assert_eq!(item.lat, Some(45.851));
        assert_eq!(item.lng, Some(6.827));
        assert_eq!(item.altitude_m, Some(3835));
        assert_eq!(item.places, Some(120));
        assert_eq!(item.gardien.as_deref(), Some("Antoine Rattier"));
        assert_eq!(item.description, "Sur la voie normale du Mont-Blanc.");
        assert_eq!(item.urls.len(), 2);
        assert_eq!(item.urls[0], "https://refugedugouter.ffcam.fr/");
    }

    #[test]
    fn missing_optional_fields() {
        let html = r#"
            <div class="seolanMap-item" data-lat="44.19" data-lng="6.36">
              <h3>Refuge de l'Estrop</h3>
            </div>
        "#;
        let items = parse(html);
        assert_eq!(items.len(), 1);
        assert!(items[0].gardien.is_none());
        assert!(items[0].altitude_m.is_none());
        assert!(items[0].places.is_none());
        assert!(items[0].description.is_empty());
        assert!(items[0].urls.is_empty());
    }

    #[test]
    fn infos_without_places_pattern() {
        let html = r#"
            <div class="seolanMap-item" data-lat="45.07" data-lng="6.41">
              <h3>Refuge du Pavé</h3>
              <p class="infos">Altitude 2841 m</p>
            </div>
        "#;
        let items = parse(html);
        assert_eq!(items[0].altitude_m, None);
        assert_eq!(items[0].places, None);
    }

    #[test]
    fn missing_coordinates_parse_as_none() {
        let html = r#"
            <div class="seolanMap-item">
              <h3>Refuge sans position</h3>
            </div>
        "#;
        let items = parse(html);
        assert_eq!(items.len(), 1);
        assert!(items[0].lat.is_none());
        assert!(items[0].lng.is_none());
    }

    #[test]
    fn block_without_heading_is_skipped() {
        let html = r#"<style>.seolanMap-item { color: red; }</style>"#;
        assert!(parse(html).is_empty());
    }

    #[test]
    fn fixture_listing() {
        let html = std::fs::read_to_string("tests/fixtures/refuges.html").unwrap();
        let items = parse(&html);
        assert_eq!(items.len(), 3);

        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"Refuge du Goûter"));
        assert!(names.contains(&"Refuge de l'Estrop"));
        assert!(names.contains(&"Refuge du Pavé"));

        let gouter = items.iter().find(|i| i.name == "Refuge du Goûter").unwrap();
        assert_eq!(gouter.places, Some(120));
        assert_eq!(gouter.altitude_m, Some(3835));
    }

    #[test]
    fn entity_decoding() {
        assert_eq!(decode_entities("Go&ucirc;ter"), "Goûter");
        assert_eq!(decode_entities("&Eacute;crins"), "Écrins");
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&#233;t&#xE9;"), "été");
        assert_eq!(decode_entities("fish &chips; here"), "fish &chips; here");
        assert_eq!(decode_entities("lone & ampersand"), "lone & ampersand");
    }

    #[test]
    fn whitespace_collapsed_in_text() {
        let html = "<div class=\"seolanMap-item\"><h3>Refuge  de\n  l'Estrop</h3></div>";
        let items = parse(html);
        assert_eq!(items[0].name, "Refuge de l'Estrop");
    }
}
