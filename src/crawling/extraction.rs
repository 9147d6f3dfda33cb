//! Extraction adapter: snapshot a navigated listing, classify it, and map
//! the response into fully-defaulted item records.
//!
//! The classifier promises nothing on failure: responses routinely come back
//! wrapped in prose or markdown fences, with trailing commentary, or missing
//! fields. Recovery is therefore structural (outermost balanced bracket
//! pair) and every mapped field has a total default, so the adapter never
//! emits a partial record. When nothing salvageable comes back, the listing
//! is marked extraction-failed rather than dropped, so freshness still
//! advances and the URL is not retried every cycle.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::candidate_url::CandidateUrl;
use crate::domain::listing::{ExtractedItem, ListingRecordGroup, ListingSnapshot, ProductCategory};
use crate::domain::services::{BrowserDriver, VisionClassifier};

/// Task instruction sent with every snapshot.
const CLASSIFY_INSTRUCTION: &str = "You are reading a screenshot of a single marketplace listing \
for sealed trading card products. Respond with JSON only: an object with keys \
\"listingPrice\" (number), \"location\" (string), \"isMultiItem\" (boolean) and \"items\", an \
array where each element has \"name\", \"productType\" (one of ELITE_TRAINER_BOX, BOOSTER_BOX, \
BOOSTER_BUNDLE, BOOSTER_PACK, TIN, COLLECTION_BOX, SINGLE_CARD, LOT, OTHER), \"price\" (number), \
\"quantity\" (integer), \"unitOfSale\", \"note\" and \"language\". List every distinct product \
visible in the listing.";

/// Hard cap on content-stability expansion passes.
const MAX_EXPANSION_PASSES: u32 = 5;

/// Soft ceiling used only to log suspected classifier hallucination.
const ITEM_COUNT_AUDIT_THRESHOLD: usize = 12;

pub struct ExtractionAdapter;

impl ExtractionAdapter {
    /// Capture and classify the listing the driver currently shows.
    ///
    /// Classifier failures produce an `Ok` group flagged `extraction_failed`;
    /// only browser transport failures (no snapshot possible) are errors.
    pub async fn extract(
        driver: &dyn BrowserDriver,
        classifier: &dyn VisionClassifier,
        candidate: &CandidateUrl,
        search_term: &str,
    ) -> Result<ListingRecordGroup> {
        expand_listing_content(driver).await;

        let snapshot = ListingSnapshot {
            url: candidate.canonical.clone(),
            image_png: driver
                .screenshot()
                .await
                .context("failed to snapshot listing page")?,
            search_term: search_term.to_string(),
            discovered_at: Utc::now(),
        };

        let raw = match classifier
            .classify(&snapshot.image_png, CLASSIFY_INSTRUCTION)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("classifier call failed for {}: {e:#}", snapshot.url);
                return Ok(ListingRecordGroup::failed(&snapshot.url, search_term));
            }
        };

        match parse_classifier_payload(&raw) {
            Some(payload) => Ok(group_from_payload(&payload, &snapshot)),
            None => {
                warn!("unparseable classifier payload for {}", snapshot.url);
                Ok(ListingRecordGroup::failed(&snapshot.url, search_term))
            }
        }
    }
}

/// Activate "see more" affordances until the page content stabilizes.
///
/// Expansion can reveal nested expanders, so this is a fixed-point loop:
/// each pass clicks whatever expanders are currently present and compares
/// the document text length before and after. A hard pass cap guarantees
/// termination on pathological pages. Failures are ignored; expansion is
/// best-effort.
async fn expand_listing_content(driver: &dyn BrowserDriver) {
    let js = "const expanders = Array.from(document.querySelectorAll('[role=\"button\"]'))\
        .filter(el => /see more|show more/i.test(el.textContent || ''));\
        expanders.forEach(el => el.click());\
        return { clicked: expanders.length, length: document.body.innerText.length };";

    let mut previous_length: i64 = -1;
    for pass in 0..MAX_EXPANSION_PASSES {
        let Ok(result) = driver.execute_script(js).await else {
            return;
        };
        let clicked = result.get("clicked").and_then(Value::as_i64).unwrap_or(0);
        let length = result.get("length").and_then(Value::as_i64).unwrap_or(0);
        debug!("expansion pass {pass}: clicked {clicked}, content length {length}");
        if clicked == 0 || length == previous_length {
            return;
        }
        previous_length = length;
    }
}

/// Parse the classifier response, tolerating prose and fences around the
/// JSON by locating the outermost balanced bracket pair.
pub fn parse_classifier_payload(raw: &str) -> Option<Value> {
    let json = extract_balanced_json(raw)?;
    serde_json::from_str(json).ok()
}

/// Return the substring spanning the outermost balanced `{}` or `[]` pair,
/// string- and escape-aware, ignoring any noise before or after it.
pub fn extract_balanced_json(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let start = raw.find(['{', '['])?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Map a parsed payload into a record group, applying total defaults.
fn group_from_payload(payload: &Value, snapshot: &ListingSnapshot) -> ListingRecordGroup {
    let items: Vec<ExtractedItem> = match payload {
        // Canonical shape: object with an items array.
        Value::Object(map) if map.contains_key("items") => map
            .get("items")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().map(item_from_value).collect())
            .unwrap_or_default(),
        // Bare array of items.
        Value::Array(arr) => arr.iter().map(item_from_value).collect(),
        // A single item object.
        Value::Object(_) => vec![item_from_value(payload)],
        _ => Vec::new(),
    };

    if items.len() > ITEM_COUNT_AUDIT_THRESHOLD {
        warn!(
            "classifier returned {} items for {}, audit for hallucination",
            items.len(),
            snapshot.url
        );
    }

    let multi_item = payload
        .get("isMultiItem")
        .and_then(Value::as_bool)
        .unwrap_or(items.len() > 1);

    ListingRecordGroup {
        url: snapshot.url.clone(),
        search_term: snapshot.search_term.clone(),
        listing_price: payload
            .get("listingPrice")
            .or_else(|| payload.get("price"))
            .map(parse_price)
            .unwrap_or(0.0),
        location: string_field(payload, &["location"]).unwrap_or_default(),
        multi_item,
        items,
        extraction_failed: false,
        discovered_at: snapshot.discovered_at,
    }
}

/// Build one item from a payload element. Every field falls back to its
/// total default from the domain model.
fn item_from_value(value: &Value) -> ExtractedItem {
    let defaults = ExtractedItem::default();
    ExtractedItem {
        name: string_field(value, &["name", "productName", "title"])
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.name),
        category: string_field(value, &["productType", "category", "type"])
            .map(|s| ProductCategory::parse(&s))
            .unwrap_or(defaults.category),
        price: value.get("price").map(parse_price).unwrap_or(defaults.price),
        quantity: value
            .get("quantity")
            .and_then(parse_quantity)
            .unwrap_or(defaults.quantity),
        unit_of_sale: string_field(value, &["unitOfSale", "unit"])
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.unit_of_sale),
        note: string_field(value, &["note", "notes"]).unwrap_or(defaults.note),
        language: string_field(value, &["language", "lang"])
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.language),
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(k))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Accept a number or a currency-formatted string; anything else is 0.00.
fn parse_price(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0).max(0.0),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().unwrap_or(0.0).max(0.0)
        }
        _ => 0.0,
    }
}

/// Quantities are integers, never fractional, never below 1.
fn parse_quantity(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some((n.round().max(1.0)) as u32)
}
