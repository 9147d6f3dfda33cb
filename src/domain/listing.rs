//! Listing domain records.
//!
//! Every field of an [`ExtractedItem`] carries a total default so the
//! extraction adapter can always emit a complete record, no matter how
//! malformed the classifier payload is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed category enumeration for sealed trading-card product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    EliteTrainerBox,
    BoosterBox,
    BoosterBundle,
    BoosterPack,
    Tin,
    CollectionBox,
    SingleCard,
    Lot,
    #[default]
    Other,
}

impl ProductCategory {
    /// Tolerant parse used on classifier output. Unknown or missing values
    /// default to [`ProductCategory::Other`].
    pub fn parse(raw: &str) -> Self {
        let key: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match key.as_str() {
            "ETB" | "ELITETRAINERBOX" => Self::EliteTrainerBox,
            "BOOSTERBOX" | "DISPLAYBOX" => Self::BoosterBox,
            "BOOSTERBUNDLE" | "BUNDLE" => Self::BoosterBundle,
            "BOOSTERPACK" | "PACK" | "SLEEVEDBOOSTER" => Self::BoosterPack,
            "TIN" => Self::Tin,
            "COLLECTIONBOX" | "COLLECTION" | "PREMIUMCOLLECTION" | "BOX" => Self::CollectionBox,
            "SINGLECARD" | "SINGLE" | "CARD" => Self::SingleCard,
            "LOT" | "BULK" | "MIXEDLOT" => Self::Lot,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EliteTrainerBox => "ELITE_TRAINER_BOX",
            Self::BoosterBox => "BOOSTER_BOX",
            Self::BoosterBundle => "BOOSTER_BUNDLE",
            Self::BoosterPack => "BOOSTER_PACK",
            Self::Tin => "TIN",
            Self::CollectionBox => "COLLECTION_BOX",
            Self::SingleCard => "SINGLE_CARD",
            Self::Lot => "LOT",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized item recognized on a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    /// Never empty; defaults to "Unknown Item".
    pub name: String,
    pub category: ProductCategory,
    /// Numeric price, defaults to 0.00.
    pub price: f64,
    /// Integer quantity, never fractional, never below 1.
    pub quantity: u32,
    /// Unit-of-sale tag, e.g. "each" or "set".
    pub unit_of_sale: String,
    /// Free-text note from the classifier.
    pub note: String,
    /// Language tag of the listing text.
    pub language: String,
}

impl Default for ExtractedItem {
    fn default() -> Self {
        Self {
            name: "Unknown Item".to_string(),
            category: ProductCategory::Other,
            price: 0.0,
            quantity: 1,
            unit_of_sale: "each".to_string(),
            note: String::new(),
            language: "en".to_string(),
        }
    }
}

/// One or more extracted items plus listing-level fields sharing a single
/// canonical URL. Persisting a group replaces every existing row for that URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecordGroup {
    pub url: String,
    pub search_term: String,
    /// Top-of-page asking price.
    pub listing_price: f64,
    pub location: String,
    pub multi_item: bool,
    pub items: Vec<ExtractedItem>,
    /// Set when the classifier failed or returned unparseable content.
    pub extraction_failed: bool,
    pub discovered_at: DateTime<Utc>,
}

impl ListingRecordGroup {
    /// Group representing a recorded-but-failed extraction attempt. Persisted
    /// as a single low-confidence placeholder row so freshness still advances.
    pub fn failed(url: impl Into<String>, search_term: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            search_term: search_term.into(),
            listing_price: 0.0,
            location: String::new(),
            multi_item: false,
            items: Vec::new(),
            extraction_failed: true,
            discovered_at: Utc::now(),
        }
    }

    /// Flatten into store rows, one per item. An empty (failed) group yields
    /// one placeholder row carrying the failure flag.
    pub fn to_rows(&self, processed_at: DateTime<Utc>) -> Vec<ListingRow> {
        let make = |item: &ExtractedItem| ListingRow {
            url: self.url.clone(),
            name: item.name.clone(),
            category: item.category,
            price: item.price,
            quantity: item.quantity,
            unit_of_sale: item.unit_of_sale.clone(),
            note: item.note.clone(),
            language: item.language.clone(),
            listing_price: self.listing_price,
            location: self.location.clone(),
            multi_item: self.multi_item,
            search_term: self.search_term.clone(),
            low_confidence: self.extraction_failed,
            processed_at,
        };

        if self.items.is_empty() {
            vec![make(&ExtractedItem {
                note: "extraction failed".to_string(),
                ..ExtractedItem::default()
            })]
        } else {
            self.items.iter().map(make).collect()
        }
    }
}

/// A visual capture of a navigated item page plus discovery metadata.
/// Created once per navigation success and consumed exactly once by the
/// extraction adapter; never persisted itself.
#[derive(Debug, Clone)]
pub struct ListingSnapshot {
    pub url: String,
    pub image_png: Vec<u8>,
    pub search_term: String,
    pub discovered_at: DateTime<Utc>,
}

/// One tabular-store row, the unit the listing store appends and deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRow {
    pub url: String,
    pub name: String,
    pub category: ProductCategory,
    pub price: f64,
    pub quantity: u32,
    pub unit_of_sale: String,
    pub note: String,
    pub language: String,
    pub listing_price: f64,
    pub location: String,
    pub multi_item: bool,
    pub search_term: String,
    pub low_confidence: bool,
    pub processed_at: DateTime<Utc>,
}

/// A row as read back from the store, paired with its physical index
/// (the spreadsheet row number used for deletes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub index: u64,
    pub row: ListingRow,
}
