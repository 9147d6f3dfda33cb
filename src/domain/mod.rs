//! Domain layer: listing records, URL identity, and the service seams the
//! crawl core depends on.

pub mod candidate_url;
pub mod listing;
pub mod services;

pub use candidate_url::{canonicalize, CandidateUrl};
pub use listing::{
    ExtractedItem, ListingRecordGroup, ListingRow, ListingSnapshot, ProductCategory, StoredRow,
};
pub use services::{BrowserDriver, ListingStore, VisionClassifier};
