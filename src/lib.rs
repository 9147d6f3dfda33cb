//! Marketplace listing harvester.
//!
//! Discovers, revisits, and extracts structured product listings from a
//! JavaScript-heavy marketplace with no public API, using a real browser
//! session plus a vision-capable classification service, and writes
//! normalized records into an external tabular store.

pub mod crawling;
pub mod domain;
pub mod infrastructure;
