//! Crawl core: discovery, freshness, navigation, extraction, persistence,
//! and the orchestrator that ties them together.

pub mod discovery;
pub mod error;
pub mod extraction;
pub mod freshness;
pub mod navigation;
pub mod orchestrator;
pub mod state;
pub mod tabs;
pub mod upsert;

pub use discovery::CandidateDiscovery;
pub use error::CrawlError;
pub use extraction::ExtractionAdapter;
pub use freshness::FreshnessCache;
pub use navigation::{NavOutcome, NavStrategy, NavigationEngine};
pub use orchestrator::HarvestOrchestrator;
pub use state::{HarvestReport, TermAbort, TermReport};
pub use tabs::{select_mode, ProcessingMode};
pub use upsert::UpsertEngine;
