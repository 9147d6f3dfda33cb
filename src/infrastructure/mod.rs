//! Infrastructure layer: configuration, logging, and concrete clients for
//! the browser session, the vision classifier, and the listing store.

pub mod browser;
pub mod classifier;
pub mod config;
pub mod logging;
pub mod memory_store;
pub mod sheet_store;

pub use browser::FantocciniDriver;
pub use classifier::GeminiVisionClassifier;
pub use config::AppConfig;
pub use memory_store::MemoryStore;
pub use sheet_store::SheetStore;
