//! Binary entry point: load config, wire collaborators, run one batch.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use marketplace_harvester::crawling::HarvestOrchestrator;
use marketplace_harvester::domain::services::ListingStore;
use marketplace_harvester::infrastructure::{
    config::AppConfig, logging, FantocciniDriver, GeminiVisionClassifier, MemoryStore, SheetStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let (config, created) = AppConfig::load_or_create(&config_path).await?;
    logging::init_logging(&config.logging)?;
    if created {
        info!("wrote default configuration to {}", config_path.display());
    } else {
        info!("configuration loaded from {}", config_path.display());
    }

    let driver = Arc::new(
        FantocciniDriver::connect(&config.browser.webdriver_url)
            .await
            .context("browser session unavailable")?,
    );
    let classifier = Arc::new(GeminiVisionClassifier::new(&config.classifier)?);

    let store: Arc<dyn ListingStore> = if config.store.webhook_url.is_empty() {
        warn!("store.webhook_url is empty, running against the in-memory store (dry run)");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SheetStore::new(&config.store)?)
    };

    let orchestrator = HarvestOrchestrator::new(driver, classifier, store, config)?;

    // Ctrl-c requests a cooperative stop; the loop checks between steps.
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current step then stopping");
            cancel.cancel();
        }
    });

    let report = orchestrator.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.hit_wall() {
        warn!("at least one search term hit a login wall or block page");
    }
    Ok(())
}
