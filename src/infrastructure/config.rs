//! Configuration infrastructure.
//!
//! Nested serde structs with total defaults, persisted as a JSON file under
//! the platform config directory. Missing file means defaults are written
//! back so the operator has something to edit.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub freshness: FreshnessConfig,
    pub navigation: NavigationConfig,
    pub pacing: PacingConfig,
    pub browser: BrowserConfig,
    pub classifier: ClassifierConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Search-term batch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Queries processed per run, in order.
    pub terms: Vec<String>,
    /// Target number of candidate URLs per search term.
    pub target_candidates: usize,
    /// Scroll attempts before discovery gives up on finding new links.
    pub max_scroll_attempts: u32,
    /// How long to wait for new result elements after a scroll, in ms.
    pub scroll_settle_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            terms: vec!["Pokemon ETB".to_string()],
            target_candidates: 50,
            max_scroll_attempts: 15,
            scroll_settle_ms: 3_000,
        }
    }
}

/// Freshness cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    /// Minimum days before a processed URL is eligible again.
    pub ttl_days: i64,
    /// Minimum seconds between bulk refreshes from the store.
    pub refresh_interval_secs: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            ttl_days: 7,
            refresh_interval_secs: 3_600,
        }
    }
}

/// Navigation engine settings: where results live, what an item page looks
/// like, and how long each fallback strategy may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Results view URL template; `{query}` is replaced with the
    /// percent-encoded search term.
    pub search_url_template: String,
    /// CSS selector matching item links on a results page.
    pub item_link_selector: String,
    /// Regex a current URL must match for navigation to count as success.
    pub item_path_pattern: String,
    /// Per-strategy navigation timeout, in seconds.
    pub strategy_timeout_secs: u64,
    /// Poll interval for the success predicate, in ms.
    pub poll_interval_ms: u64,
    /// Lowercased page-source substrings that identify a login wall.
    pub login_wall_signatures: Vec<String>,
    /// Lowercased page-source substrings that identify a block page.
    pub block_page_signatures: Vec<String>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            search_url_template:
                "https://www.facebook.com/marketplace/search?query={query}".to_string(),
            item_link_selector: "a[href*=\"/marketplace/item/\"]".to_string(),
            item_path_pattern: r"/marketplace/item/\d+".to_string(),
            strategy_timeout_secs: 15,
            poll_interval_ms: 500,
            login_wall_signatures: vec![
                "log in to continue".to_string(),
                "you must log in".to_string(),
                "login_form".to_string(),
            ],
            block_page_signatures: vec![
                "temporarily blocked".to_string(),
                "you're going too fast".to_string(),
                "rate limit".to_string(),
            ],
        }
    }
}

/// Human-pacing delay bounds (uniform jitter within each range).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub between_listings_min_ms: u64,
    pub between_listings_max_ms: u64,
    pub between_searches_min_ms: u64,
    pub between_searches_max_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            between_listings_min_ms: 4_000,
            between_listings_max_ms: 11_000,
            between_searches_min_ms: 20_000,
            between_searches_max_ms: 45_000,
        }
    }
}

/// WebDriver endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// WebDriver server to attach to (the session there is assumed to be
    /// already authenticated against the target site).
    pub webdriver_url: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
        }
    }
}

/// Vision classification endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL of the generateContent-style endpoint.
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Upper bound on classifier calls per minute.
    pub max_requests_per_minute: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key_env: "HARVESTER_CLASSIFIER_API_KEY".to_string(),
            timeout_secs: 60,
            max_requests_per_minute: 12,
        }
    }
}

/// Listing store webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the sheet webhook; empty selects the in-memory store
    /// (dry-run mode).
    pub webhook_url: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "error", "warn", "info", "debug" or "trace".
    pub level: String,
    /// Emit JSON-formatted logs instead of human-readable ones.
    pub json_format: bool,
    /// Also write a daily-rolled log file.
    pub file_output: bool,
    /// Directory for log files; empty means `<config dir>/logs`.
    pub file_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_output: true,
            file_dir: String::new(),
        }
    }
}

impl AppConfig {
    /// Default config file location under the platform config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("marketplace-harvester")
            .join("config.json")
    }

    /// Load the config file, creating it with defaults when absent. The
    /// second value is true when a new file was written; callers log it
    /// once the logging subscriber is up.
    pub async fn load_or_create(path: &PathBuf) -> Result<(Self, bool)> {
        if fs::try_exists(path).await.unwrap_or(false) {
            let raw = fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let config: Self = serde_json::from_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?;
            config.validate()?;
            Ok((config, false))
        } else {
            let config = Self::default();
            config.save(path).await?;
            Ok((config, true))
        }
    }

    /// Persist the configuration as pretty-printed JSON.
    pub async fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, raw)
            .await
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Reject configurations the crawl loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.search.terms.is_empty(), "search.terms must not be empty");
        anyhow::ensure!(self.search.target_candidates > 0, "search.target_candidates must be > 0");
        anyhow::ensure!(self.freshness.ttl_days > 0, "freshness.ttl_days must be > 0");
        anyhow::ensure!(
            self.pacing.between_listings_min_ms <= self.pacing.between_listings_max_ms,
            "pacing.between_listings bounds are inverted"
        );
        anyhow::ensure!(
            self.pacing.between_searches_min_ms <= self.pacing.between_searches_max_ms,
            "pacing.between_searches bounds are inverted"
        );
        regex::Regex::new(&self.navigation.item_path_pattern)
            .context("navigation.item_path_pattern is not a valid regex")?;
        Ok(())
    }

    /// Results view URL for one search term.
    pub fn results_url(&self, term: &str) -> String {
        let encoded: String = term
            .chars()
            .map(|c| match c {
                ' ' => "%20".to_string(),
                '&' => "%26".to_string(),
                '#' => "%23".to_string(),
                '?' => "%3F".to_string(),
                c => c.to_string(),
            })
            .collect();
        self.navigation
            .search_url_template
            .replace("{query}", &encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        AppConfig::default().validate().expect("defaults must be valid");
    }

    #[test]
    fn results_url_encodes_query() {
        let config = AppConfig::default();
        assert_eq!(
            config.results_url("Pokemon ETB"),
            "https://www.facebook.com/marketplace/search?query=Pokemon%20ETB"
        );
    }

    #[tokio::test]
    async fn round_trips_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.search.terms = vec!["pokemon 151".to_string()];
        config.save(&path).await.expect("save");
        let (loaded, created) = AppConfig::load_or_create(&path).await.expect("load");
        assert!(!created);
        assert_eq!(loaded.search.terms, vec!["pokemon 151".to_string()]);
    }

    #[tokio::test]
    async fn missing_file_creates_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");
        let (loaded, created) = AppConfig::load_or_create(&path).await.expect("load");
        assert!(created);
        assert_eq!(loaded.freshness.ttl_days, 7);
        assert!(path.exists());
    }

    #[test]
    fn inverted_pacing_rejected() {
        let mut config = AppConfig::default();
        config.pacing.between_listings_min_ms = 10_000;
        config.pacing.between_listings_max_ms = 1_000;
        assert!(config.validate().is_err());
    }
}
