//! Navigation engine: ordered fallback strategies with one success predicate.
//!
//! The target site intermittently intercepts direct navigation and redirects
//! back to the feed, so three independent strategies share the predicate
//! "current URL matches the item-path pattern within a bounded wait". Wall
//! detection short-circuits everything: once a login wall or block page is on
//! screen, no further strategy can help and the term's batch must stop.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::domain::candidate_url::CandidateUrl;
use crate::domain::services::BrowserDriver;
use crate::infrastructure::config::NavigationConfig;

/// Navigation strategies in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavStrategy {
    /// Plain driver navigation to the item URL.
    Direct,
    /// In-page script assignment of `window.location`.
    Script,
    /// Return to the results view and click the matching link element.
    Click,
}

/// Terminal outcome of navigating to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavOutcome {
    /// The item page was reached; records which strategy got there.
    Success { strategy: NavStrategy },
    /// Login wall signature on screen.
    LoginRequired,
    /// Block or rate-limit page on screen.
    Blocked,
    /// All strategies exhausted.
    Failed,
}

pub struct NavigationEngine {
    item_path: Regex,
    strategy_timeout: Duration,
    poll_interval: Duration,
    login_signatures: Vec<String>,
    block_signatures: Vec<String>,
}

impl NavigationEngine {
    pub fn new(config: &NavigationConfig) -> Result<Self> {
        Ok(Self {
            item_path: Regex::new(&config.item_path_pattern)?,
            strategy_timeout: Duration::from_secs(config.strategy_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(50)),
            login_signatures: lowercase_all(&config.login_wall_signatures),
            block_signatures: lowercase_all(&config.block_page_signatures),
        })
    }

    /// Drive the session to the candidate's item page. Worst-case latency is
    /// bounded by the sum of the three per-strategy timeouts.
    pub async fn navigate_to_listing(
        &self,
        driver: &dyn BrowserDriver,
        candidate: &CandidateUrl,
        results_url: &str,
    ) -> Result<NavOutcome> {
        for strategy in [NavStrategy::Direct, NavStrategy::Script, NavStrategy::Click] {
            let attempt = self.attempt(driver, candidate, results_url, strategy);
            let reached = match timeout(self.strategy_timeout, attempt).await {
                Ok(Ok(reached)) => reached,
                Ok(Err(e)) => {
                    warn!("{:?} navigation errored for {}: {e:#}", strategy, candidate);
                    false
                }
                Err(_) => {
                    debug!("{:?} navigation timed out for {}", strategy, candidate);
                    false
                }
            };

            // Walls short-circuit remaining strategies from any state.
            if let Some(wall) = self.detect_wall(driver).await {
                return Ok(wall);
            }
            if reached {
                debug!("reached {} via {:?}", candidate, strategy);
                return Ok(NavOutcome::Success { strategy });
            }
        }
        Ok(NavOutcome::Failed)
    }

    async fn attempt(
        &self,
        driver: &dyn BrowserDriver,
        candidate: &CandidateUrl,
        results_url: &str,
        strategy: NavStrategy,
    ) -> Result<bool> {
        match strategy {
            NavStrategy::Direct => {
                driver.navigate(&candidate.canonical).await?;
            }
            NavStrategy::Script => {
                let js = format!(
                    "window.location.href = {}; return true;",
                    serde_json::Value::String(candidate.canonical.clone())
                );
                driver.execute_script(&js).await?;
            }
            NavStrategy::Click => {
                driver.navigate(results_url).await?;
                let selector = format!("a[href*=\"{}\"]", candidate.canonical_path());
                if !driver.click_matching(&selector).await? {
                    return Ok(false);
                }
            }
        }
        self.await_item_page(driver).await
    }

    /// Poll the current URL until it matches the item-path pattern. The
    /// caller's timeout bounds this loop.
    async fn await_item_page(&self, driver: &dyn BrowserDriver) -> Result<bool> {
        loop {
            let url = driver.current_url().await?;
            if self.item_path.is_match(&url) {
                return Ok(true);
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Match the page source against wall signatures. Transport failures
    /// here are ignored; a wall we cannot read will be caught on the next
    /// candidate.
    pub async fn detect_wall(&self, driver: &dyn BrowserDriver) -> Option<NavOutcome> {
        let source = driver.page_source().await.ok()?.to_lowercase();
        if self.login_signatures.iter().any(|s| source.contains(s)) {
            return Some(NavOutcome::LoginRequired);
        }
        if self.block_signatures.iter().any(|s| source.contains(s)) {
            return Some(NavOutcome::Blocked);
        }
        None
    }
}

fn lowercase_all(signatures: &[String]) -> Vec<String> {
    signatures.iter().map(|s| s.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Driver whose navigation strategies can be scripted to fail.
    struct ScriptedDriver {
        direct_works: bool,
        script_works: bool,
        click_works: bool,
        current: Mutex<String>,
        page: Mutex<String>,
        click_attempts: AtomicUsize,
    }

    impl ScriptedDriver {
        fn new(direct: bool, script: bool, click: bool) -> Self {
            Self {
                direct_works: direct,
                script_works: script,
                click_works: click,
                current: Mutex::new("https://x/marketplace/search".to_string()),
                page: Mutex::new("<html>feed</html>".to_string()),
                click_attempts: AtomicUsize::new(0),
            }
        }

        fn land(&self, works: bool) {
            if works {
                *self.current.lock().unwrap() = "https://x/marketplace/item/42".to_string();
            } else {
                *self.current.lock().unwrap() = "https://x/marketplace/search".to_string();
            }
        }
    }

    #[async_trait]
    impl BrowserDriver for ScriptedDriver {
        async fn navigate(&self, url: &str) -> Result<()> {
            if url.contains("/item/") {
                self.land(self.direct_works);
            }
            Ok(())
        }
        async fn current_url(&self) -> Result<String> {
            Ok(self.current.lock().unwrap().clone())
        }
        async fn page_source(&self) -> Result<String> {
            Ok(self.page.lock().unwrap().clone())
        }
        async fn screenshot(&self) -> Result<Vec<u8>> {
            Ok(vec![])
        }
        async fn scroll(&self) -> Result<()> {
            Ok(())
        }
        async fn find_links(&self, _selector: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn click_matching(&self, _selector: &str) -> Result<bool> {
            self.click_attempts.fetch_add(1, Ordering::SeqCst);
            self.land(self.click_works);
            Ok(true)
        }
        async fn execute_script(&self, js: &str) -> Result<serde_json::Value> {
            if js.contains("window.location.href") {
                self.land(self.script_works);
            }
            Ok(serde_json::Value::Bool(true))
        }
        async fn open_tab(&self) -> Result<String> {
            anyhow::bail!("no tabs")
        }
        async fn close_tab(&self, _handle: &str) -> Result<()> {
            Ok(())
        }
        async fn switch_tab(&self, _handle: &str) -> Result<()> {
            Ok(())
        }
        async fn list_tabs(&self) -> Result<Vec<String>> {
            Ok(vec!["main".to_string()])
        }
    }

    fn engine() -> NavigationEngine {
        let config = NavigationConfig {
            strategy_timeout_secs: 1,
            poll_interval_ms: 50,
            ..NavigationConfig::default()
        };
        NavigationEngine::new(&config).expect("engine")
    }

    fn candidate() -> CandidateUrl {
        CandidateUrl::new("https://x/marketplace/item/42?ref=feed")
    }

    #[tokio::test]
    async fn direct_success_skips_fallbacks() {
        let driver = ScriptedDriver::new(true, false, false);
        let outcome = engine()
            .navigate_to_listing(&driver, &candidate(), "https://x/marketplace/search")
            .await
            .expect("navigate");
        assert_eq!(outcome, NavOutcome::Success { strategy: NavStrategy::Direct });
        assert_eq!(driver.click_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn script_success_never_reaches_click() {
        let driver = ScriptedDriver::new(false, true, false);
        let outcome = engine()
            .navigate_to_listing(&driver, &candidate(), "https://x/marketplace/search")
            .await
            .expect("navigate");
        assert_eq!(outcome, NavOutcome::Success { strategy: NavStrategy::Script });
        assert_eq!(driver.click_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_strategies_exhausted_is_failed() {
        let driver = ScriptedDriver::new(false, false, false);
        let outcome = engine()
            .navigate_to_listing(&driver, &candidate(), "https://x/marketplace/search")
            .await
            .expect("navigate");
        assert_eq!(outcome, NavOutcome::Failed);
        assert_eq!(driver.click_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn login_wall_short_circuits() {
        let driver = ScriptedDriver::new(false, true, false);
        *driver.page.lock().unwrap() = "<html>You must log in to continue</html>".to_string();
        let outcome = engine()
            .navigate_to_listing(&driver, &candidate(), "https://x/marketplace/search")
            .await
            .expect("navigate");
        assert_eq!(outcome, NavOutcome::LoginRequired);
    }

    #[tokio::test]
    async fn block_page_detected() {
        let driver = ScriptedDriver::new(true, false, false);
        *driver.page.lock().unwrap() =
            "<html>You have been temporarily blocked</html>".to_string();
        let outcome = engine()
            .navigate_to_listing(&driver, &candidate(), "https://x/marketplace/search")
            .await
            .expect("navigate");
        assert_eq!(outcome, NavOutcome::Blocked);
    }
}
