//! Candidate discovery: scroll a results feed and collect item links.
//!
//! Discovery waits on an explicit condition (anchor count growth) rather
//! than fixed sleeps, deduplicates by canonical form, and preserves
//! first-seen order so runs are reproducible in tests.

use anyhow::Result;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::domain::candidate_url::CandidateUrl;
use crate::domain::services::BrowserDriver;
use crate::infrastructure::config::SearchConfig;

/// Scroll-and-collect loop over a results view the driver is already on.
pub struct CandidateDiscovery {
    selector: String,
    target_count: usize,
    max_scroll_attempts: u32,
    settle_timeout: Duration,
    poll_interval: Duration,
}

impl CandidateDiscovery {
    pub fn new(search: &SearchConfig, item_link_selector: &str, poll_interval_ms: u64) -> Self {
        Self {
            selector: item_link_selector.to_string(),
            target_count: search.target_candidates,
            max_scroll_attempts: search.max_scroll_attempts,
            settle_timeout: Duration::from_millis(search.scroll_settle_ms),
            poll_interval: Duration::from_millis(poll_interval_ms.max(50)),
        }
    }

    /// Collect up to `target_count` unique candidates from the current
    /// results view.
    pub async fn collect(&self, driver: &dyn BrowserDriver) -> Result<Vec<CandidateUrl>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<CandidateUrl> = Vec::new();

        // The first screen of results is there before any scroll.
        let mut dom_count = self.scan(driver, &mut seen, &mut candidates).await?;

        for attempt in 1..=self.max_scroll_attempts {
            if candidates.len() >= self.target_count {
                break;
            }

            driver.scroll().await?;
            dom_count = self.wait_for_growth(driver, dom_count).await?;

            let before = candidates.len();
            dom_count = dom_count.max(self.scan(driver, &mut seen, &mut candidates).await?);

            if candidates.len() == before {
                debug!(
                    "scroll attempt {}/{} surfaced no new unique url, feed exhausted",
                    attempt, self.max_scroll_attempts
                );
                break;
            }
        }

        candidates.truncate(self.target_count);
        info!(
            "discovery collected {} unique candidates (target {})",
            candidates.len(),
            self.target_count
        );
        Ok(candidates)
    }

    /// Scan current anchors, canonicalize, and append unseen candidates.
    /// Returns the raw DOM anchor count for the growth condition.
    async fn scan(
        &self,
        driver: &dyn BrowserDriver,
        seen: &mut HashSet<String>,
        candidates: &mut Vec<CandidateUrl>,
    ) -> Result<usize> {
        let links = driver.find_links(&self.selector).await?;
        let count = links.len();
        for href in links {
            let candidate = CandidateUrl::new(href);
            if candidate.canonical.is_empty() {
                continue;
            }
            if seen.insert(candidate.canonical.clone()) {
                candidates.push(candidate);
                if candidates.len() >= self.target_count {
                    break;
                }
            }
        }
        Ok(count)
    }

    /// Poll until the anchor count grows past `previous` or the settle
    /// timeout elapses. Never waits unbounded.
    async fn wait_for_growth(&self, driver: &dyn BrowserDriver, previous: usize) -> Result<usize> {
        let deadline = Instant::now() + self.settle_timeout;
        loop {
            let count = driver.find_links(&self.selector).await?.len();
            if count > previous || Instant::now() >= deadline {
                return Ok(count);
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Driver that reveals one batch of links per scroll.
    struct FeedDriver {
        batches: Mutex<Vec<Vec<String>>>,
        visible: Mutex<Vec<String>>,
    }

    impl FeedDriver {
        fn new(batches: Vec<Vec<&str>>) -> Self {
            let (first, rest) = batches
                .split_first()
                .map(|(f, r)| (f.clone(), r.to_vec()))
                .unwrap_or((vec![], vec![]));
            Self {
                visible: Mutex::new(first.iter().map(|s| s.to_string()).collect()),
                batches: Mutex::new(
                    rest.iter()
                        .map(|b| b.iter().map(|s| s.to_string()).collect())
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl BrowserDriver for FeedDriver {
        async fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn current_url(&self) -> Result<String> {
            Ok("https://m.example.com/marketplace/search".to_string())
        }
        async fn page_source(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn screenshot(&self) -> Result<Vec<u8>> {
            Ok(vec![])
        }
        async fn scroll(&self) -> Result<()> {
            let mut batches = self.batches.lock().unwrap();
            if !batches.is_empty() {
                let batch = batches.remove(0);
                self.visible.lock().unwrap().extend(batch);
            }
            Ok(())
        }
        async fn find_links(&self, _selector: &str) -> Result<Vec<String>> {
            Ok(self.visible.lock().unwrap().clone())
        }
        async fn click_matching(&self, _selector: &str) -> Result<bool> {
            Ok(false)
        }
        async fn execute_script(&self, _js: &str) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
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

    fn discovery(target: usize) -> CandidateDiscovery {
        CandidateDiscovery {
            selector: "a".to_string(),
            target_count: target,
            max_scroll_attempts: 15,
            settle_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn dedups_by_canonical_form() {
        let driver = FeedDriver::new(vec![
            vec![
                "https://x/marketplace/item/1?ref=a",
                "https://x/marketplace/item/1?ref=b",
                "https://x/marketplace/item/2",
            ],
            vec!["https://x/marketplace/item/2#frag", "https://x/marketplace/item/3"],
        ]);
        let found = discovery(10).collect(&driver).await.expect("collect");
        let canon: Vec<&str> = found.iter().map(|c| c.canonical.as_str()).collect();
        assert_eq!(
            canon,
            vec![
                "https://x/marketplace/item/1",
                "https://x/marketplace/item/2",
                "https://x/marketplace/item/3",
            ]
        );
    }

    #[tokio::test]
    async fn stops_at_target_count() {
        let driver = FeedDriver::new(vec![vec![
            "https://x/marketplace/item/1",
            "https://x/marketplace/item/2",
            "https://x/marketplace/item/3",
            "https://x/marketplace/item/4",
        ]]);
        let found = discovery(2).collect(&driver).await.expect("collect");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].canonical, "https://x/marketplace/item/1");
    }

    #[tokio::test]
    async fn exhausted_feed_terminates_early() {
        let driver = FeedDriver::new(vec![vec!["https://x/marketplace/item/1"]]);
        let found = discovery(50).collect(&driver).await.expect("collect");
        assert_eq!(found.len(), 1);
    }
}
