//! Session mode selection: Sequential vs Tabbed processing.
//!
//! Tabbed mode is a capability, not a guarantee: embedded or hardened
//! sessions refuse programmatic tabs, and that is a supported mode switch,
//! not an error. The probe runs once per batch.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::services::BrowserDriver;

/// How a batch of search terms is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// One term at a time in the single existing tab.
    Sequential,
    /// Round-robin across one tab per term within the same control loop.
    Tabbed,
}

/// Decide the processing mode for a batch of `term_count` search terms.
///
/// Pre-opened tabs are reused when there are already enough of them.
/// Otherwise one throwaway tab is opened and closed as a capability probe.
pub async fn select_mode(driver: &dyn BrowserDriver, term_count: usize) -> ProcessingMode {
    let open_tabs = match driver.list_tabs().await {
        Ok(tabs) => tabs,
        Err(e) => {
            debug!("tab listing failed, falling back to sequential: {e:#}");
            return ProcessingMode::Sequential;
        }
    };
    if !open_tabs.is_empty() && open_tabs.len() >= term_count {
        info!(
            "reusing {} pre-opened tabs for {} search terms",
            open_tabs.len(),
            term_count
        );
        return ProcessingMode::Tabbed;
    }

    let original = open_tabs.first().cloned();
    match driver.open_tab().await {
        Ok(handle) => {
            let _ = driver.close_tab(&handle).await;
            if let Some(home) = original {
                let _ = driver.switch_tab(&home).await;
            }
            info!("tab probe succeeded, selecting tabbed mode");
            ProcessingMode::Tabbed
        }
        Err(e) => {
            debug!("tab probe failed, selecting sequential mode: {e:#}");
            ProcessingMode::Sequential
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TabDriver {
        tabs: Vec<String>,
        can_open: bool,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl BrowserDriver for TabDriver {
        async fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn current_url(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn page_source(&self) -> Result<String> {
            Ok(String::new())
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
            Ok(false)
        }
        async fn execute_script(&self, _js: &str) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn open_tab(&self) -> Result<String> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.can_open {
                Ok("probe".to_string())
            } else {
                anyhow::bail!("tabs unsupported")
            }
        }
        async fn close_tab(&self, _handle: &str) -> Result<()> {
            Ok(())
        }
        async fn switch_tab(&self, _handle: &str) -> Result<()> {
            Ok(())
        }
        async fn list_tabs(&self) -> Result<Vec<String>> {
            Ok(self.tabs.clone())
        }
    }

    #[tokio::test]
    async fn enough_preopened_tabs_skips_the_probe() {
        let driver = TabDriver {
            tabs: vec!["a".into(), "b".into(), "c".into()],
            can_open: false,
            probes: AtomicUsize::new(0),
        };
        assert_eq!(select_mode(&driver, 3).await, ProcessingMode::Tabbed);
        assert_eq!(driver.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn probe_success_selects_tabbed() {
        let driver = TabDriver {
            tabs: vec!["a".into()],
            can_open: true,
            probes: AtomicUsize::new(0),
        };
        assert_eq!(select_mode(&driver, 3).await, ProcessingMode::Tabbed);
        assert_eq!(driver.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn probe_failure_is_a_mode_switch_not_an_error() {
        let driver = TabDriver {
            tabs: vec!["a".into()],
            can_open: false,
            probes: AtomicUsize::new(0),
        };
        assert_eq!(select_mode(&driver, 2).await, ProcessingMode::Sequential);
    }
}
