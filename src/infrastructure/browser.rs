//! WebDriver-backed implementation of [`BrowserDriver`].
//!
//! Attaches to an already-running WebDriver server whose session has been
//! authenticated against the target site by the operator beforehand. Tab
//! handles are exposed as plain strings so the crawl core never depends on
//! fantoccini types.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder, Locator};
use tracing::{debug, info};
use url::Url;

use crate::domain::services::BrowserDriver;

/// Browser session handle over a remote WebDriver endpoint.
pub struct FantocciniDriver {
    client: Client,
}

impl FantocciniDriver {
    /// Attach to the WebDriver server at `webdriver_url`.
    pub async fn connect(webdriver_url: &str) -> Result<Self> {
        info!("connecting to webdriver at {}", webdriver_url);
        let client = ClientBuilder::native()
            .connect(webdriver_url)
            .await
            .with_context(|| format!("failed to connect to webdriver at {webdriver_url}"))?;
        Ok(Self { client })
    }

    /// End the WebDriver session.
    pub async fn close(self) -> Result<()> {
        self.client
            .close()
            .await
            .context("failed to close webdriver session")
    }

    fn parse_handle(handle: &str) -> Result<WindowHandle> {
        WindowHandle::try_from(handle.to_string())
            .map_err(|_| anyhow!("invalid window handle: {handle}"))
    }
}

#[async_trait]
impl BrowserDriver for FantocciniDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("navigating to {}", url);
        self.client
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .client
            .current_url()
            .await
            .context("failed to read current url")?;
        Ok(url.to_string())
    }

    async fn page_source(&self) -> Result<String> {
        self.client
            .source()
            .await
            .context("failed to read page source")
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.client
            .screenshot()
            .await
            .context("failed to capture screenshot")
    }

    async fn scroll(&self) -> Result<()> {
        // Slightly randomized distance so repeated scrolls do not look
        // machine-perfect.
        let fraction = 0.7 + fastrand::f64() * 0.25;
        let js = format!(
            "window.scrollBy(0, Math.floor(window.innerHeight * {fraction:.3})); return true;"
        );
        self.client
            .execute(&js, vec![])
            .await
            .context("scroll script failed")?;
        Ok(())
    }

    async fn find_links(&self, selector: &str) -> Result<Vec<String>> {
        let base = self.current_url().await.ok().and_then(|u| Url::parse(&u).ok());
        let elements = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .with_context(|| format!("link lookup failed for selector {selector}"))?;

        let mut links = Vec::with_capacity(elements.len());
        for element in elements {
            let Some(href) = element.attr("href").await.unwrap_or(None) else {
                continue;
            };
            // Resolve relative hrefs against the page we are on.
            let absolute = match (Url::parse(&href), &base) {
                (Ok(u), _) => u.to_string(),
                (Err(_), Some(base)) => match base.join(&href) {
                    Ok(u) => u.to_string(),
                    Err(_) => continue,
                },
                (Err(_), None) => continue,
            };
            links.push(absolute);
        }
        Ok(links)
    }

    async fn click_matching(&self, selector: &str) -> Result<bool> {
        let mut elements = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .with_context(|| format!("element lookup failed for selector {selector}"))?;
        if elements.is_empty() {
            return Ok(false);
        }
        elements
            .remove(0)
            .click()
            .await
            .with_context(|| format!("click failed for selector {selector}"))?;
        Ok(true)
    }

    async fn execute_script(&self, js: &str) -> Result<serde_json::Value> {
        self.client
            .execute(js, vec![])
            .await
            .context("script execution failed")
    }

    async fn open_tab(&self) -> Result<String> {
        let response = self
            .client
            .new_window(true)
            .await
            .context("failed to open new tab")?;
        Ok(String::from(response.handle))
    }

    async fn close_tab(&self, handle: &str) -> Result<()> {
        let target = Self::parse_handle(handle)?;
        self.client
            .switch_to_window(target)
            .await
            .context("failed to switch to tab before closing")?;
        self.client
            .close_window()
            .await
            .context("failed to close tab")
    }

    async fn switch_tab(&self, handle: &str) -> Result<()> {
        let target = Self::parse_handle(handle)?;
        self.client
            .switch_to_window(target)
            .await
            .with_context(|| format!("failed to switch to tab {handle}"))
    }

    async fn list_tabs(&self) -> Result<Vec<String>> {
        let handles = self
            .client
            .windows()
            .await
            .context("failed to list tabs")?;
        Ok(handles.into_iter().map(String::from).collect())
    }
}
