//! Service layer trait definitions.
//!
//! These are the seams between the crawl core and its external
//! collaborators: the browser session, the vision classification service,
//! and the tabular listing store. The crawl core only ever talks to these
//! traits, which is what makes the orchestrator testable without a live
//! browser or network.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::listing::{ListingRow, StoredRow};

/// A stateful, already-authenticated browser session.
///
/// The session is not safe for concurrent use: all calls for a given session
/// happen on one logical thread of control at a time, and the orchestrator
/// owns the handle for the duration of a batch. Every call is synchronous
/// from the caller's point of view and may fail on transport errors.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Issue a direct navigation to the given URL.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// URL of the page the active tab currently shows.
    async fn current_url(&self) -> Result<String>;

    /// Raw HTML source of the active tab, used for wall-signature checks.
    async fn page_source(&self) -> Result<String>;

    /// Full-page PNG capture of the active tab.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Trigger one human-like scroll step on the active tab.
    async fn scroll(&self) -> Result<()>;

    /// Collect the absolute `href` of every anchor matching the CSS selector,
    /// in DOM order.
    async fn find_links(&self, selector: &str) -> Result<Vec<String>>;

    /// Invoke the click handler of the first element matching the selector.
    /// Returns false when no such element exists.
    async fn click_matching(&self, selector: &str) -> Result<bool>;

    /// Run a script in the page context and return its JSON result.
    async fn execute_script(&self, js: &str) -> Result<serde_json::Value>;

    /// Open a new tab and return its handle. The active tab is unchanged.
    async fn open_tab(&self) -> Result<String>;

    /// Close the tab with the given handle. The caller is responsible for
    /// switching to a live tab afterwards.
    async fn close_tab(&self, handle: &str) -> Result<()>;

    /// Make the tab with the given handle the active one.
    async fn switch_tab(&self, handle: &str) -> Result<()>;

    /// Handles of all currently open tabs.
    async fn list_tabs(&self) -> Result<Vec<String>>;
}

/// External vision-capable classification service.
///
/// No schema is guaranteed on failure; the response may be prose-wrapped
/// JSON or an error payload, and the extraction adapter must tolerate both.
#[async_trait]
pub trait VisionClassifier: Send + Sync {
    /// Submit a PNG snapshot plus a task instruction; returns the raw
    /// response text.
    async fn classify(&self, snapshot_png: &[u8], instruction: &str) -> Result<String>;
}

/// Spreadsheet-backed listing store.
///
/// The store has no native multi-row transaction; "replace all rows for a
/// URL" is composed by the upsert engine as read-indices, delete, append,
/// and a crash between delete and append is tolerated (the URL is simply
/// reprocessed on the next cycle).
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Rows whose key column equals the canonical URL, with physical indices.
    async fn find_rows_by_key(&self, url: &str) -> Result<Vec<StoredRow>>;

    /// Delete the rows at the given physical indices.
    async fn delete_rows(&self, indices: &[u64]) -> Result<()>;

    /// Append rows at the end of the sheet.
    async fn append_rows(&self, rows: &[ListingRow]) -> Result<()>;

    /// Read the whole sheet; used by the freshness cache bulk refresh.
    async fn bulk_read(&self) -> Result<Vec<StoredRow>>;
}
