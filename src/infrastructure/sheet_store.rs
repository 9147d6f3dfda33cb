//! HTTP webhook client for the spreadsheet-backed listing store.
//!
//! The sheet itself lives behind a small webhook (Apps Script style) that
//! exposes read, delete-by-index and append operations. This client is a
//! thin transport: replace-all-rows semantics are composed one level up by
//! the upsert engine. There is no multi-row transaction here, so a crash
//! between delete and append can leave a URL temporarily absent; the next
//! cycle reprocesses it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::listing::{ListingRow, StoredRow};
use crate::domain::services::ListingStore;
use crate::infrastructure::config::StoreConfig;

/// Webhook-backed [`ListingStore`].
pub struct SheetStore {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    action: &'static str,
    indices: &'a [u64],
}

#[derive(Serialize)]
struct AppendRequest<'a> {
    action: &'static str,
    rows: &'a [ListingRow],
}

impl SheetStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        anyhow::ensure!(!config.webhook_url.is_empty(), "store.webhook_url is empty");
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build store HTTP client")?;
        Ok(Self {
            http,
            base_url: config.webhook_url.trim_end_matches('/').to_string(),
        })
    }

    async fn read_rows(&self, query: &str) -> Result<Vec<StoredRow>> {
        let url = format!("{}?{}", self.base_url, query);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("store read failed: {query}"))?;
        if !response.status().is_success() {
            anyhow::bail!("store read returned status {}", response.status());
        }
        response
            .json::<Vec<StoredRow>>()
            .await
            .context("store read returned malformed rows")
    }

    async fn post<T: Serialize>(&self, body: &T, action: &str) -> Result<()> {
        let response = self
            .http
            .post(&self.base_url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("store {action} request failed"))?;
        if !response.status().is_success() {
            anyhow::bail!("store {action} returned status {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl ListingStore for SheetStore {
    async fn find_rows_by_key(&self, url: &str) -> Result<Vec<StoredRow>> {
        let encoded = url.replace('&', "%26").replace('#', "%23").replace('?', "%3F");
        self.read_rows(&format!("action=find&url={encoded}")).await
    }

    async fn delete_rows(&self, indices: &[u64]) -> Result<()> {
        if indices.is_empty() {
            return Ok(());
        }
        debug!("deleting {} store rows", indices.len());
        self.post(&DeleteRequest { action: "delete", indices }, "delete")
            .await
    }

    async fn append_rows(&self, rows: &[ListingRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!("appending {} store rows", rows.len());
        self.post(&AppendRequest { action: "append", rows }, "append")
            .await
    }

    async fn bulk_read(&self) -> Result<Vec<StoredRow>> {
        self.read_rows("action=bulk_read").await
    }
}
