//! Persistence upsert engine.
//!
//! The store has no multi-row transaction, so replace-all-rows-for-a-URL is
//! composed as read indices, delete, append. A crash between delete and
//! append leaves the URL temporarily absent from the sheet; that is
//! acceptable because the next cycle simply reprocesses it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::listing::ListingRecordGroup;
use crate::domain::services::ListingStore;

pub struct UpsertEngine<'a> {
    store: &'a dyn ListingStore,
}

impl<'a> UpsertEngine<'a> {
    pub fn new(store: &'a dyn ListingStore) -> Self {
        Self { store }
    }

    /// Replace every stored row for the group's URL with the group's rows.
    /// Returns the number of rows written.
    pub async fn replace_listing(
        &self,
        group: &ListingRecordGroup,
        processed_at: DateTime<Utc>,
    ) -> Result<usize> {
        let existing = self.store.find_rows_by_key(&group.url).await?;
        if !existing.is_empty() {
            let indices: Vec<u64> = existing.iter().map(|r| r.index).collect();
            debug!("replacing {} existing rows for {}", indices.len(), group.url);
            self.store.delete_rows(&indices).await?;
        }

        let rows = group.to_rows(processed_at);
        self.store.append_rows(&rows).await?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::ExtractedItem;
    use crate::infrastructure::memory_store::MemoryStore;

    fn group(url: &str, names: &[&str]) -> ListingRecordGroup {
        let mut g = ListingRecordGroup::failed(url, "Pokemon ETB");
        g.extraction_failed = false;
        g.items = names
            .iter()
            .map(|n| ExtractedItem { name: (*n).to_string(), ..ExtractedItem::default() })
            .collect();
        g
    }

    #[tokio::test]
    async fn upsert_replaces_all_rows_for_the_url() {
        let store = MemoryStore::new();
        let engine = UpsertEngine::new(&store);
        let now = Utc::now();

        engine
            .replace_listing(&group("https://x/item/1", &["A", "B", "C"]), now)
            .await
            .expect("first upsert");
        let written = engine
            .replace_listing(&group("https://x/item/1", &["D"]), now)
            .await
            .expect("second upsert");

        assert_eq!(written, 1);
        let rows = store.find_rows_by_key("https://x/item/1").await.expect("find");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row.name, "D");
    }

    #[tokio::test]
    async fn other_urls_are_untouched() {
        let store = MemoryStore::new();
        let engine = UpsertEngine::new(&store);
        let now = Utc::now();

        engine
            .replace_listing(&group("https://x/item/1", &["A"]), now)
            .await
            .expect("upsert 1");
        engine
            .replace_listing(&group("https://x/item/2", &["B", "C"]), now)
            .await
            .expect("upsert 2");
        engine
            .replace_listing(&group("https://x/item/1", &["A2"]), now)
            .await
            .expect("upsert 1 again");

        assert_eq!(store.find_rows_by_key("https://x/item/2").await.unwrap().len(), 2);
        assert_eq!(store.bulk_read().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failed_extraction_still_writes_a_row() {
        let store = MemoryStore::new();
        let engine = UpsertEngine::new(&store);
        let written = engine
            .replace_listing(&ListingRecordGroup::failed("https://x/item/3", "t"), Utc::now())
            .await
            .expect("upsert");
        assert_eq!(written, 1);
        assert!(store.find_rows_by_key("https://x/item/3").await.unwrap()[0]
            .row
            .low_confidence);
    }
}
