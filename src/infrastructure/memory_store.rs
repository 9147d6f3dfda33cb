//! In-memory [`ListingStore`] used for dry runs and tests.
//!
//! Mimics spreadsheet semantics: rows have stable, monotonically increasing
//! physical indices, deletes leave gaps, appends always go at the end.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::domain::listing::{ListingRow, StoredRow};
use crate::domain::services::ListingStore;

#[derive(Default)]
struct Inner {
    rows: BTreeMap<u64, ListingRow>,
    next_index: u64,
}

/// Thread-safe in-memory sheet.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the sheet with pre-existing rows (test setup).
    pub fn seed(&self, rows: Vec<ListingRow>) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        for row in rows {
            let index = inner.next_index;
            inner.rows.insert(index, row);
            inner.next_index += 1;
        }
    }

    /// Snapshot of all live rows in index order.
    pub fn rows(&self) -> Vec<StoredRow> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner
            .rows
            .iter()
            .map(|(&index, row)| StoredRow { index, row: row.clone() })
            .collect()
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn find_rows_by_key(&self, url: &str) -> Result<Vec<StoredRow>> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|stored| stored.row.url == url)
            .collect())
    }

    async fn delete_rows(&self, indices: &[u64]) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        for index in indices {
            inner.rows.remove(index);
        }
        Ok(())
    }

    async fn append_rows(&self, rows: &[ListingRow]) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        for row in rows {
            let index = inner.next_index;
            inner.rows.insert(index, row.clone());
            inner.next_index += 1;
        }
        Ok(())
    }

    async fn bulk_read(&self) -> Result<Vec<StoredRow>> {
        Ok(self.rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::ListingRecordGroup;
    use chrono::Utc;

    fn row(url: &str) -> ListingRow {
        ListingRecordGroup::failed(url, "test")
            .to_rows(Utc::now())
            .remove(0)
    }

    #[tokio::test]
    async fn indices_survive_deletes() {
        let store = MemoryStore::new();
        store.seed(vec![row("https://x/item/1"), row("https://x/item/2")]);
        store.delete_rows(&[0]).await.expect("delete");
        store.append_rows(&[row("https://x/item/3")]).await.expect("append");

        let rows = store.bulk_read().await.expect("read");
        let indices: Vec<u64> = rows.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[tokio::test]
    async fn find_filters_by_url() {
        let store = MemoryStore::new();
        store.seed(vec![row("https://x/item/1"), row("https://x/item/2"), row("https://x/item/1")]);
        let found = store.find_rows_by_key("https://x/item/1").await.expect("find");
        assert_eq!(found.len(), 2);
    }
}
