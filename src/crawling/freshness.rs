//! Freshness cache: canonical URL -> last-processed timestamp.
//!
//! The cache is a performance optimization, never the source of truth; it can
//! be rebuilt at any time from the listing store. Lookups never touch the
//! store. Bulk refresh runs at most once per refresh interval and replaces
//! the whole map in one swap so readers never observe a partial rebuild.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::services::ListingStore;
use crate::infrastructure::config::FreshnessConfig;

/// TTL-gated map of canonical URLs to their last successful processing time.
pub struct FreshnessCache {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
    last_refresh: Mutex<Option<Instant>>,
    /// Set by a lookup miss before the first refresh has happened, making the
    /// next `refresh_if_due` call eligible immediately.
    refresh_wanted: AtomicBool,
    refreshed_once: AtomicBool,
    ttl: ChronoDuration,
    refresh_interval: Duration,
}

impl FreshnessCache {
    pub fn new(config: &FreshnessConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            last_refresh: Mutex::new(None),
            refresh_wanted: AtomicBool::new(false),
            refreshed_once: AtomicBool::new(false),
            ttl: ChronoDuration::days(config.ttl_days),
            refresh_interval: Duration::from_secs(config.refresh_interval_secs),
        }
    }

    /// True when the URL has never been seen or its entry has aged past the
    /// TTL as of `now`.
    pub async fn should_process_at(&self, canonical: &str, now: DateTime<Utc>) -> bool {
        let entries = self.entries.read().await;
        match entries.get(canonical) {
            Some(&last) => now - last >= self.ttl,
            None => {
                if !self.refreshed_once.load(Ordering::Acquire) {
                    self.refresh_wanted.store(true, Ordering::Release);
                }
                true
            }
        }
    }

    pub async fn should_process(&self, canonical: &str) -> bool {
        self.should_process_at(canonical, Utc::now()).await
    }

    /// Record a successful processing of the URL. At most one entry per
    /// canonical URL; repeats update in place.
    pub async fn mark_processed(&self, canonical: &str, at: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        entries.insert(canonical.to_string(), at);
    }

    pub async fn latest_entry(&self, canonical: &str) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(canonical).copied()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Bulk-reload the cache from the store when the refresh interval has
    /// elapsed (or a pre-refresh miss requested one). Returns whether a
    /// refresh was attempted. On store failure the previous contents are kept
    /// and the interval timer still advances, so a failing store cannot cause
    /// a retry storm.
    pub async fn refresh_if_due(&self, store: &dyn ListingStore) -> bool {
        let mut last_refresh = self.last_refresh.lock().await;
        let due = match *last_refresh {
            None => true,
            Some(at) => {
                at.elapsed() >= self.refresh_interval || self.refresh_wanted.load(Ordering::Acquire)
            }
        };
        if !due {
            return false;
        }

        // Advance the timer before the store call, success or not.
        *last_refresh = Some(Instant::now());
        self.refresh_wanted.store(false, Ordering::Release);
        drop(last_refresh);

        match store.bulk_read().await {
            Ok(rows) => {
                let mut fresh: HashMap<String, DateTime<Utc>> = HashMap::new();
                for stored in rows {
                    let entry = fresh
                        .entry(stored.row.url.clone())
                        .or_insert(stored.row.processed_at);
                    if stored.row.processed_at > *entry {
                        *entry = stored.row.processed_at;
                    }
                }
                let count = fresh.len();
                *self.entries.write().await = fresh;
                self.refreshed_once.store(true, Ordering::Release);
                info!("freshness cache refreshed with {} entries", count);
            }
            Err(e) => {
                warn!("freshness refresh failed, keeping previous contents: {e:#}");
                debug!("next refresh in {:?}", self.refresh_interval);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::ListingRecordGroup;
    use crate::infrastructure::memory_store::MemoryStore;

    fn cache_with_ttl(ttl_days: i64) -> FreshnessCache {
        FreshnessCache::new(&FreshnessConfig {
            ttl_days,
            refresh_interval_secs: 3_600,
        })
    }

    #[tokio::test]
    async fn unseen_url_is_processed() {
        let cache = cache_with_ttl(7);
        assert!(cache.should_process("https://x/item/1").await);
    }

    #[tokio::test]
    async fn gate_opens_exactly_at_ttl() {
        let cache = cache_with_ttl(7);
        let t0 = Utc::now();
        cache.mark_processed("https://x/item/1", t0).await;

        assert!(!cache.should_process_at("https://x/item/1", t0 + ChronoDuration::days(6)).await);
        assert!(cache.should_process_at("https://x/item/1", t0 + ChronoDuration::days(7)).await);
    }

    #[tokio::test]
    async fn mark_processed_updates_in_place() {
        let cache = cache_with_ttl(7);
        let t0 = Utc::now();
        cache.mark_processed("https://x/item/1", t0).await;
        cache.mark_processed("https://x/item/1", t0 + ChronoDuration::days(1)).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(
            cache.latest_entry("https://x/item/1").await,
            Some(t0 + ChronoDuration::days(1))
        );
    }

    #[tokio::test]
    async fn refresh_loads_latest_timestamp_per_url() {
        let store = MemoryStore::new();
        let old = Utc::now() - ChronoDuration::days(10);
        let newer = Utc::now() - ChronoDuration::days(2);
        let mut rows = ListingRecordGroup::failed("https://x/item/1", "t").to_rows(old);
        rows.extend(ListingRecordGroup::failed("https://x/item/1", "t").to_rows(newer));
        store.seed(rows);

        let cache = cache_with_ttl(7);
        assert!(cache.refresh_if_due(&store).await);
        assert_eq!(cache.latest_entry("https://x/item/1").await, Some(newer));
        assert!(!cache.should_process("https://x/item/1").await);
    }

    #[tokio::test]
    async fn refresh_is_interval_gated() {
        let store = MemoryStore::new();
        let cache = cache_with_ttl(7);
        assert!(cache.refresh_if_due(&store).await);
        assert!(!cache.refresh_if_due(&store).await);
    }

    #[tokio::test]
    async fn miss_after_failed_refresh_requests_an_early_retry() {
        use crate::domain::listing::{ListingRow, StoredRow};
        use crate::domain::services::ListingStore;

        struct FailingStore;

        #[async_trait::async_trait]
        impl ListingStore for FailingStore {
            async fn find_rows_by_key(&self, _url: &str) -> anyhow::Result<Vec<StoredRow>> {
                Ok(vec![])
            }
            async fn delete_rows(&self, _indices: &[u64]) -> anyhow::Result<()> {
                Ok(())
            }
            async fn append_rows(&self, _rows: &[ListingRow]) -> anyhow::Result<()> {
                Ok(())
            }
            async fn bulk_read(&self) -> anyhow::Result<Vec<StoredRow>> {
                anyhow::bail!("store offline")
            }
        }

        let cache = cache_with_ttl(7);
        // First refresh fails but advances the interval timer.
        assert!(cache.refresh_if_due(&FailingStore).await);
        assert!(!cache.refresh_if_due(&FailingStore).await);
        // A miss on the never-populated cache re-arms an early refresh.
        assert!(cache.should_process("https://x/item/9").await);
        assert!(cache.refresh_if_due(&FailingStore).await);
    }

    #[tokio::test]
    async fn successful_refresh_disarms_early_retries() {
        let store = MemoryStore::new();
        let cache = cache_with_ttl(7);
        assert!(cache.refresh_if_due(&store).await);
        // Misses after a completed refresh genuinely mean "never seen" and
        // must not bypass the interval gate.
        assert!(cache.should_process("https://x/item/9").await);
        assert!(!cache.refresh_if_due(&store).await);
    }
}
