// Memoizes resolved pages. Editor-view entries are time-independent and live
// until an invalidation removes them; published-view entries are tagged with
// the TTL-sized time bucket of the instant they were resolved for, so a
// request about a different instant never reuses them across a publish or
// expiry boundary.
//
// Invalidation failures are logged and swallowed: the next resolution
// re-computes from the store, so staleness self-heals.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::AppResult;
use crate::infrastructure::cache::Cache;
use crate::infrastructure::store::PageStore;
use crate::models::{PageId, ResolveView, ResolvedPage};

struct Entry {
    resolved: Arc<ResolvedPage>,
    inserted_at: Instant,
}

/// Both views of one page. Published entries remember the time bucket of the
/// `now` they were computed for; a lookup for another bucket is a miss.
#[derive(Default)]
struct PageEntry {
    latest: Option<Entry>,
    published: Option<(i64, Entry)>,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

pub struct TreeCache {
    store: Arc<dyn PageStore>,
    entries: Mutex<Cache<PageId, PageEntry>>,
    published_ttl: Duration,
    // Bumped on every invalidation; a compute that started before the bump
    // must not cache its result.
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl TreeCache {
    pub fn new(store: Arc<dyn PageStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            entries: Mutex::new(Cache::new(config.capacity)),
            published_ttl: Duration::from_secs(config.published_ttl_secs),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    fn time_bucket(&self, now: DateTime<Utc>) -> i64 {
        let width = (self.published_ttl.as_millis().max(1)) as i64;
        now.timestamp_millis().div_euclid(width)
    }

    /// Cached resolution for `(page_id, view)` at the instant `now`,
    /// computing and storing it on miss. Published-view hits require the
    /// entry's time bucket to match `now` and the entry to be inside its
    /// TTL; editor-view entries are valid until invalidated.
    pub async fn get_or_compute<F, Fut>(
        &self,
        page_id: PageId,
        view: ResolveView,
        now: DateTime<Utc>,
        compute: F,
    ) -> AppResult<Arc<ResolvedPage>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = AppResult<ResolvedPage>>,
    {
        let bucket = self.time_bucket(now);
        {
            let mut entries = self.entries.lock().await;
            if let Some(page_entry) = entries.get(&page_id) {
                let hit = match view {
                    ResolveView::Latest => page_entry.latest.as_ref(),
                    ResolveView::PublishedNow => {
                        page_entry.published.as_ref().and_then(|(b, entry)| {
                            (*b == bucket && entry.inserted_at.elapsed() < self.published_ttl)
                                .then_some(entry)
                        })
                    }
                };
                if let Some(entry) = hit {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Arc::clone(&entry.resolved));
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let generation = self.generation.load(Ordering::Acquire);
        let resolved = Arc::new(compute().await?);

        let mut entries = self.entries.lock().await;
        // If an invalidation ran while we were computing, what we read may
        // predate the mutation; hand it back uncached.
        if self.generation.load(Ordering::Acquire) == generation {
            let mut page_entry = entries.remove(&page_id).unwrap_or_default();
            let entry = Entry {
                resolved: Arc::clone(&resolved),
                inserted_at: Instant::now(),
            };
            match view {
                ResolveView::Latest => page_entry.latest = Some(entry),
                ResolveView::PublishedNow => page_entry.published = Some((bucket, entry)),
            }
            entries.insert(page_id, page_entry);
        }
        Ok(resolved)
    }

    async fn remove_all(&self, page_ids: &[PageId]) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut entries = self.entries.lock().await;
        for &id in page_ids {
            if entries.remove(&id).is_some() {
                self.invalidations.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub async fn invalidate_page(&self, page_id: PageId) {
        self.remove_all(&[page_id]).await;
        debug!(page_id, "invalidated cached resolution");
    }

    /// Drop the page and every descendant. Descendants inherit from this
    /// page, so any mutation here can change their resolved state.
    pub async fn invalidate_subtree(&self, page_id: PageId) {
        match self.collect_descendants(page_id).await {
            Ok(ids) => {
                debug!(page_id, count = ids.len(), "invalidating subtree");
                self.remove_all(&ids).await;
            }
            Err(e) => {
                // Next resolution re-computes anyway; the write must not fail.
                warn!(page_id, error = %e, "subtree invalidation walk failed, clearing whole cache");
                self.clear().await;
            }
        }
    }

    /// Drop ancestors and descendants both; used on delete and reparent,
    /// where the old and new neighborhoods both change.
    pub async fn invalidate_hierarchy(&self, page_id: PageId) {
        let mut ids = match self.collect_descendants(page_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(page_id, error = %e, "hierarchy invalidation walk failed, clearing whole cache");
                self.clear().await;
                return;
            }
        };
        match self.collect_ancestors(page_id).await {
            Ok(ancestors) => ids.extend(ancestors),
            Err(e) => {
                warn!(page_id, error = %e, "ancestor invalidation walk failed, clearing whole cache");
                self.clear().await;
                return;
            }
        }
        self.remove_all(&ids).await;
    }

    pub async fn clear(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Number of pages with a live entry, for tests and diagnostics.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    // Breadth-first walk over children, visited-set guarded. Includes the
    // starting page and soft-deleted nodes: a stale entry for a hidden page
    // is still a stale entry.
    async fn collect_descendants(&self, page_id: PageId) -> AppResult<Vec<PageId>> {
        let mut out = vec![page_id];
        let mut visited: HashSet<PageId> = HashSet::from([page_id]);
        let mut queue = vec![page_id];
        while let Some(current) = queue.pop() {
            for child in self.store.children(Some(current), true).await? {
                if visited.insert(child.id) {
                    out.push(child.id);
                    queue.push(child.id);
                }
            }
        }
        Ok(out)
    }

    async fn collect_ancestors(&self, page_id: PageId) -> AppResult<Vec<PageId>> {
        let mut out = Vec::new();
        let mut visited: HashSet<PageId> = HashSet::from([page_id]);
        let mut current = self.store.get_page(page_id).await?.and_then(|p| p.parent_id);
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            out.push(id);
            current = self.store.get_page(id).await?.and_then(|p| p.parent_id);
        }
        Ok(out)
    }
}
