//! Page pool.
//!
//! The pool caches populated pages so that repeated requests for the same
//! element do not hit the backing store again. Every `get_*` hit and every
//! registration counts as one reference; `return_page` gives one back. Pages
//! without references stay cached until more than `capacity` of them exist, at
//! which point the least recently used ones are evicted and their deleter runs.
//! A referenced page is never evicted.

use crate::page::{ClusterIndex, ColumnId, Page};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Callback run when the pool lets go of a page.
pub type PageDeleter = Arc<dyn Fn(&Page) + Send + Sync>;

struct PoolEntry {
    page: Page,
    references: usize,
    deleter: PageDeleter,
    last_use: u64,
}

#[derive(Default)]
struct PoolInner {
    entries: Vec<PoolEntry>,
    clock: u64,
}

impl PoolInner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Reference-counted cache of populated pages.
pub struct PagePool {
    inner: Mutex<PoolInner>,
    capacity: usize,
}

impl PagePool {
    /// Creates a pool retaining at most `capacity` unreferenced pages.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            capacity,
        }
    }

    /// Adds a freshly populated page, holding one reference for the caller.
    pub fn register_page(&self, page: &Page, deleter: PageDeleter) {
        let mut inner = self.inner.lock();
        let last_use = inner.tick();
        inner.entries.push(PoolEntry {
            page: page.clone(),
            references: 1,
            deleter,
            last_use,
        });
    }

    /// Looks up the page holding element `global_index` of a column.
    pub fn get_page(&self, column_id: ColumnId, global_index: u64) -> Option<Page> {
        self.acquire(|p| p.column_id() == column_id && p.contains(global_index))
    }

    /// Looks up the page holding a cluster-relative element of a column.
    pub fn get_page_in_cluster(&self, column_id: ColumnId, index: ClusterIndex) -> Option<Page> {
        self.acquire(|p| p.column_id() == column_id && p.contains_cluster_index(index))
    }

    fn acquire(&self, matches: impl Fn(&Page) -> bool) -> Option<Page> {
        let mut inner = self.inner.lock();
        let now = inner.tick();
        let entry = inner.entries.iter_mut().find(|e| matches(&e.page))?;
        entry.references += 1;
        entry.last_use = now;
        Some(entry.page.clone())
    }

    /// Gives back one reference. Returns false if the page is not pooled.
    pub fn return_page(&self, page: &Page) -> bool {
        let evicted = {
            let mut inner = self.inner.lock();
            let entry = match inner.entries.iter_mut().find(|e| e.page.same_buffer(page)) {
                Some(entry) => entry,
                None => return false,
            };
            entry.references = entry.references.saturating_sub(1);
            self.evict(&mut inner)
        };
        for entry in evicted {
            log::debug!(
                "evicting page of column {} at {}",
                entry.page.column_id(),
                entry.page.range_first()
            );
            (entry.deleter)(&entry.page);
        }
        true
    }

    fn evict(&self, inner: &mut PoolInner) -> Vec<PoolEntry> {
        let mut evicted = Vec::new();
        loop {
            let unreferenced = inner.entries.iter().filter(|e| e.references == 0).count();
            if unreferenced <= self.capacity {
                return evicted;
            }
            let oldest = inner
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.references == 0)
                .min_by_key(|(_, e)| e.last_use)
                .map(|(i, _)| i);
            match oldest {
                Some(i) => evicted.push(inner.entries.swap_remove(i)),
                None => return evicted,
            }
        }
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cached pages nobody currently references.
    pub fn n_unreferenced(&self) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.references == 0)
            .count()
    }
}

impl Drop for PagePool {
    fn drop(&mut self) {
        for entry in self.inner.get_mut().entries.drain(..) {
            (entry.deleter)(&entry.page);
        }
    }
}

impl fmt::Debug for PagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagePool")
            .field("pages", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ClusterInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn page(column_id: ColumnId, first: u64, n: usize) -> Page {
        let mut page = Page::from_buffer(column_id, vec![0u8; n], 1, n);
        page.set_window(first, ClusterInfo::new(0, 0));
        page
    }

    fn counting_deleter() -> (PageDeleter, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            Arc::new(move |_: &Page| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    #[test]
    fn test_hit_and_miss() {
        let pool = PagePool::new(4);
        let (deleter, _) = counting_deleter();
        pool.register_page(&page(1, 0, 10), deleter);

        assert!(pool.get_page(1, 5).is_some());
        assert!(pool.get_page(1, 10).is_none());
        assert!(pool.get_page(2, 5).is_none());
        assert!(pool.get_page_in_cluster(1, ClusterIndex::new(0, 9)).is_some());
    }

    #[test]
    fn test_referenced_pages_not_evicted() {
        let pool = PagePool::new(0);
        let (deleter, deleted) = counting_deleter();
        let p = page(1, 0, 10);
        pool.register_page(&p, deleter);
        let again = pool.get_page(1, 3).unwrap();

        assert!(pool.return_page(&p));
        assert_eq!(deleted.load(Ordering::SeqCst), 0);
        assert_eq!(pool.len(), 1);

        assert!(pool.return_page(&again));
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let pool = PagePool::new(2);
        let (deleter, deleted) = counting_deleter();
        let pages: Vec<Page> = (0..3).map(|i| page(1, i * 10, 10)).collect();
        for p in &pages {
            pool.register_page(p, deleter.clone());
        }
        pool.return_page(&pages[0]);
        pool.return_page(&pages[1]);
        // Touch page 0 so page 1 becomes the oldest.
        let touched = pool.get_page(1, 0).unwrap();
        pool.return_page(&touched);
        pool.return_page(&pages[2]);

        assert_eq!(deleted.load(Ordering::SeqCst), 1);
        assert!(pool.get_page(1, 15).is_none());
        assert!(pool.get_page(1, 5).is_some());
        assert!(pool.get_page(1, 25).is_some());
    }

    #[test]
    fn test_return_unknown_page() {
        let pool = PagePool::new(1);
        assert!(!pool.return_page(&page(1, 0, 1)));
    }

    #[test]
    fn test_drop_runs_deleters() {
        let (deleter, deleted) = counting_deleter();
        {
            let pool = PagePool::new(8);
            pool.register_page(&page(1, 0, 1), deleter.clone());
            pool.register_page(&page(2, 0, 1), deleter);
        }
        assert_eq!(deleted.load(Ordering::SeqCst), 2);
    }
}
