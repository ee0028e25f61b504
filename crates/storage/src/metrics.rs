//! I/O counters of a page source.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub struct StorageMetrics {
    n_read_v: AtomicU64,
    n_read: AtomicU64,
    sz_read_payload: AtomicU64,
    sz_read_overhead: AtomicU64,
    sz_unzip: AtomicU64,
    n_cluster_loaded: AtomicU64,
    n_page_loaded: AtomicU64,
    n_page_populated: AtomicU64,
}

/// Point-in-time copy of `StorageMetrics`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Vectored read calls.
    pub n_read_v: u64,
    /// Individual reads from the backing store.
    pub n_read: u64,
    /// Bytes read that belong to requested pages.
    pub sz_read_payload: u64,
    /// Bytes read only to bridge gaps between pages.
    pub sz_read_overhead: u64,
    /// Bytes produced by decompression.
    pub sz_unzip: u64,
    pub n_cluster_loaded: u64,
    /// Pages read from the backing store (directly or as part of a cluster).
    pub n_page_loaded: u64,
    /// Pages materialized and registered with the pool.
    pub n_page_populated: u64,
}

impl StorageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_read(&self, n: u64, payload: u64, overhead: u64) {
        self.n_read.fetch_add(n, Ordering::Relaxed);
        self.sz_read_payload.fetch_add(payload, Ordering::Relaxed);
        self.sz_read_overhead.fetch_add(overhead, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_read_v(&self) {
        self.n_read_v.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_unzip(&self, bytes: u64) {
        self.sz_unzip.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_cluster_loaded(&self, pages: u64) {
        self.n_cluster_loaded.fetch_add(1, Ordering::Relaxed);
        self.n_page_loaded.fetch_add(pages, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_page_loaded(&self) {
        self.n_page_loaded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_page_populated(&self) {
        self.n_page_populated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            n_read_v: self.n_read_v.load(Ordering::Relaxed),
            n_read: self.n_read.load(Ordering::Relaxed),
            sz_read_payload: self.sz_read_payload.load(Ordering::Relaxed),
            sz_read_overhead: self.sz_read_overhead.load(Ordering::Relaxed),
            sz_unzip: self.sz_unzip.load(Ordering::Relaxed),
            n_cluster_loaded: self.n_cluster_loaded.load(Ordering::Relaxed),
            n_page_loaded: self.n_page_loaded.load(Ordering::Relaxed),
            n_page_populated: self.n_page_populated.load(Ordering::Relaxed),
        }
    }
}
