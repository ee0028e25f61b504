//! Read and write options.

use crate::compression::CompressionSettings;

/// Default number of elements a sink reserves per page.
pub const DEFAULT_ELEMENTS_PER_PAGE: usize = 10_000;

/// Default number of entries after which a writer commits a cluster.
pub const DEFAULT_ENTRIES_PER_CLUSTER: u64 = 64_000;

/// Default number of unreferenced pages a source keeps cached.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Options for writing an nTuple.
#[derive(Clone, Copy, Debug)]
pub struct WriteOptions {
    compression: CompressionSettings,
    elements_per_page: usize,
    entries_per_cluster: u64,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self {
            compression: CompressionSettings::default(),
            elements_per_page: DEFAULT_ELEMENTS_PER_PAGE,
            entries_per_cluster: DEFAULT_ENTRIES_PER_CLUSTER,
        }
    }

    /// Sets the compression used for pages, header and footer.
    pub fn compression(mut self, settings: CompressionSettings) -> Self {
        self.compression = settings;
        self
    }

    /// Sets the page capacity in elements.
    pub fn elements_per_page(mut self, n: usize) -> Self {
        self.elements_per_page = n.max(1);
        self
    }

    /// Sets the number of entries per cluster.
    pub fn entries_per_cluster(mut self, n: u64) -> Self {
        self.entries_per_cluster = n.max(1);
        self
    }

    #[inline]
    pub fn get_compression(&self) -> CompressionSettings {
        self.compression
    }

    #[inline]
    pub fn get_elements_per_page(&self) -> usize {
        self.elements_per_page
    }

    #[inline]
    pub fn get_entries_per_cluster(&self) -> u64 {
        self.entries_per_cluster
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a source reads whole clusters at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterCache {
    /// Each page is read on its own.
    Off,
    /// Pages of all active columns in a cluster are fetched in one vectored read.
    On,
}

/// Options for reading an nTuple.
#[derive(Clone, Copy, Debug)]
pub struct ReadOptions {
    cluster_cache: ClusterCache,
    page_pool_capacity: usize,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self {
            cluster_cache: ClusterCache::On,
            page_pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }

    pub fn cluster_cache(mut self, mode: ClusterCache) -> Self {
        self.cluster_cache = mode;
        self
    }

    /// Sets how many unreferenced pages the pool retains.
    pub fn page_pool_capacity(mut self, n: usize) -> Self {
        self.page_pool_capacity = n;
        self
    }

    #[inline]
    pub fn get_cluster_cache(&self) -> ClusterCache {
        self.cluster_cache
    }

    #[inline]
    pub fn get_page_pool_capacity(&self) -> usize {
        self.page_pool_capacity
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_options_builder() {
        let opts = WriteOptions::new()
            .compression(CompressionSettings::ZSTD)
            .elements_per_page(0)
            .entries_per_cluster(100);
        assert_eq!(opts.get_compression(), CompressionSettings::ZSTD);
        assert_eq!(opts.get_elements_per_page(), 1);
        assert_eq!(opts.get_entries_per_cluster(), 100);
    }

    #[test]
    fn test_read_options_defaults() {
        let opts = ReadOptions::default();
        assert_eq!(opts.get_cluster_cache(), ClusterCache::On);
        assert_eq!(opts.get_page_pool_capacity(), DEFAULT_POOL_CAPACITY);
    }
}
