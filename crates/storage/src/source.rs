//! Page sources: the read half of the storage engine.
//!
//! A source is attached once (anchor, header, footer) and from then on hands
//! out pages on demand. Populated pages are registered with the source's page
//! pool; callers give them back with `release_page`. A source may be shared by
//! reference, but concurrent consumers should each use their own
//! `clone_source` so they never contend on one file handle.

use crate::cluster::{Cluster, OnDiskPageKey, ReadPlan};
use crate::compression;
use crate::descriptor::{ClusterDescriptor, NTupleDescriptor};
use crate::element;
use crate::metrics::StorageMetrics;
use crate::options::{ClusterCache, ReadOptions};
use crate::page::{ClusterIndex, ClusterInfo, ClusterId, ColumnId, HeapPageAllocator, Page, PageAllocator};
use crate::pool::{PageDeleter, PagePool};
use crate::raw_file::{LocalFile, RawFile};
use crate::serialize::{self, Anchor, ANCHOR_SIZE, MAGIC};
use hashbrown::HashSet;
use parking_lot::Mutex;
use quiver_core::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Provides the pages of an attached nTuple.
pub trait PageSource: Send + Sync {
    /// The immutable descriptor read at attach time.
    fn descriptor(&self) -> &NTupleDescriptor;

    /// Returns the page holding element `global_index` of a column.
    fn populate_page(&self, column_id: ColumnId, global_index: u64) -> Result<Page>;

    /// Returns the page holding a cluster-relative element of a column.
    fn populate_page_in_cluster(&self, column_id: ColumnId, index: ClusterIndex) -> Result<Page>;

    /// Hands a populated page back to the pool.
    fn release_page(&self, page: Page);

    /// Reads all pages of `columns` in a cluster.
    fn load_cluster(&self, cluster_id: ClusterId, columns: &[ColumnId]) -> Result<Arc<Cluster>>;

    /// Opens an independent source on the same data.
    fn clone_source(&self) -> Result<Box<dyn PageSource>>;

    /// Marks a column as read, so cluster loads include it.
    fn add_column(&self, column_id: ColumnId);

    /// Removes a column from the set of read columns.
    fn drop_column(&self, column_id: ColumnId);

    /// I/O counters.
    fn metrics(&self) -> &StorageMetrics;
}

/// Source reading the container written by `FilePageSink`.
pub struct FilePageSource {
    file: Box<dyn RawFile>,
    options: ReadOptions,
    descriptor: NTupleDescriptor,
    allocator: Arc<HeapPageAllocator>,
    pool: PagePool,
    metrics: StorageMetrics,
    current_cluster: Mutex<Option<Arc<Cluster>>>,
    active_columns: Mutex<HashSet<ColumnId>>,
}

impl FilePageSource {
    /// Opens and attaches a local file.
    pub fn open(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        Self::attach(Box::new(LocalFile::open(path)?), options)
    }

    /// Reads anchor, header and footer and builds the descriptor.
    pub fn attach(file: Box<dyn RawFile>, options: ReadOptions) -> Result<Self> {
        let metrics = StorageMetrics::new();
        let size = file.size()?;
        if size < (MAGIC.len() + ANCHOR_SIZE) as u64 {
            return Err(Error::corrupt("file", format!("{} is too small", file.url())));
        }
        let mut magic = [0u8; 8];
        file.read_at(&mut magic, 0)?;
        if &magic != MAGIC {
            return Err(Error::corrupt("file", format!("{} is not a quiver nTuple", file.url())));
        }
        let mut anchor = vec![0u8; ANCHOR_SIZE];
        file.read_at(&mut anchor, size - ANCHOR_SIZE as u64)?;
        let anchor = Anchor::from_bytes(&anchor)?;

        let header = read_envelope(
            file.as_ref(),
            &metrics,
            anchor.seek_header,
            anchor.nbytes_header,
            anchor.len_header,
        )?;
        let mut builder = serialize::deserialize_header(&header)?;
        let footer = read_envelope(
            file.as_ref(),
            &metrics,
            anchor.seek_footer,
            anchor.nbytes_footer,
            anchor.len_footer,
        )?;
        serialize::deserialize_footer(&footer, &mut builder)?;
        let descriptor = builder.build();

        log::debug!(
            "attached {}: {} entries in {} clusters",
            file.url(),
            descriptor.n_entries(),
            descriptor.clusters().len()
        );
        Ok(Self::from_parts(file, options, descriptor, metrics))
    }

    fn from_parts(
        file: Box<dyn RawFile>,
        options: ReadOptions,
        descriptor: NTupleDescriptor,
        metrics: StorageMetrics,
    ) -> Self {
        Self {
            file,
            pool: PagePool::new(options.get_page_pool_capacity()),
            options,
            descriptor,
            allocator: Arc::new(HeapPageAllocator::new()),
            metrics,
            current_cluster: Mutex::new(None),
            active_columns: Mutex::new(HashSet::new()),
        }
    }

    /// The allocator owning populated pages.
    pub fn allocator(&self) -> &HeapPageAllocator {
        &self.allocator
    }

    /// The page pool.
    pub fn pool(&self) -> &PagePool {
        &self.pool
    }

    fn cluster(&self, cluster_id: ClusterId) -> Result<&ClusterDescriptor> {
        self.descriptor
            .cluster(cluster_id)
            .ok_or_else(|| Error::invalid_operation(format!("no cluster {}", cluster_id)))
    }

    fn cached_cluster(&self, cluster_id: ClusterId, column_id: ColumnId) -> Result<Arc<Cluster>> {
        let mut current = self.current_cluster.lock();
        if let Some(cluster) = current.as_ref() {
            if cluster.id() == cluster_id && cluster.contains_column(column_id) {
                return Ok(cluster.clone());
            }
        }
        let columns: Vec<ColumnId> = {
            let mut active = self.active_columns.lock();
            active.insert(column_id);
            active.iter().copied().collect()
        };
        let cluster = self.load_cluster(cluster_id, &columns)?;
        *current = Some(cluster.clone());
        Ok(cluster)
    }

    fn populate_from_cluster(
        &self,
        column_id: ColumnId,
        cluster: &ClusterDescriptor,
        index_in_cluster: u64,
    ) -> Result<Page> {
        let column = self
            .descriptor
            .column(column_id)
            .ok_or_else(|| Error::invalid_operation(format!("unknown column {}", column_id)))?;
        let element = column.element_type;
        let range = cluster.column_range(column_id).ok_or_else(|| {
            Error::corrupt("footer", format!("cluster {} lacks column {}", cluster.id(), column_id))
        })?;
        let location = cluster
            .page_range(column_id)
            .and_then(|pages| pages.find(index_in_cluster))
            .ok_or_else(|| {
                Error::invalid_operation(format!(
                    "element {} of column {} is not in cluster {}",
                    index_in_cluster,
                    column_id,
                    cluster.id()
                ))
            })?;
        let n = location.info.n_elements as usize;
        let packed_len = element.packed_len(n);

        let unpacked = match self.options.get_cluster_cache() {
            ClusterCache::On => {
                let loaded = self.cached_cluster(cluster.id(), column_id)?;
                let key = OnDiskPageKey::new(column_id, location.page_no);
                let stored = loaded.page(key).ok_or_else(|| {
                    Error::corrupt("cluster", format!("page {:?} missing after load", key))
                })?;
                self.decode(element, stored, packed_len, n)?
            }
            ClusterCache::Off => {
                let mut stored = vec![0u8; location.info.locator.bytes_on_storage as usize];
                self.file.read_at(&mut stored, location.info.locator.position)?;
                self.metrics.add_read(1, stored.len() as u64, 0);
                self.metrics.add_page_loaded();
                self.decode(element, &stored, packed_len, n)?
            }
        };

        let mut page = self
            .allocator
            .adopt_page(column_id, unpacked, element.size(), n);
        page.set_window(
            range.first_element_index + location.first_in_cluster,
            ClusterInfo::new(cluster.id(), range.first_element_index),
        );
        let allocator = self.allocator.clone();
        let deleter: PageDeleter = Arc::new(move |p: &Page| allocator.delete_page(p));
        self.pool.register_page(&page, deleter);
        self.metrics.add_page_populated();
        Ok(page)
    }

    fn decode(
        &self,
        element: quiver_core::ElementType,
        stored: &[u8],
        packed_len: usize,
        n: usize,
    ) -> Result<Vec<u8>> {
        let packed = compression::unzip(stored, packed_len)?;
        if stored.len() != packed_len {
            self.metrics.add_unzip(packed_len as u64);
        }
        Ok(element::unpack(element, &packed, n))
    }
}

fn read_envelope(
    file: &dyn RawFile,
    metrics: &StorageMetrics,
    position: u64,
    nbytes: u32,
    len: u32,
) -> Result<Vec<u8>> {
    let mut stored = vec![0u8; nbytes as usize];
    file.read_at(&mut stored, position)?;
    metrics.add_read(1, nbytes as u64, 0);
    let bytes = compression::unzip(&stored, len as usize)?;
    if nbytes != len {
        metrics.add_unzip(len as u64);
    }
    Ok(bytes.into_owned())
}

impl PageSource for FilePageSource {
    fn descriptor(&self) -> &NTupleDescriptor {
        &self.descriptor
    }

    fn populate_page(&self, column_id: ColumnId, global_index: u64) -> Result<Page> {
        if let Some(page) = self.pool.get_page(column_id, global_index) {
            return Ok(page);
        }
        let cluster_id = self
            .descriptor
            .find_cluster_id(column_id, global_index)
            .ok_or_else(|| {
                Error::invalid_operation(format!(
                    "element {} of column {} is out of range",
                    global_index, column_id
                ))
            })?;
        let cluster = self.cluster(cluster_id)?;
        let first = cluster
            .column_range(column_id)
            .map(|r| r.first_element_index)
            .unwrap_or(0);
        self.populate_from_cluster(column_id, cluster, global_index - first)
    }

    fn populate_page_in_cluster(&self, column_id: ColumnId, index: ClusterIndex) -> Result<Page> {
        if let Some(page) = self.pool.get_page_in_cluster(column_id, index) {
            return Ok(page);
        }
        let cluster = self.cluster(index.cluster_id)?;
        self.populate_from_cluster(column_id, cluster, index.index)
    }

    fn release_page(&self, page: Page) {
        if !self.pool.return_page(&page) {
            log::warn!(
                "released page of column {} that the pool does not know",
                page.column_id()
            );
        }
    }

    fn load_cluster(&self, cluster_id: ClusterId, columns: &[ColumnId]) -> Result<Arc<Cluster>> {
        let cluster = self.cluster(cluster_id)?;
        let mut on_disk = Vec::new();
        for &column_id in columns {
            if let Some(pages) = cluster.page_range(column_id) {
                for (page_no, info) in pages.page_infos().iter().enumerate() {
                    on_disk.push((OnDiskPageKey::new(column_id, page_no), info.locator));
                }
            }
        }
        let mut plan = ReadPlan::new(cluster_id, columns.iter().copied(), on_disk);
        self.file.read_v(plan.requests_mut())?;
        self.metrics.add_read_v();
        self.metrics.add_read(
            plan.n_requests() as u64,
            plan.payload(),
            plan.total_read() - plan.payload(),
        );
        self.metrics.add_cluster_loaded(plan.n_pages() as u64);
        log::debug!(
            "loaded cluster {} ({} pages, {} requests)",
            cluster_id,
            plan.n_pages(),
            plan.n_requests()
        );
        Ok(Arc::new(plan.into_cluster()))
    }

    fn clone_source(&self) -> Result<Box<dyn PageSource>> {
        let clone = Self::from_parts(
            self.file.try_clone()?,
            self.options,
            self.descriptor.clone(),
            StorageMetrics::new(),
        );
        *clone.active_columns.lock() = self.active_columns.lock().clone();
        Ok(Box::new(clone))
    }

    fn add_column(&self, column_id: ColumnId) {
        self.active_columns.lock().insert(column_id);
    }

    fn drop_column(&self, column_id: ColumnId) {
        self.active_columns.lock().remove(&column_id);
    }

    fn metrics(&self) -> &StorageMetrics {
        &self.metrics
    }
}
