//! Pages and page allocation.
//!
//! A page holds a contiguous run of one column's elements in their in-memory
//! little-endian representation, tagged with the window it covers: the global
//! index of its first element and the cluster it belongs to.

use quiver_core::Element;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Identifier of a physical column in a descriptor.
pub type ColumnId = u64;

/// Identifier of a cluster in a descriptor.
pub type ClusterId = u64;

/// An element index relative to the start of a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClusterIndex {
    pub cluster_id: ClusterId,
    pub index: u64,
}

impl ClusterIndex {
    pub fn new(cluster_id: ClusterId, index: u64) -> Self {
        Self { cluster_id, index }
    }
}

/// Cluster membership of a page: the cluster id and the global index of the
/// cluster's first element in this column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    id: ClusterId,
    index_offset: u64,
}

impl ClusterInfo {
    pub fn new(id: ClusterId, index_offset: u64) -> Self {
        Self { id, index_offset }
    }

    #[inline]
    pub fn id(&self) -> ClusterId {
        self.id
    }

    #[inline]
    pub fn index_offset(&self) -> u64 {
        self.index_offset
    }
}

/// A buffer of elements of one column.
///
/// Cloning a page is cheap and shares the buffer. Elements can only be appended
/// while the buffer is not shared.
#[derive(Clone, Debug)]
pub struct Page {
    column_id: ColumnId,
    buffer: Arc<Vec<u8>>,
    element_size: usize,
    n_elements: usize,
    capacity: usize,
    range_first: u64,
    cluster_info: ClusterInfo,
}

impl Page {
    /// Creates an empty page with room for `capacity` elements.
    pub fn new(column_id: ColumnId, element_size: usize, capacity: usize) -> Self {
        Self {
            column_id,
            buffer: Arc::new(vec![0u8; element_size * capacity]),
            element_size,
            n_elements: 0,
            capacity,
            range_first: 0,
            cluster_info: ClusterInfo::default(),
        }
    }

    /// Wraps a filled buffer of `n_elements` elements.
    pub fn from_buffer(
        column_id: ColumnId,
        buffer: Vec<u8>,
        element_size: usize,
        n_elements: usize,
    ) -> Self {
        debug_assert!(buffer.len() >= element_size * n_elements);
        Self {
            column_id,
            buffer: Arc::new(buffer),
            element_size,
            n_elements,
            capacity: n_elements,
            range_first: 0,
            cluster_info: ClusterInfo::default(),
        }
    }

    #[inline]
    pub fn column_id(&self) -> ColumnId {
        self.column_id
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    #[inline]
    pub fn n_elements(&self) -> usize {
        self.n_elements
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_elements == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.n_elements >= self.capacity
    }

    /// Global index of the first element.
    #[inline]
    pub fn range_first(&self) -> u64 {
        self.range_first
    }

    #[inline]
    pub fn cluster_info(&self) -> ClusterInfo {
        self.cluster_info
    }

    /// Size of the page buffer in bytes.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// The bytes of the filled elements.
    #[inline]
    pub fn element_bytes(&self) -> &[u8] {
        &self.buffer[..self.n_elements * self.element_size]
    }

    /// Sets the global window of the page.
    pub fn set_window(&mut self, range_first: u64, cluster_info: ClusterInfo) {
        self.range_first = range_first;
        self.cluster_info = cluster_info;
    }

    /// Returns true if `global_index` falls inside the page's window.
    #[inline]
    pub fn contains(&self, global_index: u64) -> bool {
        global_index >= self.range_first && global_index < self.range_first + self.n_elements as u64
    }

    /// Returns true if the cluster-relative index falls inside the page's window.
    pub fn contains_cluster_index(&self, index: ClusterIndex) -> bool {
        if self.cluster_info.id != index.cluster_id {
            return false;
        }
        let first = self.range_first - self.cluster_info.index_offset;
        index.index >= first && index.index < first + self.n_elements as u64
    }

    /// Reads the element at position `i` within the page.
    #[inline]
    pub fn get<T: Element>(&self, i: usize) -> Option<T> {
        if i >= self.n_elements {
            return None;
        }
        let start = i * self.element_size;
        Some(T::read_le(&self.buffer[start..start + self.element_size]))
    }

    /// Reads the element with the given global index.
    #[inline]
    pub fn get_global<T: Element>(&self, global_index: u64) -> Option<T> {
        if !self.contains(global_index) {
            return None;
        }
        self.get((global_index - self.range_first) as usize)
    }

    /// Appends one element through `write`, which receives the element's bytes.
    ///
    /// Returns false if the page is full or its buffer is shared.
    pub fn push_with(&mut self, write: impl FnOnce(&mut [u8])) -> bool {
        if self.is_full() {
            return false;
        }
        let start = self.n_elements * self.element_size;
        let size = self.element_size;
        match Arc::get_mut(&mut self.buffer) {
            Some(buffer) => {
                write(&mut buffer[start..start + size]);
                self.n_elements += 1;
                true
            }
            None => false,
        }
    }

    /// Appends one typed element.
    #[inline]
    pub fn push<T: Element>(&mut self, value: T) -> bool {
        self.push_with(|dst| value.write_le(dst))
    }

    /// Empties the page and moves its window past the elements it held.
    pub fn reset(&mut self) {
        self.range_first += self.n_elements as u64;
        self.n_elements = 0;
    }

    /// Returns true if both pages share one buffer.
    #[inline]
    pub fn same_buffer(&self, other: &Page) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

/// Allocates and frees page memory.
pub trait PageAllocator: Send + Sync {
    /// Creates an empty page with room for `capacity` elements.
    fn new_page(&self, column_id: ColumnId, element_size: usize, capacity: usize) -> Page;

    /// Wraps an already filled buffer.
    fn adopt_page(
        &self,
        column_id: ColumnId,
        buffer: Vec<u8>,
        element_size: usize,
        n_elements: usize,
    ) -> Page;

    /// Releases a page created by this allocator.
    fn delete_page(&self, page: &Page);
}

/// Heap allocator that keeps count of the pages it handed out.
#[derive(Debug, Default)]
pub struct HeapPageAllocator {
    live_pages: AtomicUsize,
    live_bytes: AtomicUsize,
}

impl HeapPageAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages created and not yet deleted.
    pub fn live_pages(&self) -> usize {
        self.live_pages.load(Ordering::Relaxed)
    }

    /// Bytes held by live pages.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    fn track(&self, page: &Page) {
        self.live_pages.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(page.buffer_size(), Ordering::Relaxed);
    }
}

impl PageAllocator for HeapPageAllocator {
    fn new_page(&self, column_id: ColumnId, element_size: usize, capacity: usize) -> Page {
        let page = Page::new(column_id, element_size, capacity);
        self.track(&page);
        page
    }

    fn adopt_page(
        &self,
        column_id: ColumnId,
        buffer: Vec<u8>,
        element_size: usize,
        n_elements: usize,
    ) -> Page {
        let page = Page::from_buffer(column_id, buffer, element_size, n_elements);
        self.track(&page);
        page
    }

    fn delete_page(&self, page: &Page) {
        self.live_pages.fetch_sub(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(page.buffer_size(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let mut page = Page::new(3, 8, 4);
        assert!(page.push(1.5f64));
        assert!(page.push(2.5f64));
        assert_eq!(page.n_elements(), 2);
        assert_eq!(page.get::<f64>(1), Some(2.5));
        assert_eq!(page.get::<f64>(2), None);
        assert_eq!(page.element_bytes().len(), 16);
    }

    #[test]
    fn test_push_full_page() {
        let mut page = Page::new(0, 4, 2);
        assert!(page.push(1i32));
        assert!(page.push(2i32));
        assert!(page.is_full());
        assert!(!page.push(3i32));
    }

    #[test]
    fn test_push_shared_buffer_refused() {
        let mut page = Page::new(0, 4, 2);
        let shared = page.clone();
        assert!(!page.push(1i32));
        assert!(page.same_buffer(&shared));
    }

    #[test]
    fn test_window() {
        let mut page = Page::from_buffer(1, vec![0u8; 40], 4, 10);
        page.set_window(100, ClusterInfo::new(2, 80));
        assert!(page.contains(100));
        assert!(page.contains(109));
        assert!(!page.contains(110));
        assert!(!page.contains(99));
        assert!(page.contains_cluster_index(ClusterIndex::new(2, 20)));
        assert!(page.contains_cluster_index(ClusterIndex::new(2, 29)));
        assert!(!page.contains_cluster_index(ClusterIndex::new(2, 30)));
        assert!(!page.contains_cluster_index(ClusterIndex::new(1, 20)));
    }

    #[test]
    fn test_reset_moves_window() {
        let mut page = Page::new(0, 1, 3);
        page.push(1u8);
        page.push(2u8);
        page.reset();
        assert_eq!(page.range_first(), 2);
        assert!(page.is_empty());
    }

    #[test]
    fn test_heap_allocator_accounting() {
        let allocator = HeapPageAllocator::new();
        let a = allocator.new_page(0, 8, 16);
        let b = allocator.adopt_page(1, vec![0u8; 10], 1, 10);
        assert_eq!(allocator.live_pages(), 2);
        assert_eq!(allocator.live_bytes(), 138);
        allocator.delete_page(&a);
        allocator.delete_page(&b);
        assert_eq!(allocator.live_pages(), 0);
        assert_eq!(allocator.live_bytes(), 0);
    }
}
