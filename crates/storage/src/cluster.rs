//! In-memory image of the pages of one cluster.
//!
//! Loading a cluster fetches every page of the requested columns with a single
//! vectored read. Neighbouring pages are merged into one request when the gap
//! between them is small; the gap cut-off is chosen so that the bytes read only
//! to bridge gaps stay below a quarter of the page payload.

use crate::descriptor::Locator;
use crate::page::{ClusterId, ColumnId};
use crate::raw_file::ReadRequest;
use hashbrown::{HashMap, HashSet};

/// Identifies a page by column and position within the cluster's page range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OnDiskPageKey {
    pub column_id: ColumnId,
    pub page_no: usize,
}

impl OnDiskPageKey {
    pub fn new(column_id: ColumnId, page_no: usize) -> Self {
        Self { column_id, page_no }
    }
}

#[derive(Clone, Copy, Debug)]
struct OnDiskPage {
    request: usize,
    offset: usize,
    size: usize,
}

/// The stored bytes of a set of columns within one cluster.
#[derive(Debug)]
pub struct Cluster {
    id: ClusterId,
    buffers: Vec<Vec<u8>>,
    pages: HashMap<OnDiskPageKey, OnDiskPage>,
    columns: HashSet<ColumnId>,
}

impl Cluster {
    #[inline]
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Stored bytes of a page, if it was loaded.
    pub fn page(&self, key: OnDiskPageKey) -> Option<&[u8]> {
        let page = self.pages.get(&key)?;
        Some(&self.buffers[page.request][page.offset..page.offset + page.size])
    }

    /// Returns true if all pages of the column were loaded.
    #[inline]
    pub fn contains_column(&self, column_id: ColumnId) -> bool {
        self.columns.contains(&column_id)
    }

    pub fn columns(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.columns.iter().copied()
    }

    #[inline]
    pub fn n_pages(&self) -> usize {
        self.pages.len()
    }
}

/// Reads needed to load a cluster, before they are issued.
#[derive(Debug)]
pub struct ReadPlan {
    id: ClusterId,
    columns: HashSet<ColumnId>,
    requests: Vec<ReadRequest>,
    pages: HashMap<OnDiskPageKey, OnDiskPage>,
    payload: u64,
}

impl ReadPlan {
    /// Plans the reads for the given pages.
    pub fn new(
        id: ClusterId,
        columns: impl IntoIterator<Item = ColumnId>,
        mut on_disk: Vec<(OnDiskPageKey, Locator)>,
    ) -> Self {
        on_disk.sort_by_key(|(_, loc)| loc.position);
        let payload: u64 = on_disk.iter().map(|(_, l)| l.bytes_on_storage as u64).sum();
        let gap_cut = gap_cut(&on_disk, payload);

        let mut requests: Vec<ReadRequest> = Vec::new();
        let mut pages = HashMap::with_capacity(on_disk.len());
        let mut req_end = 0u64;
        for (key, loc) in on_disk {
            let extend = match requests.last() {
                Some(_) => loc.position >= req_end && loc.position - req_end <= gap_cut,
                None => false,
            };
            if !extend {
                requests.push(ReadRequest::new(loc.position, 0));
                req_end = loc.position;
            }
            let index = requests.len() - 1;
            let req = &mut requests[index];
            let end = loc.position + loc.bytes_on_storage as u64;
            req_end = req_end.max(end);
            req.size = (req_end - req.offset) as usize;
            pages.insert(
                key,
                OnDiskPage {
                    request: index,
                    offset: (loc.position - req.offset) as usize,
                    size: loc.bytes_on_storage as usize,
                },
            );
        }

        Self {
            id,
            columns: columns.into_iter().collect(),
            requests,
            pages,
            payload,
        }
    }

    /// The coalesced requests.
    pub fn requests_mut(&mut self) -> &mut [ReadRequest] {
        &mut self.requests
    }

    #[inline]
    pub fn n_requests(&self) -> usize {
        self.requests.len()
    }

    #[inline]
    pub fn n_pages(&self) -> usize {
        self.pages.len()
    }

    /// Bytes of page payload.
    #[inline]
    pub fn payload(&self) -> u64 {
        self.payload
    }

    /// Bytes the requests read in total.
    pub fn total_read(&self) -> u64 {
        self.requests.iter().map(|r| r.size as u64).sum()
    }

    /// Turns the served requests into a cluster.
    pub fn into_cluster(self) -> Cluster {
        Cluster {
            id: self.id,
            buffers: self.requests.into_iter().map(|r| r.buffer).collect(),
            pages: self.pages,
            columns: self.columns,
        }
    }
}

/// Largest gap that may be bridged while keeping the overhead below 25 % of the payload.
fn gap_cut(sorted: &[(OnDiskPageKey, Locator)], payload: u64) -> u64 {
    let max_overhead = payload / 4;
    let mut gaps: Vec<u64> = sorted
        .windows(2)
        .filter_map(|w| {
            let end = w[0].1.position + w[0].1.bytes_on_storage as u64;
            w[1].1.position.checked_sub(end)
        })
        .collect();
    gaps.sort_unstable();

    let mut cut = 0;
    let mut extra = 0;
    for gap in gaps {
        extra += gap;
        if extra > max_overhead {
            break;
        }
        cut = gap;
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(position: u64, bytes: u32) -> Locator {
        Locator {
            position,
            bytes_on_storage: bytes,
        }
    }

    #[test]
    fn test_adjacent_pages_merge() {
        let plan = ReadPlan::new(
            0,
            [0, 1],
            vec![
                (OnDiskPageKey::new(1, 0), loc(100, 50)),
                (OnDiskPageKey::new(0, 0), loc(0, 100)),
            ],
        );
        assert_eq!(plan.n_requests(), 1);
        assert_eq!(plan.total_read(), 150);
        assert_eq!(plan.payload(), 150);
    }

    #[test]
    fn test_small_gaps_bridged_large_gaps_split() {
        let plan = ReadPlan::new(
            0,
            [0],
            vec![
                (OnDiskPageKey::new(0, 0), loc(0, 100)),
                (OnDiskPageKey::new(0, 1), loc(110, 100)),
                (OnDiskPageKey::new(0, 2), loc(1000, 100)),
            ],
        );
        // payload 300, overhead budget 75: the 10-byte gap is bridged, the 790-byte one is not
        assert_eq!(plan.n_requests(), 2);
        assert_eq!(plan.total_read(), 310);
    }

    #[test]
    fn test_into_cluster_slices_pages() {
        let mut plan = ReadPlan::new(
            3,
            [0],
            vec![
                (OnDiskPageKey::new(0, 0), loc(4, 2)),
                (OnDiskPageKey::new(0, 1), loc(6, 3)),
            ],
        );
        for req in plan.requests_mut() {
            req.buffer = (req.offset as u8..(req.offset as usize + req.size) as u8).collect();
        }
        let cluster = plan.into_cluster();
        assert_eq!(cluster.id(), 3);
        assert_eq!(cluster.page(OnDiskPageKey::new(0, 0)), Some(&[4u8, 5][..]));
        assert_eq!(cluster.page(OnDiskPageKey::new(0, 1)), Some(&[6u8, 7, 8][..]));
        assert!(cluster.contains_column(0));
        assert!(!cluster.contains_column(1));
    }
}
