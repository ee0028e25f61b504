//! Pluggable external data sources.
//!
//! A data source hands the event loop ranges of entries to process and, per
//! slot, readers for its columns. Sources are driven through `&mut self` only
//! between batches; while entries are processed they are shared immutably by
//! every worker.

mod trivial;
mod vec;

pub use trivial::{TrivialSource, TRIVIAL_COLUMN};
pub use vec::VecSource;

use quiver_core::Result;
use std::any::{Any, TypeId};
use std::ops::Range;

/// An external source of entries.
pub trait DataSource: Send + Sync {
    /// Tells the source how many slots will read from it. Called once, before
    /// any other method.
    fn set_n_slots(&mut self, n_slots: usize);

    fn column_names(&self) -> Vec<String>;

    fn has_column(&self, name: &str) -> bool;

    /// Canonical type name of a column.
    fn type_name(&self, name: &str) -> Option<String>;

    /// `TypeId` of the values a column reader hands out.
    fn column_type_id(&self, name: &str) -> Option<TypeId>;

    /// Called once before the first batch of every event loop.
    fn initialise(&mut self) {}

    /// The next batch of entry ranges; an empty batch ends the loop.
    fn entry_ranges(&mut self) -> Result<Vec<Range<u64>>>;

    /// Called before a slot processes a range starting at `first_entry`.
    fn init_slot(&self, _slot: usize, _first_entry: u64) -> Result<()> {
        Ok(())
    }

    /// Points the slot's readers at `entry`; false skips the entry.
    fn set_entry(&self, slot: usize, entry: u64) -> Result<bool>;

    /// Called after a slot finished a range.
    fn finalise_slot(&self, _slot: usize) -> Result<()> {
        Ok(())
    }

    /// Called once after the last batch of every event loop.
    fn finalise(&mut self) {}

    /// A `Box<dyn ValueReader<T>>` for column `name`, where `T` is the
    /// column's type, for one slot.
    fn column_reader(&self, name: &str, slot: usize) -> Result<Box<dyn Any + Send>>;

    fn label(&self) -> String {
        "data source".to_string()
    }
}

/// Splits `0..n_entries` into at most `n_chunks` contiguous ranges of near equal size.
pub fn split_entries(n_entries: u64, n_chunks: usize) -> Vec<Range<u64>> {
    if n_entries == 0 {
        return Vec::new();
    }
    let n_chunks = (n_chunks.max(1) as u64).min(n_entries);
    let base = n_entries / n_chunks;
    let extra = n_entries % n_chunks;
    let mut ranges = Vec::with_capacity(n_chunks as usize);
    let mut start = 0;
    for i in 0..n_chunks {
        let len = base + u64::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}
