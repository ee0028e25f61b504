//! A source whose only column is the entry number.

use super::{split_entries, DataSource};
use quiver_core::{Error, Result};
use quiver_storage::ValueReader;
use std::any::{Any, TypeId};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Name of the single column of a [`TrivialSource`].
pub const TRIVIAL_COLUMN: &str = "col0";

/// Produces `n_entries` entries with one `u64` column, `col0`, equal to the entry number.
#[derive(Debug)]
pub struct TrivialSource {
    n_entries: u64,
    n_slots: usize,
    entries: Vec<Arc<AtomicU64>>,
    served: bool,
}

impl TrivialSource {
    pub fn new(n_entries: u64) -> Self {
        Self {
            n_entries,
            n_slots: 1,
            entries: vec![Arc::new(AtomicU64::new(0))],
            served: false,
        }
    }

    pub fn n_entries(&self) -> u64 {
        self.n_entries
    }
}

struct EntryReader {
    current: Arc<AtomicU64>,
    value: u64,
}

impl ValueReader<u64> for EntryReader {
    fn read(&mut self, _entry: u64) -> Result<&u64> {
        self.value = self.current.load(Ordering::Relaxed);
        Ok(&self.value)
    }
}

impl DataSource for TrivialSource {
    fn set_n_slots(&mut self, n_slots: usize) {
        self.n_slots = n_slots.max(1);
        self.entries = (0..self.n_slots)
            .map(|_| Arc::new(AtomicU64::new(0)))
            .collect();
    }

    fn column_names(&self) -> Vec<String> {
        vec![TRIVIAL_COLUMN.to_string()]
    }

    fn has_column(&self, name: &str) -> bool {
        name == TRIVIAL_COLUMN
    }

    fn type_name(&self, name: &str) -> Option<String> {
        self.has_column(name).then(|| "u64".to_string())
    }

    fn column_type_id(&self, name: &str) -> Option<TypeId> {
        self.has_column(name).then(TypeId::of::<u64>)
    }

    fn initialise(&mut self) {
        self.served = false;
    }

    fn entry_ranges(&mut self) -> Result<Vec<Range<u64>>> {
        if self.served {
            return Ok(Vec::new());
        }
        self.served = true;
        Ok(split_entries(self.n_entries, self.n_slots))
    }

    fn set_entry(&self, slot: usize, entry: u64) -> Result<bool> {
        let current = self
            .entries
            .get(slot)
            .ok_or_else(|| Error::invalid_operation(format!("slot {} out of range", slot)))?;
        current.store(entry, Ordering::Relaxed);
        Ok(true)
    }

    fn column_reader(&self, name: &str, slot: usize) -> Result<Box<dyn Any + Send>> {
        if !self.has_column(name) {
            return Err(Error::column_not_found(name));
        }
        let current = self
            .entries
            .get(slot)
            .ok_or_else(|| Error::invalid_operation(format!("slot {} out of range", slot)))?;
        let reader: Box<dyn ValueReader<u64>> = Box::new(EntryReader {
            current: Arc::clone(current),
            value: 0,
        });
        Ok(Box::new(reader))
    }

    fn label(&self) -> String {
        format!("trivial source ({} entries)", self.n_entries)
    }
}
