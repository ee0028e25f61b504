//! In-memory columns as a data source.

use super::{split_entries, DataSource};
use crate::column::{column_type_name, Column};
use quiver_core::schema::check_naming_rules;
use quiver_core::{Error, Result};
use quiver_storage::ValueReader;
use std::any::{Any, TypeId};
use std::ops::Range;
use std::sync::Arc;

type ReaderFactory = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

struct VecColumn {
    name: String,
    type_name: String,
    type_id: TypeId,
    len: u64,
    make_reader: ReaderFactory,
}

struct SliceReader<T> {
    name: String,
    data: Arc<Vec<T>>,
}

impl<T: Column> ValueReader<T> for SliceReader<T> {
    fn read(&mut self, entry: u64) -> Result<&T> {
        self.data.get(entry as usize).ok_or_else(|| {
            Error::invalid_operation(format!(
                "entry {} beyond the {} values of column {}",
                entry,
                self.data.len(),
                self.name
            ))
        })
    }
}

/// Named typed columns held in memory.
///
/// Every column must have the same length. Entries are handed out in batches
/// of `batch_size` (all entries at once by default), each batch split evenly
/// across the slots.
pub struct VecSource {
    columns: Vec<VecColumn>,
    n_slots: usize,
    batch_size: Option<u64>,
    next_entry: u64,
}

impl VecSource {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            n_slots: 1,
            batch_size: None,
            next_entry: 0,
        }
    }

    /// Adds a column.
    pub fn with_column<T: Column>(mut self, name: &str, values: Vec<T>) -> Result<Self> {
        check_naming_rules(name)?;
        if self.has_column(name) {
            return Err(Error::duplicate_column(name));
        }
        let len = values.len() as u64;
        if let Some(expected) = self.columns.first().map(|c| c.len) {
            if expected != len {
                return Err(Error::invalid_operation(format!(
                    "column {} has {} entries, previous columns have {}",
                    name, len, expected
                )));
            }
        }
        let data = Arc::new(values);
        let reader_name = name.to_string();
        self.columns.push(VecColumn {
            name: name.to_string(),
            type_name: column_type_name::<T>(),
            type_id: TypeId::of::<T>(),
            len,
            make_reader: Arc::new(move || {
                let reader: Box<dyn ValueReader<T>> = Box::new(SliceReader {
                    name: reader_name.clone(),
                    data: Arc::clone(&data),
                });
                Box::new(reader) as Box<dyn Any + Send>
            }),
        });
        Ok(self)
    }

    /// Hands out entries in batches of at most `n`.
    pub fn batch_size(mut self, n: u64) -> Self {
        self.batch_size = Some(n.max(1));
        self
    }

    pub fn n_entries(&self) -> u64 {
        self.columns.first().map(|c| c.len).unwrap_or(0)
    }

    fn column(&self, name: &str) -> Option<&VecColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

impl Default for VecSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VecSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VecSource")
            .field("columns", &self.column_names())
            .field("n_entries", &self.n_entries())
            .field("n_slots", &self.n_slots)
            .finish()
    }
}

impl DataSource for VecSource {
    fn set_n_slots(&mut self, n_slots: usize) {
        self.n_slots = n_slots.max(1);
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    fn type_name(&self, name: &str) -> Option<String> {
        self.column(name).map(|c| c.type_name.clone())
    }

    fn column_type_id(&self, name: &str) -> Option<TypeId> {
        self.column(name).map(|c| c.type_id)
    }

    fn initialise(&mut self) {
        self.next_entry = 0;
    }

    fn entry_ranges(&mut self) -> Result<Vec<Range<u64>>> {
        let total = self.n_entries();
        let first = self.next_entry;
        if first >= total {
            return Ok(Vec::new());
        }
        let last = match self.batch_size {
            Some(n) => (first + n).min(total),
            None => total,
        };
        self.next_entry = last;
        Ok(split_entries(last - first, self.n_slots)
            .into_iter()
            .map(|r| r.start + first..r.end + first)
            .collect())
    }

    fn set_entry(&self, _slot: usize, entry: u64) -> Result<bool> {
        Ok(entry < self.n_entries())
    }

    fn column_reader(&self, name: &str, _slot: usize) -> Result<Box<dyn Any + Send>> {
        let column = self
            .column(name)
            .ok_or_else(|| Error::column_not_found(name))?;
        Ok((column.make_reader)())
    }

    fn label(&self) -> String {
        format!("in-memory source ({} columns)", self.columns.len())
    }
}
