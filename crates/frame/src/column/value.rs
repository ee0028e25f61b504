//! Per-slot typed column access.

use super::Column;
use crate::source::DataSource;
use quiver_core::Result;
use quiver_storage::{NTupleReader, ValueReader};
use std::sync::Arc;

/// What a node needs to build its column readers for one slot.
pub struct SlotContext<'a> {
    pub slot: usize,
    /// The slot's own reader, when the graph runs over an nTuple.
    pub dataset: Option<&'a NTupleReader>,
    pub source: Option<&'a dyn DataSource>,
}

impl<'a> SlotContext<'a> {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            dataset: None,
            source: None,
        }
    }

    pub fn with_dataset(mut self, dataset: &'a NTupleReader) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn with_source(mut self, source: &'a dyn DataSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Computed value of a define for one slot.
pub trait DefineValue<T>: Send + Sync {
    /// Returns the value for `entry`, computing it only if the entry changed.
    fn value(&self, slot: usize, entry: u64) -> Result<T>;
}

/// A column value bound to one slot.
///
/// The backing kind is fixed when the column is bound; reading never
/// re-resolves the column name.
pub enum ColumnValue<T: Column> {
    /// A field of the nTuple the graph runs over.
    Dataset(Box<dyn ValueReader<T>>),
    /// The value of an upstream define, copied on each new entry.
    Define {
        value: Arc<dyn DefineValue<T>>,
        slot: usize,
        cached: Option<T>,
    },
    /// A column of an external data source.
    Source(Box<dyn ValueReader<T>>),
}

impl<T: Column> ColumnValue<T> {
    /// Reads the value for `entry`.
    pub fn get(&mut self, entry: u64) -> Result<&T> {
        match self {
            ColumnValue::Dataset(reader) | ColumnValue::Source(reader) => reader.read(entry),
            ColumnValue::Define {
                value,
                slot,
                cached,
            } => {
                let v = value.value(*slot, entry)?;
                Ok(cached.insert(v))
            }
        }
    }
}

impl<T: Column> std::fmt::Debug for ColumnValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ColumnValue::Dataset(_) => "dataset",
            ColumnValue::Define { .. } => "define",
            ColumnValue::Source(_) => "source",
        };
        f.debug_tuple("ColumnValue").field(&kind).finish()
    }
}
