//! Typed access to a stored nTuple.
//!
//! `ColumnReader` walks one physical column, holding on to the page it read
//! last. `CollectionReader` combines a field's offset column and data column.
//! `ValueReader` is the uniform per-entry interface handed to consumers that
//! only learn a field's type at runtime.

use crate::descriptor::NTupleDescriptor;
use crate::metrics::MetricsSnapshot;
use crate::options::ReadOptions;
use crate::page::{ColumnId, Page};
use crate::raw_file::MemoryFile;
use crate::source::{FilePageSource, PageSource};
use quiver_core::{Element, ElementType, Error, FieldType, Result};
use std::any::Any;
use std::marker::PhantomData;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

/// Reads the elements of one column by global index.
pub struct ColumnReader<T: Element> {
    source: Arc<dyn PageSource>,
    column_id: ColumnId,
    page: Option<Page>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Element> ColumnReader<T> {
    fn new(source: Arc<dyn PageSource>, column_id: ColumnId) -> Self {
        source.add_column(column_id);
        Self {
            source,
            column_id,
            page: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn column_id(&self) -> ColumnId {
        self.column_id
    }

    /// Total number of elements in the column.
    pub fn n_elements(&self) -> u64 {
        self.source.descriptor().n_elements(self.column_id)
    }

    /// The page holding element `global_index`, populating it if needed.
    pub fn page_for(&mut self, global_index: u64) -> Result<&Page> {
        let hit = matches!(&self.page, Some(p) if p.contains(global_index));
        if !hit {
            if let Some(old) = self.page.take() {
                self.source.release_page(old);
            }
            let page = self.source.populate_page(self.column_id, global_index)?;
            self.page = Some(page);
        }
        self.page
            .as_ref()
            .ok_or_else(|| Error::invalid_operation("page vanished after population"))
    }

    /// Reads one element.
    pub fn get(&mut self, global_index: u64) -> Result<T> {
        let column_id = self.column_id;
        self.page_for(global_index)?
            .get_global::<T>(global_index)
            .ok_or_else(|| {
                Error::corrupt(
                    "page",
                    format!("element {} of column {} missing", global_index, column_id),
                )
            })
    }
}

impl<T: Element> Drop for ColumnReader<T> {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            self.source.release_page(page);
        }
    }
}

/// Reads a collection field entry by entry.
pub struct CollectionReader<T: Element> {
    offsets: ColumnReader<u32>,
    data: ColumnReader<T>,
}

impl<T: Element> CollectionReader<T> {
    /// Global index of the entry's first data element and the number of elements.
    pub fn range(&mut self, entry: u64) -> Result<(u64, u64)> {
        let source = self.offsets.source.clone();
        let desc = source.descriptor();
        let index_column = self.offsets.column_id;
        let cluster = desc
            .find_cluster_id(index_column, entry)
            .and_then(|id| desc.cluster(id))
            .ok_or_else(|| Error::invalid_operation(format!("entry {} is out of range", entry)))?;
        let (index_first, data_first) = match (
            cluster.column_range(index_column),
            cluster.column_range(self.data.column_id),
        ) {
            (Some(i), Some(d)) => (i.first_element_index, d.first_element_index),
            _ => {
                return Err(Error::corrupt(
                    "footer",
                    format!("cluster {} lacks collection columns", cluster.id()),
                ))
            }
        };
        let end = self.offsets.get(entry)? as u64;
        let start = if entry == index_first {
            0
        } else {
            self.offsets.get(entry - 1)? as u64
        };
        if end < start {
            return Err(Error::corrupt(
                "page",
                format!("collection offsets decrease at entry {}", entry),
            ));
        }
        Ok((data_first + start, end - start))
    }

    /// Number of elements of an entry.
    pub fn len(&mut self, entry: u64) -> Result<usize> {
        Ok(self.range(entry)?.1 as usize)
    }

    /// Copies an entry's elements into `out`; returns whether they sat in one page.
    pub fn read(&mut self, entry: u64, out: &mut Vec<T>) -> Result<bool> {
        out.clear();
        let (first, n) = self.range(entry)?;
        if n == 0 {
            return Ok(true);
        }
        let contiguous = self.data.page_for(first)?.contains(first + n - 1);
        out.reserve(n as usize);
        for i in first..first + n {
            out.push(self.data.get(i)?);
        }
        Ok(contiguous)
    }
}

/// Per-entry access to a field whose Rust type is `T`.
pub trait ValueReader<T>: Send {
    /// Reads the value of an entry.
    fn read(&mut self, entry: u64) -> Result<&T>;

    /// Whether the last read came from a single page.
    fn is_contiguous(&self) -> bool {
        true
    }
}

struct ScalarValueReader<T: Element> {
    column: ColumnReader<T>,
    value: T,
}

impl<T: Element> ValueReader<T> for ScalarValueReader<T> {
    fn read(&mut self, entry: u64) -> Result<&T> {
        self.value = self.column.get(entry)?;
        Ok(&self.value)
    }
}

struct CollectionValueReader<T: Element> {
    name: String,
    reader: CollectionReader<T>,
    value: Vec<T>,
    contiguous: bool,
    warned: bool,
}

impl<T: Element> ValueReader<Vec<T>> for CollectionValueReader<T> {
    fn read(&mut self, entry: u64) -> Result<&Vec<T>> {
        self.contiguous = self.reader.read(entry, &mut self.value)?;
        if !self.contiguous && !self.warned {
            log::warn!(
                "collection {} spans a page boundary at entry {}, its elements are copied into a contiguous buffer",
                self.name,
                entry
            );
            self.warned = true;
        }
        Ok(&self.value)
    }

    fn is_contiguous(&self) -> bool {
        self.contiguous
    }
}

/// Entry point for reading an nTuple.
#[derive(Clone)]
pub struct NTupleReader {
    source: Arc<dyn PageSource>,
}

impl NTupleReader {
    /// Opens a local file with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ReadOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        Ok(Self::from_source(Box::new(FilePageSource::open(path, options)?)))
    }

    /// Attaches to a dataset published into an in-memory store.
    pub fn from_memory(file: &MemoryFile, options: ReadOptions) -> Result<Self> {
        Ok(Self::from_source(Box::new(FilePageSource::attach(
            Box::new(file.clone()),
            options,
        )?)))
    }

    pub fn from_source(source: Box<dyn PageSource>) -> Self {
        Self {
            source: Arc::from(source),
        }
    }

    #[inline]
    pub fn source(&self) -> &Arc<dyn PageSource> {
        &self.source
    }

    #[inline]
    pub fn descriptor(&self) -> &NTupleDescriptor {
        self.source.descriptor()
    }

    /// Number of entries.
    #[inline]
    pub fn entries(&self) -> u64 {
        self.descriptor().n_entries()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.descriptor().fields().iter().map(|f| f.name.clone()).collect()
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.descriptor().field(name).map(|f| f.field_type)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.descriptor().field(name).is_some()
    }

    fn checked_field(&self, name: &str, requested: FieldType) -> Result<&[ColumnId]> {
        let field = self
            .descriptor()
            .field(name)
            .ok_or_else(|| Error::column_not_found(name))?;
        if field.field_type != requested {
            return Err(Error::type_mismatch(
                name,
                requested.type_name(),
                field.field_type.type_name(),
            ));
        }
        Ok(&field.column_ids)
    }

    /// Reader for a scalar field of element type `T`.
    pub fn scalar<T: Element>(&self, name: &str) -> Result<ColumnReader<T>> {
        let columns = self.checked_field(name, FieldType::Scalar(T::TYPE))?;
        Ok(ColumnReader::new(self.source.clone(), columns[0]))
    }

    /// Reader for a collection field of element type `T`.
    pub fn collection<T: Element>(&self, name: &str) -> Result<CollectionReader<T>> {
        let columns = self.checked_field(name, FieldType::Collection(T::TYPE))?;
        let (offsets, data) = match columns {
            [offsets, data] => (*offsets, *data),
            _ => return Err(Error::corrupt("header", format!("collection {} needs two columns", name))),
        };
        Ok(CollectionReader {
            offsets: ColumnReader::new(self.source.clone(), offsets),
            data: ColumnReader::new(self.source.clone(), data),
        })
    }

    /// Type-erased value reader: a `Box<dyn ValueReader<X>>` where `X` is the
    /// Rust type of the field (`f32`, `Vec<i64>`, ...).
    pub fn value_reader(&self, name: &str) -> Result<Box<dyn Any + Send>> {
        let field_type = self
            .field_type(name)
            .ok_or_else(|| Error::column_not_found(name))?;

        macro_rules! erased {
            ($t:ty) => {
                if field_type.is_collection() {
                    let reader: Box<dyn ValueReader<Vec<$t>>> = Box::new(CollectionValueReader {
                        name: name.to_string(),
                        reader: self.collection::<$t>(name)?,
                        value: Vec::new(),
                        contiguous: true,
                        warned: false,
                    });
                    Box::new(reader) as Box<dyn Any + Send>
                } else {
                    let reader: Box<dyn ValueReader<$t>> = Box::new(ScalarValueReader {
                        column: self.scalar::<$t>(name)?,
                        value: <$t>::default(),
                    });
                    Box::new(reader) as Box<dyn Any + Send>
                }
            };
        }

        Ok(match field_type.element_type() {
            ElementType::Index => erased!(u32),
            ElementType::Bit => erased!(bool),
            ElementType::Byte => erased!(u8),
            ElementType::Int16 => erased!(i16),
            ElementType::Int32 => erased!(i32),
            ElementType::Int64 => erased!(i64),
            ElementType::Real32 => erased!(f32),
            ElementType::Real64 => erased!(f64),
        })
    }

    /// Value reader for a field whose Rust type is `X`.
    pub fn typed_reader<X: 'static>(&self, name: &str) -> Result<Box<dyn ValueReader<X>>> {
        let erased = self.value_reader(name)?;
        erased
            .downcast::<Box<dyn ValueReader<X>>>()
            .map(|reader| *reader)
            .map_err(|_| {
                let found = self
                    .field_type(name)
                    .map(|t| t.type_name())
                    .unwrap_or_default();
                let expected = FieldType::of::<X>()
                    .map(|t| t.type_name())
                    .unwrap_or_else(|| std::any::type_name::<X>().to_string());
                Error::type_mismatch(name, expected, found)
            })
    }

    /// Entry ranges of the clusters, the natural unit of parallel work.
    pub fn cluster_entry_ranges(&self) -> Vec<Range<u64>> {
        self.descriptor().cluster_entry_ranges()
    }

    /// A reader on an independent clone of the source.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            source: Arc::from(self.source.clone_source()?),
        })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.source.metrics().snapshot()
    }
}

impl std::fmt::Debug for NTupleReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NTupleReader")
            .field("name", &self.descriptor().name())
            .field("entries", &self.entries())
            .finish()
    }
}
