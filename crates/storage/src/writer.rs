//! Row-wise filling of an nTuple.

use crate::element;
use crate::options::WriteOptions;
use crate::page::{ColumnId, Page};
use crate::raw_file::MemoryFile;
use crate::sink::{FilePageSink, PageSink};
use quiver_core::schema::Schema;
use quiver_core::{ElementType, Error, FieldType, Result, Value};
use std::path::Path;

struct ColumnBuffer {
    column_id: ColumnId,
    element: ElementType,
    page: Page,
}

enum FieldColumns {
    Scalar(ColumnBuffer),
    Collection {
        offsets: ColumnBuffer,
        data: ColumnBuffer,
        /// Data elements written to this field in the open cluster.
        cluster_count: u32,
    },
}

/// Appends rows to an nTuple and commits them cluster by cluster.
///
/// A writer dropped without `commit` abandons its dataset.
pub struct NTupleWriter {
    sink: Box<dyn PageSink>,
    schema: Schema,
    fields: Vec<FieldColumns>,
    n_entries: u64,
    cluster_entries: u64,
    entries_per_cluster: u64,
    committed: bool,
}

impl NTupleWriter {
    /// Creates a writer for a new file at `path`.
    pub fn create(schema: Schema, path: impl AsRef<Path>, options: WriteOptions) -> Result<Self> {
        let sink = FilePageSink::create_path(path, options)?;
        Self::with_sink(schema, Box::new(sink), options)
    }

    /// Creates a writer whose dataset is published into `file` on commit.
    pub fn in_memory(schema: Schema, file: MemoryFile, options: WriteOptions) -> Result<Self> {
        Self::with_sink(schema, Box::new(FilePageSink::in_memory(file, options)), options)
    }

    pub fn with_sink(schema: Schema, mut sink: Box<dyn PageSink>, options: WriteOptions) -> Result<Self> {
        sink.create(&schema)?;
        let mut fields = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let columns = match field.field_type() {
                FieldType::Scalar(element) => {
                    FieldColumns::Scalar(reserve(sink.as_mut(), field.name(), 0, element)?)
                }
                FieldType::Collection(element) => FieldColumns::Collection {
                    offsets: reserve(sink.as_mut(), field.name(), 0, ElementType::Index)?,
                    data: reserve(sink.as_mut(), field.name(), 1, element)?,
                    cluster_count: 0,
                },
            };
            fields.push(columns);
        }
        log::debug!(
            "created nTuple writer for {} with {} fields",
            schema.name(),
            schema.len()
        );
        Ok(Self {
            sink,
            schema,
            fields,
            n_entries: 0,
            cluster_entries: 0,
            entries_per_cluster: options.get_entries_per_cluster().max(1),
            committed: false,
        })
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Entries filled so far, committed or not.
    #[inline]
    pub fn n_entries(&self) -> u64 {
        self.n_entries
    }

    /// Appends one row, one value per field in schema order.
    pub fn fill(&mut self, row: &[Value]) -> Result<()> {
        self.validate(row)?;
        let sink = self.sink.as_mut();
        for (columns, value) in self.fields.iter_mut().zip(row) {
            match columns {
                FieldColumns::Scalar(buffer) => append_value(sink, buffer, value)?,
                FieldColumns::Collection {
                    offsets,
                    data,
                    cluster_count,
                } => {
                    let items = value.as_list().unwrap_or(&[]);
                    for item in items {
                        append_value(sink, data, item)?;
                    }
                    *cluster_count += items.len() as u32;
                    let end = *cluster_count;
                    append_with(sink, offsets, |page| page.push(end))?;
                }
            }
        }
        self.n_entries += 1;
        self.cluster_entries += 1;
        if self.cluster_entries >= self.entries_per_cluster {
            self.commit_cluster()?;
        }
        Ok(())
    }

    fn validate(&self, row: &[Value]) -> Result<()> {
        if row.len() != self.schema.len() {
            return Err(Error::invalid_value(
                self.schema.name(),
                format!("row has {} values, schema has {} fields", row.len(), self.schema.len()),
            ));
        }
        for ((field, columns), value) in self.schema.fields().iter().zip(&self.fields).zip(row) {
            if !value.fits(field.field_type()) {
                return Err(Error::invalid_value(
                    field.name(),
                    format!("expected {}, got {}", field.field_type(), value),
                ));
            }
            if let FieldColumns::Collection { cluster_count, .. } = columns {
                let n = value.as_list().map_or(0, |items| items.len());
                if u32::try_from(n)
                    .ok()
                    .and_then(|n| cluster_count.checked_add(n))
                    .is_none()
                {
                    return Err(Error::invalid_value(
                        field.name(),
                        "collection offsets overflow the cluster index",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Flushes the open cluster; a no-op when it holds no entries.
    pub fn commit_cluster(&mut self) -> Result<()> {
        if self.cluster_entries == 0 {
            return Ok(());
        }
        let sink = self.sink.as_mut();
        for columns in &mut self.fields {
            match columns {
                FieldColumns::Scalar(buffer) => flush(sink, buffer)?,
                FieldColumns::Collection {
                    offsets,
                    data,
                    cluster_count,
                } => {
                    flush(sink, offsets)?;
                    flush(sink, data)?;
                    *cluster_count = 0;
                }
            }
        }
        sink.commit_cluster(self.cluster_entries)?;
        log::trace!("committed cluster of {} entries", self.cluster_entries);
        self.cluster_entries = 0;
        Ok(())
    }

    /// Commits the last cluster and the dataset.
    pub fn commit(mut self) -> Result<()> {
        self.commit_cluster()?;
        self.sink.commit_dataset()?;
        self.committed = true;
        for columns in std::mem::take(&mut self.fields) {
            match columns {
                FieldColumns::Scalar(buffer) => self.sink.release_page(buffer.page),
                FieldColumns::Collection { offsets, data, .. } => {
                    self.sink.release_page(offsets.page);
                    self.sink.release_page(data.page);
                }
            }
        }
        log::debug!("committed nTuple {} with {} entries", self.schema.name(), self.n_entries);
        Ok(())
    }
}

impl Drop for NTupleWriter {
    fn drop(&mut self) {
        if !self.committed {
            log::warn!(
                "nTuple writer for {} dropped without commit, {} entries discarded",
                self.schema.name(),
                self.n_entries
            );
        }
    }
}

fn reserve(sink: &mut dyn PageSink, field: &str, index: u32, element: ElementType) -> Result<ColumnBuffer> {
    let column_id = sink
        .descriptor()
        .find_column_id(field, index)
        .ok_or_else(|| Error::column_not_found(field))?;
    Ok(ColumnBuffer {
        column_id,
        element,
        page: sink.reserve_page(column_id, 0)?,
    })
}

fn append_with(
    sink: &mut dyn PageSink,
    buffer: &mut ColumnBuffer,
    push: impl FnOnce(&mut Page) -> bool,
) -> Result<()> {
    if buffer.page.is_full() {
        flush(sink, buffer)?;
    }
    if push(&mut buffer.page) {
        Ok(())
    } else {
        Err(Error::invalid_operation(format!(
            "cannot append to page of column {}",
            buffer.column_id
        )))
    }
}

fn append_value(sink: &mut dyn PageSink, buffer: &mut ColumnBuffer, value: &Value) -> Result<()> {
    let element = buffer.element;
    let mut written = false;
    append_with(sink, buffer, |page| {
        page.push_with(|dst| written = element::write_value(element, value, dst))
    })?;
    if written {
        Ok(())
    } else {
        Err(Error::invalid_value(
            format!("column {}", buffer.column_id),
            format!("{} is not a {} element", value, element.rust_name()),
        ))
    }
}

fn flush(sink: &mut dyn PageSink, buffer: &mut ColumnBuffer) -> Result<()> {
    sink.commit_page(buffer.column_id, &buffer.page)?;
    buffer.page.reset();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::NTupleReader;
    use crate::options::ReadOptions;
    use quiver_core::schema::SchemaBuilder;

    fn schema() -> Schema {
        SchemaBuilder::new("muons")
            .unwrap()
            .add_field("pt", FieldType::Scalar(ElementType::Real32))
            .unwrap()
            .add_field("hits", FieldType::Collection(ElementType::Int32))
            .unwrap()
            .build()
            .unwrap()
    }

    fn row(i: i32) -> Vec<Value> {
        vec![
            Value::Float32(i as f32 * 0.5),
            Value::List((0..i % 4).map(Value::Int32).collect()),
        ]
    }

    #[test]
    fn test_fill_rejects_wrong_type() {
        let file = MemoryFile::new();
        let mut writer = NTupleWriter::in_memory(schema(), file, WriteOptions::default()).unwrap();
        let err = writer
            .fill(&[Value::Int64(1), Value::List(vec![])])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
        assert_eq!(writer.n_entries(), 0);
    }

    #[test]
    fn test_fill_rejects_short_row() {
        let file = MemoryFile::new();
        let mut writer = NTupleWriter::in_memory(schema(), file, WriteOptions::default()).unwrap();
        assert!(writer.fill(&[Value::Float32(1.0)]).is_err());
    }

    #[test]
    fn test_clusters_follow_entries_per_cluster() {
        let file = MemoryFile::new();
        let options = WriteOptions::default().entries_per_cluster(10).elements_per_page(4);
        let mut writer = NTupleWriter::in_memory(schema(), file.clone(), options).unwrap();
        for i in 0..25 {
            writer.fill(&row(i)).unwrap();
        }
        writer.commit().unwrap();

        let reader = NTupleReader::from_memory(&file, ReadOptions::default()).unwrap();
        assert_eq!(reader.entries(), 25);
        assert_eq!(reader.cluster_entry_ranges(), vec![0..10, 10..20, 20..25]);

        let mut pt = reader.scalar::<f32>("pt").unwrap();
        let mut hits = reader.collection::<i32>("hits").unwrap();
        let mut items = Vec::new();
        for i in 0..25u64 {
            assert_eq!(pt.get(i).unwrap(), i as f32 * 0.5);
            hits.read(i, &mut items).unwrap();
            assert_eq!(items, (0..(i as i32) % 4).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_uncommitted_writer_publishes_nothing() {
        let file = MemoryFile::new();
        {
            let mut writer =
                NTupleWriter::in_memory(schema(), file.clone(), WriteOptions::default()).unwrap();
            writer.fill(&row(3)).unwrap();
        }
        assert!(file.is_empty());
        assert!(NTupleReader::from_memory(&file, ReadOptions::default()).is_err());
    }
}
