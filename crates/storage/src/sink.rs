//! Page sinks: the write half of the storage engine.
//!
//! A sink is driven through `create`, any number of `commit_page` /
//! `commit_cluster` calls, and a final `commit_dataset`. The footer is the last
//! thing written; a sink whose write failed refuses every further call, so no
//! dataset with missing pages can be finalized.

use crate::compression::Compressor;
use crate::descriptor::{
    ClusterDescriptor, ColumnRange, DescriptorBuilder, Locator, NTupleDescriptor, PageInfo,
    PageRange,
};
use crate::element;
use crate::file_writer::FileWriter;
use crate::options::WriteOptions;
use crate::page::{ColumnId, HeapPageAllocator, Page, PageAllocator};
use crate::raw_file::MemoryFile;
use crate::serialize;
use hashbrown::HashMap;
use quiver_core::schema::Schema;
use quiver_core::{Error, Result};
use std::path::Path;

/// Persists pages, clusters and the descriptor of one nTuple.
pub trait PageSink: Send {
    /// Writes the header for `schema`.
    fn create(&mut self, schema: &Schema) -> Result<()>;

    /// The descriptor assembled so far.
    fn descriptor(&self) -> &NTupleDescriptor;

    /// Allocates a write page; `n_elements == 0` picks the configured page size.
    fn reserve_page(&mut self, column_id: ColumnId, n_elements: usize) -> Result<Page>;

    /// Frees a page obtained from `reserve_page`.
    fn release_page(&mut self, page: Page);

    /// Writes the filled part of a page.
    fn commit_page(&mut self, column_id: ColumnId, page: &Page) -> Result<()>;

    /// Closes the current cluster of `n_entries` entries.
    fn commit_cluster(&mut self, n_entries: u64) -> Result<()>;

    /// Writes the footer and finalizes the backing store.
    fn commit_dataset(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SinkState {
    Initial,
    Created,
    Committed,
    Poisoned(String),
}

#[derive(Debug)]
struct OpenColumn {
    range: ColumnRange,
    pages: PageRange,
}

/// Sink writing the nTuple container to a file or an in-memory store.
pub struct FilePageSink {
    writer: FileWriter,
    options: WriteOptions,
    compressor: Compressor,
    allocator: HeapPageAllocator,
    builder: DescriptorBuilder,
    open_columns: HashMap<ColumnId, OpenColumn>,
    pack_buffer: Vec<u8>,
    cluster_min_offset: u64,
    cluster_max_offset: u64,
    state: SinkState,
}

impl FilePageSink {
    /// Creates a sink writing to `path`.
    pub fn create_path(path: impl AsRef<Path>, options: WriteOptions) -> Result<Self> {
        Ok(Self::with_writer(FileWriter::create(path)?, options))
    }

    /// Creates a sink publishing into `file` on commit.
    pub fn in_memory(file: MemoryFile, options: WriteOptions) -> Self {
        Self::with_writer(FileWriter::in_memory(file), options)
    }

    fn with_writer(writer: FileWriter, options: WriteOptions) -> Self {
        Self {
            writer,
            compressor: Compressor::new(options.get_compression()),
            options,
            allocator: HeapPageAllocator::new(),
            builder: DescriptorBuilder::default(),
            open_columns: HashMap::new(),
            pack_buffer: Vec::new(),
            cluster_min_offset: u64::MAX,
            cluster_max_offset: 0,
            state: SinkState::Initial,
        }
    }

    /// The allocator backing `reserve_page`.
    pub fn allocator(&self) -> &HeapPageAllocator {
        &self.allocator
    }

    fn check_state(&self, expected: SinkState) -> Result<()> {
        match &self.state {
            SinkState::Poisoned(message) => Err(Error::aborted(message.clone())),
            state if *state == expected => Ok(()),
            state => Err(Error::invalid_operation(format!(
                "page sink is {:?}, expected {:?}",
                state, expected
            ))),
        }
    }

    /// Records a failure so that the dataset can never be committed.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            log::error!("page sink write failed, aborting dataset: {}", e);
            self.state = SinkState::Poisoned(e.to_string());
        }
        result
    }

    fn write_page(&mut self, column_id: ColumnId, page: &Page) -> Result<()> {
        let element = self
            .builder
            .descriptor()
            .column(column_id)
            .map(|c| c.element_type)
            .ok_or_else(|| Error::invalid_operation(format!("unknown column {}", column_id)))?;
        let n = page.n_elements();

        element::pack(element, page.element_bytes(), n, &mut self.pack_buffer);
        let stored = self.compressor.zip(&self.pack_buffer)?;
        let position = self.writer.write_blob(&stored)?;
        let bytes_on_storage = stored.len() as u32;

        self.cluster_min_offset = self.cluster_min_offset.min(position);
        self.cluster_max_offset = self.cluster_max_offset.max(position + bytes_on_storage as u64);

        let open = self
            .open_columns
            .get_mut(&column_id)
            .ok_or_else(|| Error::invalid_operation(format!("unknown column {}", column_id)))?;
        open.pages.push(PageInfo {
            n_elements: n as u32,
            locator: Locator {
                position,
                bytes_on_storage,
            },
        });
        open.range.n_elements += n as u64;
        Ok(())
    }

    fn close_cluster(&mut self, n_entries: u64) -> Result<()> {
        let (id, first_entry) = {
            let desc = self.builder.descriptor();
            (desc.clusters().len() as u64, desc.n_entries())
        };
        let locator = if self.cluster_min_offset == u64::MAX {
            Locator::default()
        } else {
            Locator {
                position: self.cluster_min_offset,
                bytes_on_storage: (self.cluster_max_offset - self.cluster_min_offset) as u32,
            }
        };
        let mut cluster = ClusterDescriptor::new(id, first_entry, n_entries, locator);
        for (&column_id, open) in self.open_columns.iter_mut() {
            let pages = std::mem::replace(&mut open.pages, PageRange::new(column_id));
            cluster.add_column(open.range, pages)?;
            open.range.first_element_index += open.range.n_elements;
            open.range.n_elements = 0;
        }
        self.cluster_min_offset = u64::MAX;
        self.cluster_max_offset = 0;

        log::debug!(
            "committed cluster {} ({} entries, {} bytes)",
            id,
            n_entries,
            locator.bytes_on_storage
        );
        self.builder.add_cluster(cluster)
    }

    fn finish(&mut self) -> Result<()> {
        let footer = serialize::serialize_footer(self.builder.descriptor());
        let stored = self.compressor.zip(&footer)?.into_owned();
        self.writer.write_footer(&stored, footer.len())?;
        self.writer.commit()
    }
}

impl PageSink for FilePageSink {
    fn create(&mut self, schema: &Schema) -> Result<()> {
        self.check_state(SinkState::Initial)?;
        let builder = DescriptorBuilder::from_schema(schema);
        let compression = self.options.get_compression().code();
        self.open_columns = builder
            .descriptor()
            .columns()
            .iter()
            .map(|c| {
                (
                    c.id,
                    OpenColumn {
                        range: ColumnRange {
                            column_id: c.id,
                            first_element_index: 0,
                            n_elements: 0,
                            compression,
                        },
                        pages: PageRange::new(c.id),
                    },
                )
            })
            .collect();

        let header = serialize::serialize_header(builder.descriptor());
        self.builder = builder;
        let result = self
            .compressor
            .zip(&header)
            .map(|stored| stored.into_owned())
            .and_then(|stored| self.writer.write_header(&stored, header.len()));
        self.guard(result)?;
        self.state = SinkState::Created;
        Ok(())
    }

    fn descriptor(&self) -> &NTupleDescriptor {
        self.builder.descriptor()
    }

    fn reserve_page(&mut self, column_id: ColumnId, n_elements: usize) -> Result<Page> {
        let element = self
            .builder
            .descriptor()
            .column(column_id)
            .map(|c| c.element_type)
            .ok_or_else(|| Error::invalid_operation(format!("unknown column {}", column_id)))?;
        let capacity = if n_elements == 0 {
            self.options.get_elements_per_page()
        } else {
            n_elements
        };
        Ok(self.allocator.new_page(column_id, element.size(), capacity))
    }

    fn release_page(&mut self, page: Page) {
        self.allocator.delete_page(&page);
    }

    fn commit_page(&mut self, column_id: ColumnId, page: &Page) -> Result<()> {
        self.check_state(SinkState::Created)?;
        if page.is_empty() {
            return Ok(());
        }
        let result = self.write_page(column_id, page);
        self.guard(result)
    }

    fn commit_cluster(&mut self, n_entries: u64) -> Result<()> {
        self.check_state(SinkState::Created)?;
        let result = self.close_cluster(n_entries);
        self.guard(result)
    }

    fn commit_dataset(&mut self) -> Result<()> {
        self.check_state(SinkState::Created)?;
        let result = self.finish();
        self.guard(result)?;
        self.state = SinkState::Committed;
        Ok(())
    }
}
