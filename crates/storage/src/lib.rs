//! Quiver Storage - paged columnar storage for quiver nTuples.
//!
//! An nTuple is a table of typed fields stored column-wise. Each column is cut
//! into pages, pages are grouped into clusters of consecutive entries, and every
//! page is compressed independently. This crate provides:
//!
//! - `Page`, `PageAllocator`: fixed-width element buffers and their allocation
//! - `PagePool`: reference-counted sharing of populated read pages
//! - `PageSink` / `FilePageSink`: writes pages, clusters and the descriptor
//! - `PageSource` / `FilePageSource`: attaches to a dataset and populates pages
//! - `NTupleDescriptor`: the immutable schema and page-location metadata
//! - `NTupleWriter` / `NTupleReader`: row-wise filling and typed column reading
//! - `CompressionSettings`: per-dataset compression (LZ4 by default)
//!
//! # Example
//!
//! ```rust
//! use quiver_core::schema::SchemaBuilder;
//! use quiver_core::{ElementType, FieldType, Value};
//! use quiver_storage::{MemoryFile, NTupleReader, NTupleWriter, ReadOptions, WriteOptions};
//!
//! let schema = SchemaBuilder::new("events")
//!     .unwrap()
//!     .add_field("pt", FieldType::Scalar(ElementType::Real64))
//!     .unwrap()
//!     .add_field("hits", FieldType::Collection(ElementType::Int32))
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let file = MemoryFile::new();
//! let mut writer = NTupleWriter::in_memory(schema, file.clone(), WriteOptions::default()).unwrap();
//! for i in 0..100 {
//!     writer
//!         .fill(&[Value::Float64(i as f64), Value::from(vec![i as i32; (i % 3) as usize])])
//!         .unwrap();
//! }
//! writer.commit().unwrap();
//!
//! let reader = NTupleReader::from_memory(&file, ReadOptions::default()).unwrap();
//! assert_eq!(reader.entries(), 100);
//! let mut pt = reader.scalar::<f64>("pt").unwrap();
//! assert_eq!(pt.get(42).unwrap(), 42.0);
//! let mut hits = reader.collection::<i32>("hits").unwrap();
//! let mut items = Vec::new();
//! hits.read(5, &mut items).unwrap();
//! assert_eq!(items, vec![5, 5]);
//! ```

pub mod cluster;
pub mod compression;
pub mod descriptor;
pub mod element;
pub mod file_writer;
pub mod metrics;
pub mod options;
pub mod page;
pub mod pool;
pub mod raw_file;
pub mod reader;
pub mod serialize;
pub mod sink;
pub mod source;
pub mod writer;

pub use cluster::{Cluster, OnDiskPageKey};
pub use compression::{CompressionAlgorithm, CompressionSettings};
pub use descriptor::{
    ClusterDescriptor, ColumnDescriptor, ColumnRange, DescriptorBuilder, FieldDescriptor,
    NTupleDescriptor, PageRange,
};
pub use metrics::{MetricsSnapshot, StorageMetrics};
pub use options::{ClusterCache, ReadOptions, WriteOptions};
pub use page::{ClusterId, ClusterIndex, ColumnId, HeapPageAllocator, Page, PageAllocator};
pub use pool::PagePool;
pub use raw_file::{LocalFile, MemoryFile, RawFile, ReadRequest};
pub use reader::{CollectionReader, ColumnReader, NTupleReader, ValueReader};
pub use sink::{FilePageSink, PageSink};
pub use source::{FilePageSource, PageSource};
pub use writer::NTupleWriter;
