//! nTuple meta-data: fields, columns and clusters.
//!
//! The descriptor is assembled incrementally by a page sink (one cluster at a
//! time) and in one shot by a page source (header, then footer). Once built it
//! is immutable.

use crate::page::{ClusterId, ColumnId};
use hashbrown::HashMap;
use quiver_core::schema::{Field, Schema, SchemaBuilder};
use quiver_core::{ElementType, Error, FieldType, Result};
use std::ops::Range;

/// Identifier of a field in a descriptor.
pub type FieldId = u64;

/// Position and size of a blob in the backing store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Locator {
    pub position: u64,
    pub bytes_on_storage: u32,
}

/// One page of a column within a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageInfo {
    pub n_elements: u32,
    pub locator: Locator,
}

/// Result of locating an element within a page range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLocation {
    /// Position of the page within the range.
    pub page_no: usize,
    /// Cluster-relative index of the page's first element.
    pub first_in_cluster: u64,
    pub info: PageInfo,
}

/// The ordered pages of one column within one cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageRange {
    column_id: ColumnId,
    page_infos: Vec<PageInfo>,
    // Cluster-relative index of each page's first element.
    firsts: Vec<u64>,
}

impl PageRange {
    pub fn new(column_id: ColumnId) -> Self {
        Self {
            column_id,
            page_infos: Vec::new(),
            firsts: Vec::new(),
        }
    }

    #[inline]
    pub fn column_id(&self) -> ColumnId {
        self.column_id
    }

    #[inline]
    pub fn page_infos(&self) -> &[PageInfo] {
        &self.page_infos
    }

    /// Appends the next page.
    pub fn push(&mut self, info: PageInfo) {
        self.firsts.push(self.n_elements());
        self.page_infos.push(info);
    }

    /// Total number of elements across the pages.
    pub fn n_elements(&self) -> u64 {
        match (self.firsts.last(), self.page_infos.last()) {
            (Some(first), Some(info)) => first + info.n_elements as u64,
            _ => 0,
        }
    }

    /// Finds the page holding the cluster-relative element `index`.
    pub fn find(&self, index: u64) -> Option<PageLocation> {
        let page_no = self.firsts.partition_point(|&first| first <= index).checked_sub(1)?;
        let info = self.page_infos[page_no];
        let first_in_cluster = self.firsts[page_no];
        if index >= first_in_cluster + info.n_elements as u64 {
            return None;
        }
        Some(PageLocation {
            page_no,
            first_in_cluster,
            info,
        })
    }
}

/// The elements of one column that belong to one cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnRange {
    pub column_id: ColumnId,
    pub first_element_index: u64,
    pub n_elements: u64,
    /// Compression settings code used for the pages.
    pub compression: u32,
}

impl ColumnRange {
    #[inline]
    pub fn contains(&self, global_index: u64) -> bool {
        global_index >= self.first_element_index
            && global_index < self.first_element_index + self.n_elements
    }
}

/// A contiguous group of entries persisted together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterDescriptor {
    id: ClusterId,
    first_entry: u64,
    n_entries: u64,
    locator: Locator,
    column_ranges: HashMap<ColumnId, ColumnRange>,
    page_ranges: HashMap<ColumnId, PageRange>,
}

impl ClusterDescriptor {
    pub fn new(id: ClusterId, first_entry: u64, n_entries: u64, locator: Locator) -> Self {
        Self {
            id,
            first_entry,
            n_entries,
            locator,
            column_ranges: HashMap::new(),
            page_ranges: HashMap::new(),
        }
    }

    /// Adds a column's range and pages.
    pub fn add_column(&mut self, range: ColumnRange, pages: PageRange) -> Result<()> {
        if pages.n_elements() != range.n_elements {
            return Err(Error::corrupt(
                "cluster",
                format!(
                    "column {} in cluster {}: pages hold {} elements, range declares {}",
                    range.column_id,
                    self.id,
                    pages.n_elements(),
                    range.n_elements
                ),
            ));
        }
        self.page_ranges.insert(range.column_id, pages);
        self.column_ranges.insert(range.column_id, range);
        Ok(())
    }

    #[inline]
    pub fn id(&self) -> ClusterId {
        self.id
    }

    #[inline]
    pub fn first_entry(&self) -> u64 {
        self.first_entry
    }

    #[inline]
    pub fn n_entries(&self) -> u64 {
        self.n_entries
    }

    /// Entry numbers covered by the cluster.
    #[inline]
    pub fn entry_range(&self) -> Range<u64> {
        self.first_entry..self.first_entry + self.n_entries
    }

    #[inline]
    pub fn locator(&self) -> Locator {
        self.locator
    }

    pub fn column_range(&self, column_id: ColumnId) -> Option<&ColumnRange> {
        self.column_ranges.get(&column_id)
    }

    pub fn page_range(&self, column_id: ColumnId) -> Option<&PageRange> {
        self.page_ranges.get(&column_id)
    }

    /// Column ranges sorted by column id.
    pub fn column_ranges(&self) -> Vec<&ColumnRange> {
        let mut ranges: Vec<_> = self.column_ranges.values().collect();
        ranges.sort_by_key(|r| r.column_id);
        ranges
    }
}

/// A user-visible field and the columns that store it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub id: FieldId,
    pub name: String,
    pub description: String,
    pub field_type: FieldType,
    pub column_ids: Vec<ColumnId>,
}

/// A physical column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub id: ColumnId,
    pub field_id: FieldId,
    pub element_type: ElementType,
    /// Position of the column within its field (0 = offsets for collections).
    pub index: u32,
}

/// The schema plus the cluster list of one nTuple.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NTupleDescriptor {
    name: String,
    description: String,
    fields: Vec<FieldDescriptor>,
    columns: Vec<ColumnDescriptor>,
    clusters: Vec<ClusterDescriptor>,
    field_index: HashMap<String, usize>,
}

impl NTupleDescriptor {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    #[inline]
    pub fn clusters(&self) -> &[ClusterDescriptor] {
        &self.clusters
    }

    /// Gets a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field_index.get(name).map(|&i| &self.fields[i])
    }

    /// Gets a column by id.
    pub fn column(&self, id: ColumnId) -> Option<&ColumnDescriptor> {
        self.columns.get(id as usize)
    }

    /// Gets the `index`-th column of the named field.
    pub fn find_column_id(&self, field_name: &str, index: u32) -> Option<ColumnId> {
        self.field(field_name)
            .and_then(|f| f.column_ids.get(index as usize).copied())
    }

    /// Gets a cluster by id.
    pub fn cluster(&self, id: ClusterId) -> Option<&ClusterDescriptor> {
        self.clusters.get(id as usize)
    }

    /// Finds the cluster holding element `global_index` of a column.
    pub fn find_cluster_id(&self, column_id: ColumnId, global_index: u64) -> Option<ClusterId> {
        let pos = self.clusters.partition_point(|c| match c.column_range(column_id) {
            Some(r) => r.first_element_index + r.n_elements <= global_index,
            None => true,
        });
        let cluster = self.clusters.get(pos)?;
        cluster
            .column_range(column_id)
            .filter(|r| r.contains(global_index))
            .map(|_| cluster.id())
    }

    /// Finds the cluster holding an entry.
    pub fn find_cluster_for_entry(&self, entry: u64) -> Option<ClusterId> {
        let pos = self
            .clusters
            .partition_point(|c| c.first_entry() + c.n_entries() <= entry);
        self.clusters
            .get(pos)
            .filter(|c| c.entry_range().contains(&entry))
            .map(|c| c.id())
    }

    /// Total number of entries.
    pub fn n_entries(&self) -> u64 {
        self.clusters.iter().map(|c| c.n_entries()).sum()
    }

    /// Total number of elements of a column.
    pub fn n_elements(&self, column_id: ColumnId) -> u64 {
        self.clusters
            .iter()
            .filter_map(|c| c.column_range(column_id))
            .map(|r| r.n_elements)
            .sum()
    }

    /// Entry ranges of all clusters, in order.
    pub fn cluster_entry_ranges(&self) -> Vec<Range<u64>> {
        self.clusters.iter().map(|c| c.entry_range()).collect()
    }

    /// Rebuilds the user-level schema.
    pub fn schema(&self) -> Result<Schema> {
        self.fields
            .iter()
            .try_fold(
                SchemaBuilder::new(&self.name)?.description(&self.description),
                |b, f| b.push(Field::new(&f.name, f.field_type).description(&f.description)),
            )?
            .build()
    }
}

/// Incrementally assembles an `NTupleDescriptor`.
#[derive(Debug, Default)]
pub struct DescriptorBuilder {
    descriptor: NTupleDescriptor,
}

impl DescriptorBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            descriptor: NTupleDescriptor {
                name: name.into(),
                description: description.into(),
                ..NTupleDescriptor::default()
            },
        }
    }

    /// Creates the fields and columns for a schema. Column ids are assigned
    /// in field order; a collection gets an offset column followed by a data column.
    pub fn from_schema(schema: &Schema) -> Self {
        let mut builder = Self::new(schema.name(), schema.description());
        let mut next_column: ColumnId = 0;
        for (id, field) in schema.fields().iter().enumerate() {
            let field_id = id as FieldId;
            let mut elements = Vec::with_capacity(2);
            if field.field_type().is_collection() {
                elements.push(ElementType::Index);
            }
            elements.push(field.field_type().element_type());

            let mut column_ids = Vec::with_capacity(elements.len());
            for (index, element_type) in elements.into_iter().enumerate() {
                builder.descriptor.columns.push(ColumnDescriptor {
                    id: next_column,
                    field_id,
                    element_type,
                    index: index as u32,
                });
                column_ids.push(next_column);
                next_column += 1;
            }
            builder.push_field(FieldDescriptor {
                id: field_id,
                name: field.name().to_string(),
                description: field.get_description().to_string(),
                field_type: field.field_type(),
                column_ids,
            });
        }
        builder
    }

    fn push_field(&mut self, field: FieldDescriptor) {
        self.descriptor
            .field_index
            .insert(field.name.clone(), self.descriptor.fields.len());
        self.descriptor.fields.push(field);
    }

    /// Adds a field read back from a header.
    pub fn add_field(&mut self, field: FieldDescriptor) -> Result<()> {
        if self.descriptor.field_index.contains_key(&field.name) {
            return Err(Error::corrupt("header", format!("duplicate field {}", field.name)));
        }
        self.push_field(field);
        Ok(())
    }

    /// Adds a column read back from a header. Ids must be dense and ascending.
    pub fn add_column(&mut self, column: ColumnDescriptor) -> Result<()> {
        if column.id != self.descriptor.columns.len() as ColumnId {
            return Err(Error::corrupt(
                "header",
                format!("column id {} out of sequence", column.id),
            ));
        }
        self.descriptor.columns.push(column);
        Ok(())
    }

    /// Appends the next cluster.
    pub fn add_cluster(&mut self, cluster: ClusterDescriptor) -> Result<()> {
        let expected_id = self.descriptor.clusters.len() as ClusterId;
        let expected_entry = self.descriptor.n_entries();
        if cluster.id() != expected_id || cluster.first_entry() != expected_entry {
            return Err(Error::corrupt(
                "footer",
                format!(
                    "cluster {} starting at entry {} does not follow cluster {} / entry {}",
                    cluster.id(),
                    cluster.first_entry(),
                    expected_id,
                    expected_entry
                ),
            ));
        }
        self.descriptor.clusters.push(cluster);
        Ok(())
    }

    /// The descriptor built so far.
    #[inline]
    pub fn descriptor(&self) -> &NTupleDescriptor {
        &self.descriptor
    }

    /// Finishes building.
    pub fn build(self) -> NTupleDescriptor {
        self.descriptor
    }
}
