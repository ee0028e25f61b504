//! Binary encoding of the header, footer and anchor.
//!
//! Header and footer are envelopes:
//!
//! ```text
//! [version: u16][min_version: u16][payload_len: u32][payload][crc32: u32]
//! ```
//!
//! All integers are little-endian; strings are a `u32` length followed by UTF-8.
//! The checksum covers everything before it.

use crate::descriptor::{
    ClusterDescriptor, ColumnDescriptor, ColumnRange, DescriptorBuilder, FieldDescriptor, Locator,
    NTupleDescriptor, PageInfo, PageRange,
};
use quiver_core::{ElementType, Error, FieldType, Result};

/// Current envelope version.
pub const ENVELOPE_VERSION: u16 = 1;

/// Magic bytes at the start and end of every nTuple file.
pub const MAGIC: &[u8; 8] = b"QUIVERNT";

/// Size of the serialized anchor in bytes.
pub const ANCHOR_SIZE: usize = 4 + 2 * (8 + 4 + 4) + 4 + MAGIC.len();

const FIELD_SCALAR: u8 = 0;
const FIELD_COLLECTION: u8 = 1;

/// Little-endian byte sink.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buffer.push(v);
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn put_u64(&mut self, v: u64) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_str(&mut self, s: &str) {
        self.put_u32(s.len() as u32);
        self.buffer.extend_from_slice(s.as_bytes());
    }

    pub fn put_locator(&mut self, locator: Locator) {
        self.put_u64(locator.position);
        self.put_u32(locator.bytes_on_storage);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

/// Little-endian byte cursor; every read past the end is a corruption error.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(Error::corrupt(
                self.what,
                format!("truncated at byte {} (wanted {} more)", self.pos, n),
            ));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn get_str(&mut self) -> Result<String> {
        let len = self.get_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::corrupt(self.what, e.to_string()))
    }

    pub fn get_locator(&mut self) -> Result<Locator> {
        Ok(Locator {
            position: self.get_u64()?,
            bytes_on_storage: self.get_u32()?,
        })
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

fn seal(payload: Vec<u8>) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_u16(ENVELOPE_VERSION);
    w.put_u16(ENVELOPE_VERSION);
    w.put_u32(payload.len() as u32);
    let mut buf = w.into_inner();
    buf.extend_from_slice(&payload);
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

fn open<'a>(bytes: &'a [u8], what: &'static str) -> Result<ByteReader<'a>> {
    if bytes.len() < 12 {
        return Err(Error::corrupt(what, "envelope too short"));
    }
    let (body, crc) = bytes.split_at(bytes.len() - 4);
    let mut stored = [0u8; 4];
    stored.copy_from_slice(crc);
    if crc32fast::hash(body) != u32::from_le_bytes(stored) {
        return Err(Error::corrupt(what, "checksum mismatch"));
    }
    let mut r = ByteReader::new(body, what);
    let _version = r.get_u16()?;
    let min_version = r.get_u16()?;
    if min_version > ENVELOPE_VERSION {
        return Err(Error::corrupt(
            what,
            format!("envelope needs reader version {}", min_version),
        ));
    }
    let len = r.get_u32()? as usize;
    if r.remaining() != len {
        return Err(Error::corrupt(what, "payload length mismatch"));
    }
    Ok(r)
}

/// Serializes the schema part of a descriptor.
pub fn serialize_header(desc: &NTupleDescriptor) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_str(desc.name());
    w.put_str(desc.description());
    w.put_u32(desc.fields().len() as u32);
    for field in desc.fields() {
        w.put_u64(field.id);
        w.put_str(&field.name);
        w.put_str(&field.description);
        w.put_u8(match field.field_type {
            FieldType::Scalar(_) => FIELD_SCALAR,
            FieldType::Collection(_) => FIELD_COLLECTION,
        });
        w.put_u8(field.field_type.element_type().tag());
    }
    w.put_u32(desc.columns().len() as u32);
    for column in desc.columns() {
        w.put_u64(column.id);
        w.put_u64(column.field_id);
        w.put_u8(column.element_type.tag());
        w.put_u32(column.index);
    }
    seal(w.into_inner())
}

/// Parses a header into a builder.
pub fn deserialize_header(bytes: &[u8]) -> Result<DescriptorBuilder> {
    let mut r = open(bytes, "header")?;
    let mut builder = DescriptorBuilder::new(r.get_str()?, r.get_str()?);

    let n_fields = r.get_u32()?;
    let mut fields = Vec::with_capacity(n_fields as usize);
    for _ in 0..n_fields {
        let id = r.get_u64()?;
        let name = r.get_str()?;
        let description = r.get_str()?;
        let structure = r.get_u8()?;
        let element = element_from_tag(r.get_u8()?)?;
        let field_type = match structure {
            FIELD_SCALAR => FieldType::Scalar(element),
            FIELD_COLLECTION => FieldType::Collection(element),
            other => return Err(Error::corrupt("header", format!("field structure {}", other))),
        };
        fields.push(FieldDescriptor {
            id,
            name,
            description,
            field_type,
            column_ids: Vec::new(),
        });
    }

    let n_columns = r.get_u32()?;
    for _ in 0..n_columns {
        let column = ColumnDescriptor {
            id: r.get_u64()?,
            field_id: r.get_u64()?,
            element_type: element_from_tag(r.get_u8()?)?,
            index: r.get_u32()?,
        };
        let field = fields
            .iter_mut()
            .find(|f| f.id == column.field_id)
            .ok_or_else(|| Error::corrupt("header", format!("column {} has no field", column.id)))?;
        field.column_ids.push(column.id);
        builder.add_column(column)?;
    }
    for field in fields {
        builder.add_field(field)?;
    }
    Ok(builder)
}

fn element_from_tag(tag: u8) -> Result<ElementType> {
    ElementType::from_tag(tag)
        .ok_or_else(|| Error::corrupt("header", format!("unknown element type tag {}", tag)))
}

/// Serializes the cluster list of a descriptor.
pub fn serialize_footer(desc: &NTupleDescriptor) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_u32(desc.clusters().len() as u32);
    for cluster in desc.clusters() {
        w.put_u64(cluster.id());
        w.put_u64(cluster.first_entry());
        w.put_u64(cluster.n_entries());
        w.put_locator(cluster.locator());
        let ranges = cluster.column_ranges();
        w.put_u32(ranges.len() as u32);
        for range in ranges {
            w.put_u64(range.column_id);
            w.put_u64(range.first_element_index);
            w.put_u64(range.n_elements);
            w.put_u32(range.compression);
            let pages = cluster
                .page_range(range.column_id)
                .map(|p| p.page_infos())
                .unwrap_or(&[]);
            w.put_u32(pages.len() as u32);
            for page in pages {
                w.put_u32(page.n_elements);
                w.put_locator(page.locator);
            }
        }
    }
    seal(w.into_inner())
}

/// Parses a footer and appends its clusters to the builder.
pub fn deserialize_footer(bytes: &[u8], builder: &mut DescriptorBuilder) -> Result<()> {
    let mut r = open(bytes, "footer")?;
    let n_clusters = r.get_u32()?;
    for _ in 0..n_clusters {
        let mut cluster =
            ClusterDescriptor::new(r.get_u64()?, r.get_u64()?, r.get_u64()?, r.get_locator()?);
        let n_ranges = r.get_u32()?;
        for _ in 0..n_ranges {
            let range = ColumnRange {
                column_id: r.get_u64()?,
                first_element_index: r.get_u64()?,
                n_elements: r.get_u64()?,
                compression: r.get_u32()?,
            };
            if builder.descriptor().column(range.column_id).is_none() {
                return Err(Error::corrupt(
                    "footer",
                    format!("unknown column {}", range.column_id),
                ));
            }
            let mut pages = PageRange::new(range.column_id);
            let n_pages = r.get_u32()?;
            for _ in 0..n_pages {
                pages.push(PageInfo {
                    n_elements: r.get_u32()?,
                    locator: r.get_locator()?,
                });
            }
            cluster.add_column(range, pages)?;
        }
        builder.add_cluster(cluster)?;
    }
    Ok(())
}

/// Fixed-size trailer locating header and footer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Anchor {
    pub seek_header: u64,
    pub nbytes_header: u32,
    pub len_header: u32,
    pub seek_footer: u64,
    pub nbytes_footer: u32,
    pub len_footer: u32,
}

impl Anchor {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_u32(ENVELOPE_VERSION as u32);
        w.put_u64(self.seek_header);
        w.put_u32(self.nbytes_header);
        w.put_u32(self.len_header);
        w.put_u64(self.seek_footer);
        w.put_u32(self.nbytes_footer);
        w.put_u32(self.len_footer);
        let mut buf = w.into_inner();
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(MAGIC);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ANCHOR_SIZE {
            return Err(Error::corrupt("anchor", "wrong size"));
        }
        let (body, magic) = bytes.split_at(ANCHOR_SIZE - MAGIC.len());
        if magic != MAGIC {
            return Err(Error::corrupt("anchor", "not a quiver nTuple"));
        }
        let (fields, crc) = body.split_at(body.len() - 4);
        let mut r = ByteReader::new(crc, "anchor");
        if crc32fast::hash(fields) != r.get_u32()? {
            return Err(Error::corrupt("anchor", "checksum mismatch"));
        }
        let mut r = ByteReader::new(fields, "anchor");
        let version = r.get_u32()?;
        if version > ENVELOPE_VERSION as u32 {
            return Err(Error::corrupt("anchor", format!("unsupported version {}", version)));
        }
        Ok(Self {
            seek_header: r.get_u64()?,
            nbytes_header: r.get_u32()?,
            len_header: r.get_u32()?,
            seek_footer: r.get_u64()?,
            nbytes_footer: r.get_u32()?,
            len_footer: r.get_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::schema::SchemaBuilder;

    fn descriptor() -> NTupleDescriptor {
        let schema = SchemaBuilder::new("events")
            .unwrap()
            .description("test sample")
            .add_field("flag", FieldType::Scalar(ElementType::Bit))
            .unwrap()
            .add_field("hits", FieldType::Collection(ElementType::Real64))
            .unwrap()
            .build()
            .unwrap();
        let mut builder = DescriptorBuilder::from_schema(&schema);
        for (id, first) in [(0u64, 0u64), (1, 3)] {
            let mut cluster = ClusterDescriptor::new(
                id,
                first,
                3,
                Locator {
                    position: 8 + id * 64,
                    bytes_on_storage: 64,
                },
            );
            for column_id in 0..3u64 {
                let mut pages = PageRange::new(column_id);
                pages.push(PageInfo {
                    n_elements: 3,
                    locator: Locator {
                        position: 8 + id * 64 + column_id * 16,
                        bytes_on_storage: 16,
                    },
                });
                cluster
                    .add_column(
                        ColumnRange {
                            column_id,
                            first_element_index: first,
                            n_elements: 3,
                            compression: 404,
                        },
                        pages,
                    )
                    .unwrap();
            }
            builder.add_cluster(cluster).unwrap();
        }
        builder.build()
    }

    #[test]
    fn test_header_footer_round_trip() {
        let desc = descriptor();
        let header = serialize_header(&desc);
        let footer = serialize_footer(&desc);

        let mut builder = deserialize_header(&header).unwrap();
        deserialize_footer(&footer, &mut builder).unwrap();
        assert_eq!(builder.build(), desc);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let desc = descriptor();
        let mut header = serialize_header(&desc);
        header[10] ^= 0xff;
        assert!(matches!(
            deserialize_header(&header),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn test_truncated_envelope() {
        let footer = serialize_footer(&descriptor());
        let mut builder = deserialize_header(&serialize_header(&descriptor())).unwrap();
        assert!(deserialize_footer(&footer[..footer.len() / 2], &mut builder).is_err());
    }

    #[test]
    fn test_anchor_round_trip() {
        let anchor = Anchor {
            seek_header: 8,
            nbytes_header: 100,
            len_header: 240,
            seek_footer: 4096,
            nbytes_footer: 50,
            len_footer: 50,
        };
        let bytes = anchor.to_bytes();
        assert_eq!(bytes.len(), ANCHOR_SIZE);
        assert_eq!(Anchor::from_bytes(&bytes).unwrap(), anchor);

        let mut bad = bytes.clone();
        bad[ANCHOR_SIZE - 1] = b'X';
        assert!(Anchor::from_bytes(&bad).is_err());
    }
}
