//! Integration tests for writing and reading nTuples.

use quiver_core::schema::{Schema, SchemaBuilder};
use quiver_core::{ElementType, Error, FieldType, Value};
use quiver_storage::{
    ClusterCache, CompressionSettings, MemoryFile, NTupleReader, NTupleWriter, PageSource,
    ReadOptions, WriteOptions,
};

/// Schema with one field per element type plus two collections.
fn all_types_schema() -> Schema {
    SchemaBuilder::new("all_types")
        .unwrap()
        .description("one field per element type")
        .add_field("flag", FieldType::Scalar(ElementType::Bit))
        .unwrap()
        .add_field("byte", FieldType::Scalar(ElementType::Byte))
        .unwrap()
        .add_field("short", FieldType::Scalar(ElementType::Int16))
        .unwrap()
        .add_field("int", FieldType::Scalar(ElementType::Int32))
        .unwrap()
        .add_field("long", FieldType::Scalar(ElementType::Int64))
        .unwrap()
        .add_field("index", FieldType::Scalar(ElementType::Index))
        .unwrap()
        .add_field("float", FieldType::Scalar(ElementType::Real32))
        .unwrap()
        .add_field("double", FieldType::Scalar(ElementType::Real64))
        .unwrap()
        .add_field("energies", FieldType::Collection(ElementType::Real64))
        .unwrap()
        .add_field("mask", FieldType::Collection(ElementType::Bit))
        .unwrap()
        .build()
        .unwrap()
}

fn all_types_row(i: u64) -> Vec<Value> {
    vec![
        Value::Bool(i % 3 == 0),
        Value::UInt8((i % 256) as u8),
        Value::Int16(-(i as i16)),
        Value::Int32(i as i32 * 7),
        Value::Int64(i as i64 * 1_000_000_007),
        Value::UInt32(i as u32),
        Value::Float32(i as f32 / 4.0),
        Value::Float64(i as f64 * 0.1),
        Value::from((0..i % 5).map(|k| k as f64 + i as f64).collect::<Vec<f64>>()),
        Value::from((0..i % 11).map(|k| k % 2 == 0).collect::<Vec<bool>>()),
    ]
}

fn write(file: &MemoryFile, n: u64, options: WriteOptions) {
    let mut writer = NTupleWriter::in_memory(all_types_schema(), file.clone(), options).unwrap();
    for i in 0..n {
        writer.fill(&all_types_row(i)).unwrap();
    }
    writer.commit().unwrap();
}

fn check_all(reader: &NTupleReader, n: u64) {
    assert_eq!(reader.entries(), n);
    let mut flag = reader.scalar::<bool>("flag").unwrap();
    let mut byte = reader.scalar::<u8>("byte").unwrap();
    let mut short = reader.scalar::<i16>("short").unwrap();
    let mut int = reader.scalar::<i32>("int").unwrap();
    let mut long = reader.scalar::<i64>("long").unwrap();
    let mut index = reader.scalar::<u32>("index").unwrap();
    let mut float = reader.scalar::<f32>("float").unwrap();
    let mut double = reader.scalar::<f64>("double").unwrap();
    let mut energies = reader.collection::<f64>("energies").unwrap();
    let mut mask = reader.collection::<bool>("mask").unwrap();
    let mut e = Vec::new();
    let mut m = Vec::new();

    for i in 0..n {
        assert_eq!(flag.get(i).unwrap(), i % 3 == 0);
        assert_eq!(byte.get(i).unwrap(), (i % 256) as u8);
        assert_eq!(short.get(i).unwrap(), -(i as i16));
        assert_eq!(int.get(i).unwrap(), i as i32 * 7);
        assert_eq!(long.get(i).unwrap(), i as i64 * 1_000_000_007);
        assert_eq!(index.get(i).unwrap(), i as u32);
        assert_eq!(float.get(i).unwrap(), i as f32 / 4.0);
        assert_eq!(double.get(i).unwrap(), i as f64 * 0.1);
        energies.read(i, &mut e).unwrap();
        assert_eq!(e, (0..i % 5).map(|k| k as f64 + i as f64).collect::<Vec<_>>());
        mask.read(i, &mut m).unwrap();
        assert_eq!(m, (0..i % 11).map(|k| k % 2 == 0).collect::<Vec<_>>());
    }
}

#[test]
fn test_roundtrip_every_compression() {
    for settings in [
        CompressionSettings::NONE,
        CompressionSettings::LZ4,
        CompressionSettings::ZSTD,
    ] {
        let file = MemoryFile::new();
        let options = WriteOptions::default()
            .compression(settings)
            .elements_per_page(64)
            .entries_per_cluster(300);
        write(&file, 1000, options);

        let reader = NTupleReader::from_memory(&file, ReadOptions::default()).unwrap();
        check_all(&reader, 1000);
        assert_eq!(reader.cluster_entry_ranges().len(), 4);
    }
}

#[test]
fn test_roundtrip_without_cluster_cache() {
    let file = MemoryFile::new();
    write(&file, 500, WriteOptions::default().elements_per_page(50));
    let options = ReadOptions::default().cluster_cache(ClusterCache::Off);
    let reader = NTupleReader::from_memory(&file, options).unwrap();
    check_all(&reader, 500);
    assert_eq!(reader.metrics().n_cluster_loaded, 0);
}

#[test]
fn test_roundtrip_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.qnt");

    let mut writer =
        NTupleWriter::create(all_types_schema(), &path, WriteOptions::default()).unwrap();
    for i in 0..200 {
        writer.fill(&all_types_row(i)).unwrap();
    }
    writer.commit().unwrap();

    let reader = NTupleReader::open(&path).unwrap();
    check_all(&reader, 200);
    let names = reader.field_names();
    assert_eq!(names.len(), 10);
    assert_eq!(names[0], "flag");
    assert_eq!(reader.descriptor().description(), "one field per element type");
    assert_eq!(
        reader.field_type("energies"),
        Some(FieldType::Collection(ElementType::Real64))
    );
}

#[test]
fn test_compression_shrinks_repetitive_data() {
    let schema = SchemaBuilder::new("zeros")
        .unwrap()
        .add_field("x", FieldType::Scalar(ElementType::Int64))
        .unwrap()
        .build()
        .unwrap();
    let sizes: Vec<usize> = [CompressionSettings::NONE, CompressionSettings::LZ4]
        .into_iter()
        .map(|settings| {
            let file = MemoryFile::new();
            let options = WriteOptions::default().compression(settings);
            let mut writer = NTupleWriter::in_memory(schema.clone(), file.clone(), options).unwrap();
            for _ in 0..10_000 {
                writer.fill(&[Value::Int64(0)]).unwrap();
            }
            writer.commit().unwrap();
            file.len()
        })
        .collect();
    assert!(sizes[0] > 80_000);
    assert!(sizes[1] < sizes[0] / 10);
}

#[test]
fn test_empty_dataset() {
    let file = MemoryFile::new();
    write(&file, 0, WriteOptions::default());
    let reader = NTupleReader::from_memory(&file, ReadOptions::default()).unwrap();
    assert_eq!(reader.entries(), 0);
    assert!(reader.cluster_entry_ranges().is_empty());
    assert!(reader.scalar::<f64>("double").unwrap().get(0).is_err());
}

#[test]
fn test_pool_serves_held_page_without_reading() {
    let file = MemoryFile::new();
    write(&file, 100, WriteOptions::default());
    let options = ReadOptions::default().cluster_cache(ClusterCache::Off);
    let reader = NTupleReader::from_memory(&file, options).unwrap();
    let source = reader.source();
    let column = reader.descriptor().find_column_id("double", 0).unwrap();

    let before = reader.metrics().n_read;
    let first = source.populate_page(column, 10).unwrap();
    assert_eq!(reader.metrics().n_read, before + 1);
    let second = source.populate_page(column, 42).unwrap();
    assert_eq!(reader.metrics().n_read, before + 1);
    assert!(first.same_buffer(&second));
    assert_eq!(reader.metrics().n_page_populated, 1);

    source.release_page(first);
    source.release_page(second);
}

#[test]
fn test_cluster_cache_loads_each_cluster_once() {
    let file = MemoryFile::new();
    write(
        &file,
        1000,
        WriteOptions::default()
            .elements_per_page(100)
            .entries_per_cluster(500),
    );
    let reader = NTupleReader::from_memory(&file, ReadOptions::default()).unwrap();
    let mut int = reader.scalar::<i32>("int").unwrap();
    let mut long = reader.scalar::<i64>("long").unwrap();
    for i in 0..1000 {
        int.get(i).unwrap();
        long.get(i).unwrap();
    }
    let metrics = reader.metrics();
    assert_eq!(metrics.n_cluster_loaded, 2);
    assert_eq!(metrics.n_read_v, 2);
    assert_eq!(metrics.n_page_populated, 20);
}

#[test]
fn test_reader_type_errors() {
    let file = MemoryFile::new();
    write(&file, 10, WriteOptions::default());
    let reader = NTupleReader::from_memory(&file, ReadOptions::default()).unwrap();

    assert!(matches!(
        reader.scalar::<i32>("double"),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(
        reader.collection::<f64>("double"),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(
        reader.scalar::<f64>("missing"),
        Err(Error::ColumnNotFound { .. })
    ));
    assert!(matches!(
        reader.typed_reader::<f32>("double"),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_typed_value_readers() {
    let file = MemoryFile::new();
    write(&file, 20, WriteOptions::default());
    let reader = NTupleReader::from_memory(&file, ReadOptions::default()).unwrap();

    let mut double = reader.typed_reader::<f64>("double").unwrap();
    assert_eq!(*double.read(7).unwrap(), 0.7000000000000001);
    let mut energies = reader.typed_reader::<Vec<f64>>("energies").unwrap();
    assert_eq!(energies.read(13).unwrap(), &vec![13.0, 14.0, 15.0]);
    assert!(energies.is_contiguous());
}

#[test]
fn test_cloned_reader_is_independent() {
    let file = MemoryFile::new();
    write(&file, 50, WriteOptions::default());
    let reader = NTupleReader::from_memory(&file, ReadOptions::default()).unwrap();
    let clone = reader.try_clone().unwrap();

    let mut a = clone.scalar::<i32>("int").unwrap();
    assert_eq!(a.get(49).unwrap(), 343);
    assert_eq!(reader.metrics().n_cluster_loaded, 0);
    assert_eq!(clone.metrics().n_cluster_loaded, 1);
}

#[test]
fn test_bad_magic_is_rejected() {
    let file = MemoryFile::new();
    write(&file, 10, WriteOptions::default());
    let mut bytes = file.contents().as_ref().clone();
    bytes[0] ^= 0xff;
    let corrupted = MemoryFile::from_bytes(bytes);
    assert!(matches!(
        NTupleReader::from_memory(&corrupted, ReadOptions::default()),
        Err(Error::Corrupt { .. })
    ));
}

#[test]
fn test_damaged_footer_is_rejected() {
    let file = MemoryFile::new();
    write(&file, 10, WriteOptions::default().compression(CompressionSettings::NONE));
    let mut bytes = file.contents().as_ref().clone();
    // last byte of the footer envelope's checksum
    let at = bytes.len() - 49;
    bytes[at] ^= 0x01;
    let corrupted = MemoryFile::from_bytes(bytes);
    assert!(NTupleReader::from_memory(&corrupted, ReadOptions::default()).is_err());
}

#[test]
fn test_truncated_file_is_rejected() {
    let file = MemoryFile::new();
    write(&file, 10, WriteOptions::default());
    let bytes = file.contents()[..20].to_vec();
    assert!(NTupleReader::from_memory(&MemoryFile::from_bytes(bytes), ReadOptions::default()).is_err());
}

#[test]
fn test_dropped_writer_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abandoned.qnt");
    {
        let mut writer =
            NTupleWriter::create(all_types_schema(), &path, WriteOptions::default()).unwrap();
        writer.fill(&all_types_row(1)).unwrap();
    }
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
