//! Benchmarks for writing and reading paged columns.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quiver_core::schema::{Schema, SchemaBuilder};
use quiver_core::{ElementType, FieldType, Value};
use quiver_storage::{
    ClusterCache, CompressionSettings, MemoryFile, NTupleReader, NTupleWriter, ReadOptions,
    WriteOptions,
};

fn create_schema() -> Schema {
    SchemaBuilder::new("bench")
        .unwrap()
        .add_field("pt", FieldType::Scalar(ElementType::Real64))
        .unwrap()
        .add_field("tracks", FieldType::Collection(ElementType::Real32))
        .unwrap()
        .build()
        .unwrap()
}

fn populate(file: &MemoryFile, count: u64, settings: CompressionSettings) {
    let options = WriteOptions::default().compression(settings);
    let mut writer = NTupleWriter::in_memory(create_schema(), file.clone(), options).unwrap();
    for i in 0..count {
        let tracks: Vec<f32> = (0..i % 8).map(|k| (i + k) as f32 * 0.25).collect();
        writer
            .fill(&[Value::Float64(i as f64 * 0.5), Value::from(tracks)])
            .unwrap();
    }
    writer.commit().unwrap();
}

const SETTINGS: [(&str, CompressionSettings); 3] = [
    ("none", CompressionSettings::NONE),
    ("lz4", CompressionSettings::LZ4),
    ("zstd", CompressionSettings::ZSTD),
];

fn write_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("ntuple_write");
    group.sample_size(20);
    for (name, settings) in SETTINGS {
        group.bench_with_input(BenchmarkId::new("fill_commit", name), &settings, |b, &s| {
            b.iter(|| {
                let file = MemoryFile::new();
                populate(&file, black_box(100_000), s);
                file.len()
            })
        });
    }
    group.finish();
}

fn read_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("ntuple_read");
    group.sample_size(20);
    for (name, settings) in SETTINGS {
        let file = MemoryFile::new();
        populate(&file, 100_000, settings);
        for cache in [ClusterCache::On, ClusterCache::Off] {
            let id = format!("{}/{:?}", name, cache);
            group.bench_function(BenchmarkId::new("scalar_scan", &id), |b| {
                b.iter(|| {
                    let options = ReadOptions::default().cluster_cache(cache);
                    let reader = NTupleReader::from_memory(&file, options).unwrap();
                    let mut pt = reader.scalar::<f64>("pt").unwrap();
                    let mut sum = 0.0;
                    for i in 0..reader.entries() {
                        sum += pt.get(i).unwrap();
                    }
                    black_box(sum)
                })
            });
        }
        group.bench_function(BenchmarkId::new("collection_scan", name), |b| {
            b.iter(|| {
                let reader = NTupleReader::from_memory(&file, ReadOptions::default()).unwrap();
                let mut tracks = reader.collection::<f32>("tracks").unwrap();
                let mut buf = Vec::new();
                let mut n = 0usize;
                for i in 0..reader.entries() {
                    tracks.read(i, &mut buf).unwrap();
                    n += buf.len();
                }
                black_box(n)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, write_benchmark, read_benchmark);
criterion_main!(benches);
