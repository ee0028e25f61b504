//! Benchmarks for the event loop over empty sources and nTuples.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quiver_core::schema::SchemaBuilder;
use quiver_core::{ElementType, FieldType, Value};
use quiver_frame::{DataFrame, ExecutionConfig};
use quiver_storage::{MemoryFile, NTupleReader, NTupleWriter, ReadOptions, WriteOptions};

const THREADS: [usize; 3] = [1, 2, 4];

fn populate(count: u64) -> MemoryFile {
    let schema = SchemaBuilder::new("bench")
        .unwrap()
        .add_field("pt", FieldType::Scalar(ElementType::Real64))
        .unwrap()
        .add_field("tracks", FieldType::Collection(ElementType::Real32))
        .unwrap()
        .build()
        .unwrap();
    let file = MemoryFile::new();
    let options = WriteOptions::default().entries_per_cluster(10_000);
    let mut writer = NTupleWriter::in_memory(schema, file.clone(), options).unwrap();
    for i in 0..count {
        let tracks: Vec<f32> = (0..i % 8).map(|k| (i + k) as f32 * 0.25).collect();
        writer
            .fill(&[Value::Float64(i as f64 * 0.5), Value::from(tracks)])
            .unwrap();
    }
    writer.commit().unwrap();
    file
}

fn config(threads: usize) -> ExecutionConfig {
    if threads > 1 {
        ExecutionConfig::with_threads(threads)
    } else {
        ExecutionConfig::new()
    }
}

fn empty_source_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("empty_source");
    group.sample_size(20);
    for threads in THREADS {
        group.bench_with_input(BenchmarkId::new("define_filter_sum", threads), &threads, |b, &t| {
            b.iter(|| {
                let df = DataFrame::empty(black_box(1_000_000), &config(t));
                let sum = df
                    .define_slot_entry("x", &[], |_slot: usize, entry: u64| entry as f64 * 0.5)
                    .unwrap()
                    .filter(&["x"], |x: &f64| *x > 1000.0)
                    .unwrap()
                    .sum::<f64>("x")
                    .unwrap();
                *sum.get().unwrap()
            })
        });
    }
    group.finish();
}

fn ntuple_benchmark(c: &mut Criterion) {
    let file = populate(200_000);
    let mut group = c.benchmark_group("ntuple");
    group.sample_size(20);
    for threads in THREADS {
        group.bench_with_input(BenchmarkId::new("filter_mean_tracks", threads), &threads, |b, &t| {
            b.iter(|| {
                let reader = NTupleReader::from_memory(&file, ReadOptions::default()).unwrap();
                let df = DataFrame::from_ntuple(reader, &config(t));
                let selected = df.filter(&["pt"], |pt: &f64| *pt > 100.0).unwrap();
                let mean = selected.mean::<Vec<f32>>("tracks").unwrap();
                let count = selected.count().unwrap();
                (*mean.get().unwrap(), *count.get().unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, empty_source_benchmark, ntuple_benchmark);
criterion_main!(benches);
