//! Integration tests for graphs over nTuples and external data sources.

use quiver_core::schema::SchemaBuilder;
use quiver_core::{ElementType, Error, FieldType, Value};
use quiver_frame::{DataFrame, ExecutionConfig, LoopType, TrivialSource, VecSource};
use quiver_storage::{MemoryFile, NTupleReader, NTupleWriter, ReadOptions, WriteOptions};

const N_EVENTS: u64 = 1000;

/// Writes `N_EVENTS` entries: `id` = i, `pt` = i / 2, `hits` = i % 4 copies of i.
fn events_file() -> MemoryFile {
    let schema = SchemaBuilder::new("events")
        .unwrap()
        .add_field("id", FieldType::Scalar(ElementType::Int64))
        .unwrap()
        .add_field("pt", FieldType::Scalar(ElementType::Real64))
        .unwrap()
        .add_field("hits", FieldType::Collection(ElementType::Int32))
        .unwrap()
        .build()
        .unwrap();
    let file = MemoryFile::new();
    let options = WriteOptions::default()
        .elements_per_page(64)
        .entries_per_cluster(100);
    let mut writer = NTupleWriter::in_memory(schema, file.clone(), options).unwrap();
    for i in 0..N_EVENTS {
        writer
            .fill(&[
                Value::Int64(i as i64),
                Value::Float64(i as f64 / 2.0),
                Value::from(vec![i as i32; (i % 4) as usize]),
            ])
            .unwrap();
    }
    writer.commit().unwrap();
    file
}

fn events(file: &MemoryFile, config: &ExecutionConfig) -> DataFrame {
    let reader = NTupleReader::from_memory(file, ReadOptions::default()).unwrap();
    DataFrame::from_ntuple(reader, config)
}

#[test]
fn test_ntuple_loop_types() {
    let file = events_file();
    let seq = events(&file, &ExecutionConfig::new());
    let mt = events(&file, &ExecutionConfig::with_threads(4));
    assert_eq!(seq.loop_manager().loop_type(), LoopType::NTuple);
    assert_eq!(mt.loop_manager().loop_type(), LoopType::NTupleMT);
    assert_eq!(seq.column_names(), vec!["id", "pt", "hits"]);
    assert_eq!(seq.column_type_name("hits").unwrap(), "Vec<i32>");
}

#[test]
fn test_ntuple_actions_match_across_slots() {
    let file = events_file();
    let run = |config: ExecutionConfig| {
        let df = events(&file, &config);
        let selected = df.filter(&["id"], |id: &i64| id % 3 == 0).unwrap();
        let count = selected.count().unwrap();
        let pt = selected.sum::<f64>("pt").unwrap();
        let hits = selected.sum::<Vec<i32>>("hits").unwrap();
        let max = df.max::<f64>("pt").unwrap();
        (
            *count.get().unwrap(),
            *pt.get().unwrap(),
            *hits.get().unwrap(),
            *max.get().unwrap(),
        )
    };
    let sequential = run(ExecutionConfig::new());
    let parallel = run(ExecutionConfig::with_threads(4));

    let ids = (0..N_EVENTS).filter(|i| i % 3 == 0);
    let expected_pt: f64 = ids.clone().map(|i| i as f64 / 2.0).sum();
    let expected_hits: f64 = ids.clone().map(|i| (i * (i % 4)) as f64).sum();
    assert_eq!(sequential.0, ids.count() as u64);
    assert_eq!(sequential.1, expected_pt);
    assert_eq!(sequential.2, expected_hits);
    assert_eq!(sequential.3, 499.5);
    assert_eq!(sequential, parallel);
}

#[test]
fn test_ntuple_field_type_mismatch() {
    let file = events_file();
    let df = events(&file, &ExecutionConfig::new());
    assert!(matches!(
        df.sum::<f32>("pt"),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(
        df.take::<Vec<i64>>("hits"),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_ntuple_defines_over_fields() {
    let file = events_file();
    let df = events(&file, &ExecutionConfig::with_threads(2));
    let n_hits = df
        .define("n_hits", &["hits"], |hits: &Vec<i32>| hits.len() as u32)
        .unwrap();
    let most = n_hits
        .reduce("n_hits", |a: &u32, b: &u32| *a.max(b), 0)
        .unwrap();
    let mean = n_hits.mean::<u32>("n_hits").unwrap();
    assert_eq!(*most.get().unwrap(), 3);
    assert_eq!(*mean.get().unwrap(), 1.5);
}

#[test]
fn test_ntuple_runtime_typed_actions() {
    let file = events_file();
    let df = events(&file, &ExecutionConfig::new());
    let head = df.range(0, 3, 1).unwrap();
    let pt = df.sum_dyn("pt").unwrap();
    let hits = df.max_dyn("hits").unwrap();
    let ids = head.take_values("id").unwrap();
    let lists = head.take_values("hits").unwrap();
    assert_eq!(*pt.get().unwrap(), (0..N_EVENTS).map(|i| i as f64 / 2.0).sum::<f64>());
    assert_eq!(*hits.get().unwrap(), 999.0);
    assert_eq!(
        *ids.get().unwrap(),
        vec![Value::Int64(0), Value::Int64(1), Value::Int64(2)]
    );
    assert_eq!(
        *lists.get().unwrap(),
        vec![
            Value::List(vec![]),
            Value::List(vec![Value::Int32(1)]),
            Value::List(vec![Value::Int32(2), Value::Int32(2)]),
        ]
    );
}

#[test]
fn test_ntuple_report_with_threads() {
    let file = events_file();
    let df = events(&file, &ExecutionConfig::with_threads(3));
    let _cut = df
        .filter_named("has_hits", &["hits"], |hits: &Vec<i32>| !hits.is_empty())
        .unwrap()
        .filter_named("high_pt", &["pt"], |pt: &f64| *pt >= 250.0)
        .unwrap();
    let report = df.report().unwrap();
    let report = report.get().unwrap();
    assert_eq!(report.at("has_hits").unwrap().pass(), 750);
    assert_eq!(report.at("high_pt").unwrap().all(), 750);
    assert_eq!(report.at("high_pt").unwrap().pass(), 375);
}

#[test]
fn test_open_from_disk() {
    let file = events_file();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.qvr");
    std::fs::write(&path, file.contents().as_slice()).unwrap();
    let df = DataFrame::open(&path, &ExecutionConfig::with_threads(2)).unwrap();
    let count = df.count().unwrap();
    assert_eq!(*count.get().unwrap(), N_EVENTS);
    assert!(DataFrame::open(dir.path().join("missing.qvr"), &ExecutionConfig::new()).is_err());
}

#[test]
fn test_trivial_source() {
    for config in [ExecutionConfig::new(), ExecutionConfig::with_threads(3)] {
        let df = DataFrame::from_source(Box::new(TrivialSource::new(100)), &config);
        assert_eq!(df.column_names(), vec!["col0"]);
        let sum = df.sum::<u64>("col0").unwrap();
        let odd = df.filter(&["col0"], |e: &u64| e % 2 == 1).unwrap().count().unwrap();
        assert_eq!(*sum.get().unwrap(), 4950.0);
        assert_eq!(*odd.get().unwrap(), 50);

        let again = df.count().unwrap();
        assert_eq!(*again.get().unwrap(), 100);
    }
}

#[test]
fn test_vec_source() {
    let source = |batch: u64| {
        VecSource::new()
            .with_column::<f64>("energy", (0..50).map(|i| i as f64).collect())
            .unwrap()
            .with_column::<Vec<i16>>("tags", (0..50).map(|i| vec![i as i16; 2]).collect())
            .unwrap()
            .batch_size(batch)
    };
    for (batch, config) in [
        (50, ExecutionConfig::new()),
        (7, ExecutionConfig::new()),
        (7, ExecutionConfig::with_threads(2)),
    ] {
        let df = DataFrame::from_source(Box::new(source(batch)), &config);
        assert_eq!(
            df.loop_manager().loop_type().is_parallel(),
            config.n_slots() > 1
        );
        let high = df.filter(&["energy"], |e: &f64| *e >= 40.0).unwrap();
        let n = high.count().unwrap();
        let tags = high.sum::<Vec<i16>>("tags").unwrap();
        assert_eq!(*n.get().unwrap(), 10);
        assert_eq!(*tags.get().unwrap(), 2.0 * (40..50).sum::<i32>() as f64);
    }
}

#[test]
fn test_vec_source_type_checks() {
    let df = DataFrame::from_source(
        Box::new(VecSource::new().with_column::<u8>("b", vec![1, 2, 3]).unwrap()),
        &ExecutionConfig::new(),
    );
    assert_eq!(df.column_type_name("b").unwrap(), "u8");
    assert!(matches!(
        df.sum::<i32>("b"),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(VecSource::new()
        .with_column::<u8>("b", vec![1])
        .unwrap()
        .with_column::<u8>("c", vec![1, 2])
        .is_err());
}
