//! Integration tests for graph building and the event loop.

use quiver_core::Error;
use quiver_frame::{CutFlowReport, DataFrame, ExecutionConfig, FrameNode, Fillable};
use quiver_frame::ColumnTypes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn entries(n: u64, config: &ExecutionConfig) -> (DataFrame, FrameNode) {
    let df = DataFrame::empty(n, config);
    let e = df
        .define_slot_entry("e", &[], |_slot: usize, entry: u64| entry)
        .unwrap();
    (df, e)
}

#[test]
fn test_range_window() {
    let (_df, e) = entries(10, &ExecutionConfig::new());
    let window = e.range(2, 5, 1).unwrap();
    let count = window.count().unwrap();
    let values = window.take::<u64>("e").unwrap();
    assert_eq!(*count.get().unwrap(), 3);
    assert_eq!(*values.get().unwrap(), vec![2, 3, 4]);
}

#[test]
fn test_range_stride() {
    let (_df, e) = entries(10, &ExecutionConfig::new());
    let values = e.range(0, 10, 3).unwrap().take::<u64>("e").unwrap();
    assert_eq!(*values.get().unwrap(), vec![2, 5, 8]);
}

#[test]
fn test_range_rejected_with_several_slots() {
    let df = DataFrame::empty(10, &ExecutionConfig::with_threads(2));
    assert!(matches!(
        df.range(0, 5, 1),
        Err(Error::InvalidOperation { .. })
    ));
}

#[test]
fn test_range_stops_the_loop_early() {
    let (df, e) = entries(1000, &ExecutionConfig::new());
    let processed = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&processed);
    df.register_callback(1, move |_| {
        seen.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });
    let first = e.range(0, 5, 1).unwrap().take::<u64>("e").unwrap();
    assert_eq!(*first.get().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(processed.load(Ordering::Relaxed), 5);
}

#[test]
fn test_range_does_not_stop_sibling_branches() {
    let (_df, e) = entries(1000, &ExecutionConfig::new());
    let head = e.range(0, 5, 1).unwrap().count().unwrap();
    let all = e.count().unwrap();
    assert_eq!(*head.get().unwrap(), 5);
    assert_eq!(*all.get().unwrap(), 1000);
}

#[test]
fn test_sum_is_independent_of_slots() {
    let sum = |config: ExecutionConfig| {
        let df = DataFrame::empty(10_000, &config);
        let x = df
            .define_slot_entry("x", &[], |_slot: usize, entry: u64| entry as f64)
            .unwrap();
        let sum = x.sum::<f64>("x").unwrap();
        *sum.get().unwrap()
    };
    let sequential = sum(ExecutionConfig::new());
    let parallel = sum(ExecutionConfig::with_threads(4));
    assert_eq!(sequential, 49_995_000.0);
    assert_eq!(sequential.to_bits(), parallel.to_bits());
}

fn cut_flow(config: &ExecutionConfig) -> (DataFrame, FrameNode) {
    let (df, e) = entries(128, config);
    let cut2 = e
        .filter_named("cut0", &["e"], |e: &u64| e % 2 == 0 || *e < 6)
        .unwrap()
        .filter_named("cut1", &["e"], |e: &u64| *e >= 10)
        .unwrap()
        .filter_named("cut2", &["e"], |e: &u64| *e < 110)
        .unwrap();
    (df, cut2)
}

fn assert_cut_flow(report: &CutFlowReport) {
    let cuts: Vec<(&str, u64, u64)> = report.iter().map(|c| (c.name(), c.pass(), c.all())).collect();
    assert_eq!(
        cuts,
        vec![("cut0", 67, 128), ("cut1", 59, 67), ("cut2", 50, 59)]
    );
    assert!((report.at("cut0").unwrap().efficiency() - 52.34375).abs() < 1e-9);
}

#[test]
fn test_report_on_chain() {
    let (_df, cut2) = cut_flow(&ExecutionConfig::new());
    let passed = cut2.count().unwrap();
    let report = cut2.report().unwrap();
    assert_eq!(*passed.get().unwrap(), 50);
    assert_cut_flow(report.get().unwrap());
}

#[test]
fn test_report_on_root_without_other_actions() {
    let (df, _cut2) = cut_flow(&ExecutionConfig::with_threads(3));
    let report = df.report().unwrap();
    assert_cut_flow(report.get().unwrap());
    assert!(matches!(
        report.get().unwrap().at("cut3"),
        Err(Error::InvalidOperation { .. })
    ));
}

#[test]
fn test_results_are_lazy() {
    let (df, e) = entries(10, &ExecutionConfig::new());
    let count = e.count().unwrap();
    let sum = e.sum::<u64>("e").unwrap();
    assert_eq!(df.loop_manager().n_runs(), 0);
    assert!(!count.is_ready());

    assert_eq!(*count.get().unwrap(), 10);
    assert!(sum.is_ready());
    assert_eq!(*sum.get().unwrap(), 45.0);
    assert_eq!(df.loop_manager().n_runs(), 1);

    let max = e.max::<u64>("e").unwrap();
    assert_eq!(*max.get().unwrap(), 9.0);
    assert_eq!(*count.get().unwrap(), 10);
    assert_eq!(df.loop_manager().n_runs(), 2);
}

#[test]
fn test_failed_run_leaves_results_unavailable() {
    let (df, e) = entries(10, &ExecutionConfig::new());
    let count = e.count().unwrap();
    df.register_callback(5, |_| Err(Error::invalid_operation("stop here")));
    assert!(matches!(count.get(), Err(Error::InvalidOperation { .. })));
    assert!(matches!(count.get(), Err(Error::ResultUnavailable { .. })));
    assert!(!count.is_ready());
}

#[test]
fn test_type_mismatch_fails_at_booking() {
    let (df, e) = entries(10, &ExecutionConfig::new());
    assert!(matches!(
        e.sum::<f64>("e"),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(
        e.filter(&["e"], |e: &i32| *e > 0),
        Err(Error::TypeMismatch { .. })
    ));
    assert_eq!(df.loop_manager().n_booked_actions(), 0);
}

#[test]
fn test_dropped_actions_are_not_run() {
    let (df, e) = entries(10, &ExecutionConfig::new());
    let kept = e.count().unwrap();
    let dropped = e.sum::<u64>("e").unwrap();
    assert_eq!(df.loop_manager().n_booked_actions(), 2);
    drop(dropped);
    assert_eq!(df.loop_manager().n_booked_actions(), 1);
    assert_eq!(*kept.get().unwrap(), 10);
    assert_eq!(df.loop_manager().n_booked_actions(), 0);
}

#[test]
fn test_defines_and_aliases() {
    let (_df, e) = entries(6, &ExecutionConfig::new());
    let sq = e.define("sq", &["e"], |e: &u64| (e * e) as i64).unwrap();
    let both = sq
        .define("both", &["e", "sq"], |e: &u64, sq: &i64| vec![*e as f32, *sq as f32])
        .unwrap()
        .alias("pair", "both")
        .unwrap();
    assert_eq!(both.column_type_name("pair").unwrap(), "Vec<f32>");
    assert_eq!(both.column_names(), vec!["e", "sq", "both", "pair"]);

    let total = both.sum::<Vec<f32>>("pair").unwrap();
    let squares = both.take::<i64>("sq").unwrap();
    assert_eq!(*total.get().unwrap(), 70.0);
    assert_eq!(*squares.get().unwrap(), vec![0, 1, 4, 9, 16, 25]);
}

#[test]
fn test_define_slot_sees_slot() {
    let df = DataFrame::empty(100, &ExecutionConfig::with_threads(4));
    let slots = df.define_slot("slot", &[], |slot: usize| slot as u32).unwrap();
    let max = slots.max::<u32>("slot").unwrap();
    assert!(*max.get().unwrap() < 4.0);
}

#[test]
fn test_reduce_and_mean() {
    let (_df, e) = entries(5, &ExecutionConfig::with_threads(2));
    let product = e
        .define("p", &["e"], |e: &u64| e + 1)
        .unwrap()
        .reduce("p", |a: &u64, b: &u64| a * b, 1)
        .unwrap();
    let mean = e.mean::<u64>("e").unwrap();
    assert_eq!(*product.get().unwrap(), 120);
    assert_eq!(*mean.get().unwrap(), 2.0);
}

#[test]
fn test_mean_of_nothing_is_nan() {
    let (_df, e) = entries(5, &ExecutionConfig::new());
    let mean = e.filter(&[], || false).unwrap().mean::<u64>("e").unwrap();
    assert!(mean.get().unwrap().is_nan());
}

#[derive(Clone, Debug, PartialEq)]
struct Parity {
    even: u64,
    odd: u64,
}

impl Fillable<(u64,)> for Parity {
    fn fill<'a>(&mut self, values: <(u64,) as ColumnTypes>::Refs<'a>) {
        let (e,) = values;
        if e % 2 == 0 {
            self.even += 1;
        } else {
            self.odd += 1;
        }
    }

    fn merge(&mut self, other: &Self) {
        self.even += other.even;
        self.odd += other.odd;
    }
}

#[test]
fn test_fill_user_object() {
    let (_df, e) = entries(11, &ExecutionConfig::with_threads(3));
    let parity = e.fill(&["e"], Parity { even: 0, odd: 0 }).unwrap();
    assert_eq!(*parity.get().unwrap(), Parity { even: 6, odd: 5 });
}

#[test]
fn test_foreach_runs_immediately() {
    let (df, e) = entries(10, &ExecutionConfig::new());
    let total = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&total);
    e.foreach(&["e"], move |e: &u64| {
        sink.fetch_add(*e, Ordering::Relaxed);
    })
    .unwrap();
    assert_eq!(total.load(Ordering::Relaxed), 45);
    assert_eq!(df.loop_manager().n_runs(), 1);
}

#[test]
fn test_foreach_slot_in_parallel() {
    let (_df, e) = entries(1000, &ExecutionConfig::with_threads(4));
    let totals: Arc<Vec<AtomicU64>> = Arc::new((0..4).map(|_| AtomicU64::new(0)).collect());
    let sink = Arc::clone(&totals);
    e.foreach_slot(&["e"], move |slot: usize, e: &u64| {
        sink[slot].fetch_add(*e, Ordering::Relaxed);
    })
    .unwrap();
    let total: u64 = totals.iter().map(|t| t.load(Ordering::Relaxed)).sum();
    assert_eq!(total, 499_500);
}

#[test]
fn test_take_in_parallel_has_every_entry() {
    let (_df, e) = entries(1000, &ExecutionConfig::with_threads(4));
    let values = e.filter(&["e"], |e: &u64| e % 7 == 0).unwrap().take::<u64>("e").unwrap();
    let mut values = values.get().unwrap().clone();
    values.sort_unstable();
    assert_eq!(values, (0..1000).filter(|e| e % 7 == 0).collect::<Vec<u64>>());
}

#[test]
fn test_partial_results() {
    let (_df, e) = entries(100, &ExecutionConfig::new());
    let count = e.count().unwrap();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    count
        .on_partial_result(25, move |n: &u64| sink.lock().push(*n))
        .unwrap();
    assert_eq!(*count.get().unwrap(), 100);
    assert_eq!(*seen.lock(), vec![25, 50, 75, 100]);
    assert!(matches!(
        count.on_partial_result(25, |_: &u64| {}),
        Err(Error::AlreadyRun { .. })
    ));
}

#[test]
fn test_partial_results_need_support() {
    let (_df, e) = entries(10, &ExecutionConfig::new());
    let report = e.report().unwrap();
    assert!(matches!(
        report.on_partial_result(1, |_: &CutFlowReport| {}),
        Err(Error::Unsupported { .. })
    ));
}

#[test]
fn test_once_per_slot_callbacks() {
    let (df, e) = entries(1000, &ExecutionConfig::with_threads(2));
    let calls = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&calls);
    df.register_callback(0, move |_| {
        seen.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });
    let count = e.count().unwrap();
    assert_eq!(*count.get().unwrap(), 1000);
    assert!(calls.load(Ordering::Relaxed) <= 2);
    assert!(calls.load(Ordering::Relaxed) >= 1);

    let again = e.count().unwrap();
    assert_eq!(*again.get().unwrap(), 1000);
    assert!(calls.load(Ordering::Relaxed) <= 2);
}

#[test]
fn test_graph_dot() {
    let (df, e) = entries(10, &ExecutionConfig::new());
    let cut = e.filter_named("cut", &["e"], |e: &u64| *e > 2).unwrap();
    let _count = cut.count().unwrap();
    let _sum = e.sum::<u64>("e").unwrap();

    let dot = df.graph_dot();
    assert!(dot.starts_with("digraph quiver {"));
    assert!(dot.contains("label=\"Empty source\\n10 entries\""));
    assert!(dot.contains("label=\"Define\\ne\""));
    assert!(dot.contains("label=\"Filter\\ncut\""));
    assert!(dot.contains("label=\"Count\""));
    assert!(dot.contains("label=\"Sum\\ne\""));
    assert_eq!(dot.matches("->").count(), 4);
    assert_eq!(dot.matches("label=\"Define").count(), 1);

    let chain = cut.graph_dot();
    assert_eq!(chain.matches("->").count(), 2);
    assert!(!chain.contains("Count"));
}

#[test]
fn test_save_graph() {
    let (_df, e) = entries(10, &ExecutionConfig::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.dot");
    e.save_graph(&path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), e.graph_dot());
}
