//! The loop manager: root of the graph and driver of the event loop.
//!
//! The manager owns the dataset and books every node created from it. Nodes
//! keep the manager alive; the manager only holds weak handles to nodes, which
//! deregister themselves when dropped. Running the event loop initialises the
//! booked nodes, feeds every entry to every booked action on the slot owning
//! that entry, then finalizes the actions in booking order.

use crate::column::{ColumnRegister, Resolver, SlotContext};
use crate::config::ExecutionConfig;
use crate::node::{ChildCounter, Node, NodeId, NodeKind};
use crate::nodes::{ActionBase, DefineBase, FilterBase};
use crate::report::CutFlowReport;
use crate::slot::{SlotCells, SlotStack};
use crate::source::{split_entries, DataSource};
use parking_lot::{Mutex, RwLock};
use quiver_core::{Error, Result};
use quiver_storage::NTupleReader;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(0);

/// Node id of the loop manager itself.
pub const ROOT_NODE_ID: NodeId = 0;

/// Callback run by the event loop with the slot it fires on.
pub type CallbackFn = Arc<dyn Fn(usize) -> Result<()> + Send + Sync>;

/// How the event loop walks the entries, fixed when the graph is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopType {
    NTuple,
    NTupleMT,
    Empty,
    EmptyMT,
    DataSource,
    DataSourceMT,
}

impl LoopType {
    pub fn is_parallel(&self) -> bool {
        matches!(
            self,
            LoopType::NTupleMT | LoopType::EmptyMT | LoopType::DataSourceMT
        )
    }
}

struct Callback {
    every_n: u64,
    f: CallbackFn,
}

#[derive(Default)]
struct Booked {
    actions: Vec<(NodeId, Weak<dyn ActionBase>)>,
    filters: Vec<(NodeId, bool, Weak<dyn FilterBase>)>,
    ranges: Vec<(NodeId, Weak<dyn Node>)>,
    defines: Vec<(NodeId, Weak<dyn DefineBase>)>,
    callbacks: Vec<Callback>,
    once_callbacks: Vec<CallbackFn>,
}

struct SlotCallback {
    every_n: u64,
    f: CallbackFn,
    counters: SlotCells<u64>,
}

impl SlotCallback {
    fn tick(&self, slot: usize) -> Result<()> {
        let fire = {
            let mut counter = self.counters.lock(slot)?;
            *counter += 1;
            if *counter >= self.every_n {
                *counter = 0;
                true
            } else {
                false
            }
        };
        if fire {
            (self.f)(slot)?;
        }
        Ok(())
    }
}

/// Strong handles to the live booked nodes for the duration of one run.
struct Work {
    actions: Vec<Arc<dyn ActionBase>>,
    filters: Vec<Arc<dyn FilterBase>>,
    named_filters: Vec<Arc<dyn FilterBase>>,
    ranges: Vec<Arc<dyn Node>>,
    defines: Vec<Arc<dyn DefineBase>>,
    callbacks: Vec<SlotCallback>,
    once_callbacks: Vec<CallbackFn>,
    must_run_named_filters: bool,
    initialized: SlotCells<bool>,
}

impl Work {
    /// Marks `slot` initialised; false if it already was.
    fn claim_slot(&self, slot: usize) -> Result<bool> {
        let mut initialized = self.initialized.lock(slot)?;
        Ok(!std::mem::replace(&mut *initialized, true))
    }
}

/// Root of a computation graph.
pub struct LoopManager {
    graph_id: u32,
    next_node_id: AtomicU32,
    n_slots: usize,
    tasks_per_slot: usize,
    loop_type: LoopType,
    n_empty_entries: u64,
    dataset: Option<NTupleReader>,
    source: Option<RwLock<Box<dyn DataSource>>>,
    booked: Mutex<Booked>,
    counter: ChildCounter,
    must_run_named_filters: AtomicBool,
    run_lock: Mutex<()>,
    n_runs: AtomicU32,
    pool: Mutex<Option<Arc<rayon::ThreadPool>>>,
}

impl LoopManager {
    fn with_parts(
        config: &ExecutionConfig,
        loop_types: (LoopType, LoopType),
        n_empty_entries: u64,
        dataset: Option<NTupleReader>,
        source: Option<Box<dyn DataSource>>,
    ) -> Arc<Self> {
        let n_slots = config.n_slots().max(1);
        let loop_type = if n_slots > 1 {
            loop_types.1
        } else {
            loop_types.0
        };
        let manager = Self {
            graph_id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            next_node_id: AtomicU32::new(ROOT_NODE_ID + 1),
            n_slots,
            tasks_per_slot: config.get_tasks_per_slot(),
            loop_type,
            n_empty_entries,
            dataset,
            source: source.map(RwLock::new),
            booked: Mutex::new(Booked::default()),
            counter: ChildCounter::new(),
            must_run_named_filters: AtomicBool::new(true),
            run_lock: Mutex::new(()),
            n_runs: AtomicU32::new(0),
            pool: Mutex::new(None),
        };
        log::debug!(
            "graph {}: created {:?} loop manager with {} slots",
            manager.graph_id,
            manager.loop_type,
            manager.n_slots
        );
        Arc::new(manager)
    }

    /// A graph over `n_entries` entries without columns.
    pub fn empty(n_entries: u64, config: &ExecutionConfig) -> Arc<Self> {
        Self::with_parts(
            config,
            (LoopType::Empty, LoopType::EmptyMT),
            n_entries,
            None,
            None,
        )
    }

    /// A graph over the entries of an nTuple.
    pub fn from_ntuple(reader: NTupleReader, config: &ExecutionConfig) -> Arc<Self> {
        Self::with_parts(
            config,
            (LoopType::NTuple, LoopType::NTupleMT),
            0,
            Some(reader),
            None,
        )
    }

    /// A graph over the entries of an external data source.
    pub fn from_source(mut source: Box<dyn DataSource>, config: &ExecutionConfig) -> Arc<Self> {
        source.set_n_slots(config.n_slots().max(1));
        Self::with_parts(
            config,
            (LoopType::DataSource, LoopType::DataSourceMT),
            0,
            None,
            Some(source),
        )
    }

    #[inline]
    pub fn graph_id(&self) -> u32 {
        self.graph_id
    }

    #[inline]
    pub fn n_slots(&self) -> usize {
        self.n_slots
    }

    #[inline]
    pub fn loop_type(&self) -> LoopType {
        self.loop_type
    }

    /// Number of event loops run so far.
    pub fn n_runs(&self) -> u32 {
        self.n_runs.load(Ordering::Acquire)
    }

    pub fn dataset(&self) -> Option<&NTupleReader> {
        self.dataset.as_ref()
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        self.next_node_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Calls `f` with a resolver over `register` and this graph's columns.
    pub fn with_resolver<T>(&self, register: &ColumnRegister, f: impl FnOnce(&Resolver<'_>) -> T) -> T {
        let guard = self.source.as_ref().map(|s| s.read());
        let source = guard.as_deref().map(|s| &**s);
        let resolver = Resolver::new(register, self.dataset.as_ref(), source);
        f(&resolver)
    }

    pub(crate) fn book_action(&self, id: NodeId, action: Weak<dyn ActionBase>) {
        log::debug!("graph {}: booked action {}", self.graph_id, id);
        self.booked.lock().actions.push((id, action));
    }

    pub(crate) fn book_filter(&self, id: NodeId, named: bool, filter: Weak<dyn FilterBase>) {
        log::debug!("graph {}: booked filter {}", self.graph_id, id);
        self.booked.lock().filters.push((id, named, filter));
    }

    pub(crate) fn book_range(&self, id: NodeId, range: Weak<dyn Node>) {
        log::debug!("graph {}: booked range {}", self.graph_id, id);
        self.booked.lock().ranges.push((id, range));
    }

    pub(crate) fn book_define(&self, id: NodeId, define: Weak<dyn DefineBase>) {
        log::debug!("graph {}: booked define {}", self.graph_id, id);
        self.booked.lock().defines.push((id, define));
    }

    /// Removes a node from the booking lists; called from node destructors.
    pub fn deregister(&self, id: NodeId) {
        let mut booked = self.booked.lock();
        booked.actions.retain(|(i, _)| *i != id);
        booked.filters.retain(|(i, _, _)| *i != id);
        booked.ranges.retain(|(i, _)| *i != id);
        booked.defines.retain(|(i, _)| *i != id);
        log::debug!("graph {}: deregistered node {}", self.graph_id, id);
    }

    /// Number of live booked actions that have not run yet.
    pub fn n_booked_actions(&self) -> usize {
        self.booked
            .lock()
            .actions
            .iter()
            .filter(|(_, a)| a.strong_count() > 0)
            .count()
    }

    /// Registers a callback for the next event loop: every `every_n` entries
    /// processed by a slot, or once per slot when `every_n` is `0`.
    pub fn register_callback(
        &self,
        every_n: u64,
        f: impl Fn(usize) -> Result<()> + Send + Sync + 'static,
    ) {
        let mut booked = self.booked.lock();
        if every_n == 0 {
            booked.once_callbacks.push(Arc::new(f));
        } else {
            booked.callbacks.push(Callback {
                every_n,
                f: Arc::new(f),
            });
        }
    }

    /// Live named filters in booking order.
    pub(crate) fn named_filters(&self) -> Vec<Arc<dyn FilterBase>> {
        let booked = self.booked.lock();
        booked
            .filters
            .iter()
            .filter(|(_, named, _)| *named)
            .filter_map(|(_, _, f)| f.upgrade())
            .collect()
    }

    /// Live actions, filters, ranges and defines, for graph rendering.
    pub(crate) fn live_nodes(&self) -> (Vec<Arc<dyn ActionBase>>, Vec<Arc<dyn Node>>) {
        let booked = self.booked.lock();
        let actions = booked.actions.iter().filter_map(|(_, a)| a.upgrade()).collect();
        let mut nodes: Vec<Arc<dyn Node>> = Vec::new();
        nodes.extend(booked.filters.iter().filter_map(|(_, _, f)| f.upgrade().map(|f| f.as_node())));
        nodes.extend(booked.ranges.iter().filter_map(|(_, r)| r.upgrade()));
        nodes.extend(booked.defines.iter().filter_map(|(_, d)| d.upgrade().map(|d| d.as_node())));
        (actions, nodes)
    }

    /// Short description of what the graph runs over.
    pub fn describe(&self) -> String {
        if let Some(dataset) = &self.dataset {
            return format!(
                "nTuple {}\\n{} entries",
                dataset.descriptor().name(),
                dataset.entries()
            );
        }
        if let Some(source) = &self.source {
            return source.read().label();
        }
        format!("Empty source\\n{} entries", self.n_empty_entries)
    }

    fn snapshot(&self) -> Work {
        let booked = self.booked.lock();
        let filters: Vec<(bool, Arc<dyn FilterBase>)> = booked
            .filters
            .iter()
            .filter_map(|(_, named, f)| f.upgrade().map(|f| (*named, f)))
            .collect();
        let named_filters = filters
            .iter()
            .filter(|(named, _)| *named)
            .map(|(_, f)| Arc::clone(f))
            .collect();
        Work {
            actions: booked.actions.iter().filter_map(|(_, a)| a.upgrade()).collect(),
            filters: filters.into_iter().map(|(_, f)| f).collect(),
            named_filters,
            ranges: booked.ranges.iter().filter_map(|(_, r)| r.upgrade()).collect(),
            defines: booked.defines.iter().filter_map(|(_, d)| d.upgrade()).collect(),
            callbacks: booked
                .callbacks
                .iter()
                .map(|c| SlotCallback {
                    every_n: c.every_n,
                    f: Arc::clone(&c.f),
                    counters: SlotCells::new(self.n_slots, || 0),
                })
                .collect(),
            once_callbacks: booked.once_callbacks.clone(),
            must_run_named_filters: self.must_run_named_filters.load(Ordering::Acquire),
            initialized: SlotCells::new(self.n_slots, || false),
        }
    }

    /// Runs the event loop for every booked action.
    ///
    /// Must not be called from a callback or an expression of this graph.
    pub fn run(&self) -> Result<()> {
        let _running = self.run_lock.lock();
        let work = self.snapshot();
        let named_only = work.must_run_named_filters && !work.named_filters.is_empty();
        if work.actions.is_empty() && !named_only {
            log::warn!(
                "graph {}: event loop requested but no action is booked",
                self.graph_id
            );
            return Ok(());
        }

        let started = Instant::now();
        log::info!(
            "graph {}: starting {:?} event loop on {} slots with {} actions",
            self.graph_id,
            self.loop_type,
            self.n_slots,
            work.actions.len()
        );

        let outcome = self
            .init_nodes(&work)
            .and_then(|_| self.run_loop(&work));
        self.finalize_slots(&work);
        let outcome = outcome.and_then(|processed| {
            let mut first_error = None;
            for action in &work.actions {
                if let Err(e) = action.finalize() {
                    log::error!("action {} failed to finalize: {}", action.name(), e);
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(processed), Err)
        });

        match &outcome {
            Ok(processed) => log::info!(
                "graph {}: event loop finished, {} entries in {:?}",
                self.graph_id,
                processed,
                started.elapsed()
            ),
            Err(e) => {
                log::error!("graph {}: event loop failed: {}", self.graph_id, e);
                let reason = e.to_string();
                for action in &work.actions {
                    action.abandon(&reason);
                }
            }
        }

        self.clean_up(&work);
        self.n_runs.fetch_add(1, Ordering::AcqRel);
        drop(work);
        outcome.map(|_| ())
    }

    fn init_nodes(&self, work: &Work) -> Result<()> {
        for action in &work.actions {
            action.trigger_children_count();
        }
        if work.must_run_named_filters {
            for filter in &work.named_filters {
                filter.trigger_children_count();
            }
        }
        for filter in &work.filters {
            filter.init_node();
        }
        for range in &work.ranges {
            range.init_node();
        }
        for define in &work.defines {
            define.init_node();
        }
        for action in &work.actions {
            action.initialize()?;
        }
        Ok(())
    }

    fn init_node_slots(&self, work: &Work, ctx: &SlotContext<'_>) -> Result<()> {
        for define in &work.defines {
            define.init_slot(ctx)?;
        }
        for filter in &work.filters {
            filter.init_slot(ctx)?;
        }
        for action in &work.actions {
            action.init_slot(ctx)?;
        }
        for callback in &work.once_callbacks {
            callback(ctx.slot)?;
        }
        Ok(())
    }

    /// Binds every node's readers for `slot` the first time the slot is used in a run.
    fn ensure_slot(&self, work: &Work, slot: usize, source: Option<&dyn DataSource>) -> Result<()> {
        if !work.claim_slot(slot)? {
            return Ok(());
        }
        let dataset = match &self.dataset {
            Some(reader) if self.n_slots > 1 => Some(reader.try_clone()?),
            Some(reader) => Some(reader.clone()),
            None => None,
        };
        let mut ctx = SlotContext::new(slot);
        if let Some(reader) = &dataset {
            ctx = ctx.with_dataset(reader);
        }
        if let Some(source) = source {
            ctx = ctx.with_source(source);
        }
        self.init_node_slots(work, &ctx)
    }

    fn finalize_slots(&self, work: &Work) {
        work.initialized.for_each(|slot, initialized| {
            if !*initialized {
                return;
            }
            for define in &work.defines {
                define.finalize_slot(slot);
            }
            for filter in &work.filters {
                filter.finalize_slot(slot);
            }
            for action in &work.actions {
                action.finalize_slot(slot);
            }
        });
    }

    fn run_loop(&self, work: &Work) -> Result<u64> {
        match self.loop_type {
            LoopType::Empty => self.run_task(work, 0, 0..self.n_empty_entries, None),
            LoopType::EmptyMT => {
                let ranges = split_entries(self.n_empty_entries, self.n_slots * self.tasks_per_slot);
                self.run_parallel(work, &ranges, None)
            }
            LoopType::NTuple => {
                let n_entries = self.dataset.as_ref().map(|d| d.entries()).unwrap_or(0);
                self.run_task(work, 0, 0..n_entries, None)
            }
            LoopType::NTupleMT => {
                let ranges = self
                    .dataset
                    .as_ref()
                    .map(|d| d.cluster_entry_ranges())
                    .unwrap_or_default();
                self.run_parallel(work, &ranges, None)
            }
            LoopType::DataSource | LoopType::DataSourceMT => self.run_data_source(work),
        }
    }

    fn run_data_source(&self, work: &Work) -> Result<u64> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| Error::invalid_operation("graph has no data source"))?;
        source.write().initialise();
        let outcome = (|| -> Result<u64> {
            let mut processed = 0;
            loop {
                let ranges = source.write().entry_ranges()?;
                if ranges.is_empty() {
                    break;
                }
                let guard = source.read();
                let src: &dyn DataSource = &**guard;
                if self.n_slots > 1 {
                    processed += self.run_parallel(work, &ranges, Some(src))?;
                } else {
                    for range in ranges {
                        processed += self.run_task(work, 0, range, Some(src))?;
                    }
                }
                if self.counter.all_stopped() {
                    break;
                }
            }
            Ok(processed)
        })();
        source.write().finalise();
        outcome
    }

    fn pool(&self) -> Result<Arc<rayon::ThreadPool>> {
        let mut pool = self.pool.lock();
        if let Some(pool) = pool.as_ref() {
            return Ok(Arc::clone(pool));
        }
        let graph_id = self.graph_id;
        let built = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_slots)
            .thread_name(move |i| format!("quiver-{}-{}", graph_id, i))
            .build()
            .map_err(|e| {
                Error::invalid_operation(format!(
                    "cannot start {} worker threads: {}",
                    self.n_slots, e
                ))
            })?;
        let built = Arc::new(built);
        *pool = Some(Arc::clone(&built));
        Ok(built)
    }

    fn run_parallel(
        &self,
        work: &Work,
        ranges: &[Range<u64>],
        source: Option<&dyn DataSource>,
    ) -> Result<u64> {
        use rayon::prelude::*;

        let pool = self.pool()?;
        let slots = SlotStack::new(self.n_slots);
        pool.install(|| {
            ranges
                .par_iter()
                .map(|range| {
                    let slot = slots.pop()?;
                    let result = self.run_task(work, slot, range.clone(), source);
                    slots.push(slot)?;
                    result
                })
                .try_reduce(|| 0, |a, b| Ok(a + b))
        })
    }

    fn run_task(
        &self,
        work: &Work,
        slot: usize,
        range: Range<u64>,
        source: Option<&dyn DataSource>,
    ) -> Result<u64> {
        self.ensure_slot(work, slot, source)?;
        if let Some(source) = source {
            source.init_slot(slot, range.start)?;
        }
        let mut processed = 0;
        for entry in range {
            if self.counter.all_stopped() {
                break;
            }
            if let Some(source) = source {
                if !source.set_entry(slot, entry)? {
                    continue;
                }
            }
            self.run_and_check_filters(work, slot, entry)?;
            processed += 1;
        }
        if let Some(source) = source {
            source.finalise_slot(slot)?;
        }
        Ok(processed)
    }

    fn run_and_check_filters(&self, work: &Work, slot: usize, entry: u64) -> Result<()> {
        for action in &work.actions {
            action.run(slot, entry)?;
        }
        if work.must_run_named_filters {
            for filter in &work.named_filters {
                filter.check_filters(slot, entry)?;
            }
        }
        for callback in &work.callbacks {
            callback.tick(slot)?;
        }
        Ok(())
    }

    fn clean_up(&self, work: &Work) {
        {
            let mut booked = self.booked.lock();
            booked
                .actions
                .retain(|(id, _)| !work.actions.iter().any(|a| a.id() == *id));
            booked.callbacks.clear();
            booked.once_callbacks.clear();
        }
        self.must_run_named_filters.store(false, Ordering::Release);
        self.counter.reset();
        for filter in &work.filters {
            filter.reset_children_count();
        }
        for range in &work.ranges {
            range.reset_children_count();
        }
        for define in &work.defines {
            define.reset_children_count();
        }
    }
}

impl Node for LoopManager {
    fn id(&self) -> NodeId {
        ROOT_NODE_ID
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Root
    }

    fn label(&self) -> String {
        self.describe()
    }

    fn prev(&self) -> Option<&Arc<dyn Node>> {
        None
    }

    fn check_filters(&self, _slot: usize, _entry: u64) -> Result<bool> {
        Ok(true)
    }

    fn report(&self, report: &mut CutFlowReport) {
        for filter in self.named_filters() {
            filter.fill_report(report);
        }
    }

    fn partial_report(&self, _report: &mut CutFlowReport) {}

    fn incr_children_count(&self) {
        self.counter.increment();
    }

    fn stop_processing(&self) {
        self.counter.stop();
    }

    fn reset_children_count(&self) {
        self.counter.reset();
    }

    fn add_filter_name(&self, _names: &mut Vec<String>) {}
}

impl std::fmt::Debug for LoopManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopManager")
            .field("graph_id", &self.graph_id)
            .field("loop_type", &self.loop_type)
            .field("n_slots", &self.n_slots)
            .field("n_runs", &self.n_runs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_loop_type_follows_slots() {
        let seq = LoopManager::empty(10, &ExecutionConfig::new());
        assert_eq!(seq.loop_type(), LoopType::Empty);
        assert_eq!(seq.n_slots(), 1);

        let mt = LoopManager::empty(10, &ExecutionConfig::with_threads(3));
        assert_eq!(mt.loop_type(), LoopType::EmptyMT);
        assert!(mt.loop_type().is_parallel());
        assert_ne!(seq.graph_id(), mt.graph_id());
    }

    #[test]
    fn test_run_without_actions_is_a_no_op() {
        let manager = LoopManager::empty(10, &ExecutionConfig::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        manager.register_callback(1, move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        manager.run().unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(manager.n_runs(), 0);
    }

    #[test]
    fn test_root_node() {
        let manager = LoopManager::empty(5, &ExecutionConfig::new());
        assert!(manager.check_filters(0, 3).unwrap());
        assert_eq!(Node::id(manager.as_ref()), ROOT_NODE_ID);
        assert!(manager.prev().is_none());
        assert_eq!(manager.describe(), "Empty source\\n5 entries");

        manager.incr_children_count();
        manager.stop_processing();
        assert!(manager.counter.all_stopped());
        manager.reset_children_count();
        assert!(!manager.counter.all_stopped());
    }
}
