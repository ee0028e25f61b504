//! Filters: predicates gating downstream evaluation.

use crate::column::{ColumnFn, ColumnTypes, SlotContext};
use crate::loop_manager::LoopManager;
use crate::node::{ChildCounter, Node, NodeId, NodeKind};
use crate::report::CutFlowReport;
use crate::slot::SlotCells;
use quiver_core::{Error, Result};
use std::marker::PhantomData;
use std::sync::Arc;

/// A filter as seen by the loop manager.
pub trait FilterBase: Node {
    /// The user-visible name, `None` for anonymous filters.
    fn name(&self) -> Option<&str>;

    fn init_slot(&self, ctx: &SlotContext<'_>) -> Result<()>;

    fn finalize_slot(&self, slot: usize);

    /// Registers a named filter with its predecessor even without children.
    fn trigger_children_count(&self);

    /// Appends this filter's counts, if it is named.
    fn fill_report(&self, report: &mut CutFlowReport);

    fn reset_report_count(&self);

    /// Accepted and rejected entries summed over all slots.
    fn counts(&self) -> (u64, u64);

    fn as_node(self: Arc<Self>) -> Arc<dyn Node>;
}

struct FilterSlot<Rd> {
    last_entry: Option<u64>,
    last_result: bool,
    accepted: u64,
    rejected: u64,
    readers: Option<Rd>,
}

/// Evaluates a predicate at most once per slot and entry.
pub struct Filter<Args: ColumnTypes, F> {
    id: NodeId,
    name: Option<String>,
    manager: Arc<LoopManager>,
    prev: Arc<dyn Node>,
    predicate: F,
    columns: Vec<String>,
    bindings: Args::Bindings,
    slots: SlotCells<FilterSlot<Args::Readers>>,
    counter: ChildCounter,
    _args: PhantomData<fn() -> Args>,
}

impl<Args: ColumnTypes, F: ColumnFn<Args, bool>> Filter<Args, F> {
    pub(crate) fn new(
        name: Option<String>,
        manager: Arc<LoopManager>,
        prev: Arc<dyn Node>,
        predicate: F,
        columns: Vec<String>,
        bindings: Args::Bindings,
    ) -> Self {
        let slots = SlotCells::new(manager.n_slots(), || FilterSlot {
            last_entry: None,
            last_result: false,
            accepted: 0,
            rejected: 0,
            readers: None,
        });
        Self {
            id: manager.next_node_id(),
            name,
            manager,
            prev,
            predicate,
            columns,
            bindings,
            slots,
            counter: ChildCounter::new(),
            _args: PhantomData,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl<Args: ColumnTypes, F: ColumnFn<Args, bool>> Node for Filter<Args, F> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Filter
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("Filter\\n{}", name),
            None => "Filter".to_string(),
        }
    }

    fn prev(&self) -> Option<&Arc<dyn Node>> {
        Some(&self.prev)
    }

    fn check_filters(&self, slot: usize, entry: u64) -> Result<bool> {
        let mut guard = self.slots.lock(slot)?;
        let state = &mut *guard;
        if state.last_entry == Some(entry) {
            return Ok(state.last_result);
        }
        let pass = if self.prev.check_filters(slot, entry)? {
            let readers = state.readers.as_mut().ok_or_else(|| {
                Error::invalid_operation(format!(
                    "filter {} evaluated before slot {} was initialised",
                    self.id, slot
                ))
            })?;
            let values = Args::read(readers, entry)?;
            let pass = self.predicate.call(values);
            if pass {
                state.accepted += 1;
            } else {
                state.rejected += 1;
            }
            pass
        } else {
            false
        };
        state.last_entry = Some(entry);
        state.last_result = pass;
        Ok(pass)
    }

    fn partial_report(&self, report: &mut CutFlowReport) {
        self.prev.partial_report(report);
        self.fill_report(report);
    }

    fn incr_children_count(&self) {
        if self.counter.increment() == 1 && self.name.is_none() {
            self.prev.incr_children_count();
        }
    }

    fn stop_processing(&self) {
        if self.counter.stop() {
            self.prev.stop_processing();
        }
    }

    fn reset_children_count(&self) {
        self.counter.reset();
    }

    fn add_filter_name(&self, names: &mut Vec<String>) {
        self.prev.add_filter_name(names);
        if let Some(name) = &self.name {
            names.push(name.clone());
        }
    }

    fn init_node(&self) {
        self.slots.for_each(|_, state| state.last_entry = None);
        self.reset_report_count();
    }
}

impl<Args: ColumnTypes, F: ColumnFn<Args, bool>> FilterBase for Filter<Args, F> {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn init_slot(&self, ctx: &SlotContext<'_>) -> Result<()> {
        let readers = Args::readers(&self.bindings, ctx)?;
        let mut state = self.slots.lock(ctx.slot)?;
        state.readers = Some(readers);
        state.last_entry = None;
        Ok(())
    }

    fn finalize_slot(&self, slot: usize) {
        if let Ok(mut state) = self.slots.lock(slot) {
            state.readers = None;
            state.last_entry = None;
        }
    }

    fn trigger_children_count(&self) {
        if self.name.is_some() {
            self.prev.incr_children_count();
        }
    }

    fn fill_report(&self, report: &mut CutFlowReport) {
        if let Some(name) = &self.name {
            let (accepted, rejected) = self.counts();
            report.add_cut(name.as_str(), accepted, accepted + rejected);
        }
    }

    fn reset_report_count(&self) {
        self.slots.for_each(|_, state| {
            state.accepted = 0;
            state.rejected = 0;
        });
    }

    fn counts(&self) -> (u64, u64) {
        let mut accepted = 0;
        let mut rejected = 0;
        self.slots.for_each(|_, state| {
            accepted += state.accepted;
            rejected += state.rejected;
        });
        (accepted, rejected)
    }

    fn as_node(self: Arc<Self>) -> Arc<dyn Node> {
        self
    }
}

impl<Args: ColumnTypes, F> Drop for Filter<Args, F> {
    fn drop(&mut self) {
        self.manager.deregister(self.id);
    }
}
