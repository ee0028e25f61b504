//! Defined (computed) columns.

use crate::column::{Column, ColumnTypes, DefineValue, Expression, SlotContext};
use crate::loop_manager::LoopManager;
use crate::node::{ChildCounter, Node, NodeId, NodeKind};
use crate::report::CutFlowReport;
use crate::slot::SlotCells;
use quiver_core::{Error, Result};
use std::sync::Arc;

/// A define as seen by the loop manager.
pub trait DefineBase: Node {
    fn name(&self) -> &str;

    fn type_name(&self) -> String;

    /// Binds the define's inputs for one slot.
    fn init_slot(&self, ctx: &SlotContext<'_>) -> Result<()>;

    /// Drops the slot's readers.
    fn finalize_slot(&self, slot: usize);

    fn as_node(self: Arc<Self>) -> Arc<dyn Node>;
}

struct DefineSlot<Rd, R> {
    last_entry: Option<u64>,
    value: Option<R>,
    readers: Option<Rd>,
}

/// Computes one value per slot and entry from its input columns.
pub struct Define<Args: ColumnTypes, R: Column> {
    id: NodeId,
    name: String,
    manager: Arc<LoopManager>,
    prev: Arc<dyn Node>,
    expression: Box<dyn Expression<Args, R>>,
    columns: Vec<String>,
    bindings: Args::Bindings,
    slots: SlotCells<DefineSlot<Args::Readers, R>>,
    counter: ChildCounter,
}

impl<Args: ColumnTypes, R: Column> Define<Args, R> {
    pub(crate) fn new(
        name: &str,
        manager: Arc<LoopManager>,
        prev: Arc<dyn Node>,
        expression: Box<dyn Expression<Args, R>>,
        columns: Vec<String>,
        bindings: Args::Bindings,
    ) -> Self {
        let slots = SlotCells::new(manager.n_slots(), || DefineSlot {
            last_entry: None,
            value: None,
            readers: None,
        });
        Self {
            id: manager.next_node_id(),
            name: name.to_string(),
            manager,
            prev,
            expression,
            columns,
            bindings,
            slots,
            counter: ChildCounter::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl<Args: ColumnTypes, R: Column> DefineValue<R> for Define<Args, R> {
    fn value(&self, slot: usize, entry: u64) -> Result<R> {
        let mut guard = self.slots.lock(slot)?;
        let state = &mut *guard;
        if state.last_entry == Some(entry) {
            if let Some(value) = &state.value {
                return Ok(value.clone());
            }
        }
        let readers = state.readers.as_mut().ok_or_else(|| {
            Error::invalid_operation(format!(
                "column {} read before slot {} was initialised",
                self.name, slot
            ))
        })?;
        let values = Args::read(readers, entry)?;
        let value = self.expression.eval(slot, entry, values);
        state.value = Some(value.clone());
        state.last_entry = Some(entry);
        Ok(value)
    }
}

impl<Args: ColumnTypes, R: Column> Node for Define<Args, R> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Define
    }

    fn label(&self) -> String {
        format!("Define\\n{}", self.name)
    }

    fn prev(&self) -> Option<&Arc<dyn Node>> {
        Some(&self.prev)
    }

    fn check_filters(&self, slot: usize, entry: u64) -> Result<bool> {
        self.prev.check_filters(slot, entry)
    }

    fn partial_report(&self, report: &mut CutFlowReport) {
        self.prev.partial_report(report);
    }

    fn incr_children_count(&self) {
        if self.counter.increment() == 1 {
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
    }

    fn init_node(&self) {
        self.slots.for_each(|_, state| {
            state.last_entry = None;
            state.value = None;
        });
    }
}

impl<Args: ColumnTypes, R: Column> DefineBase for Define<Args, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> String {
        crate::column::column_type_name::<R>()
    }

    fn init_slot(&self, ctx: &SlotContext<'_>) -> Result<()> {
        let readers = Args::readers(&self.bindings, ctx)?;
        let mut state = self.slots.lock(ctx.slot)?;
        state.readers = Some(readers);
        state.last_entry = None;
        state.value = None;
        Ok(())
    }

    fn finalize_slot(&self, slot: usize) {
        if let Ok(mut state) = self.slots.lock(slot) {
            state.readers = None;
            state.value = None;
            state.last_entry = None;
        }
    }

    fn as_node(self: Arc<Self>) -> Arc<dyn Node> {
        self
    }
}

impl<Args: ColumnTypes, R: Column> Drop for Define<Args, R> {
    fn drop(&mut self) {
        self.manager.deregister(self.id);
    }
}
