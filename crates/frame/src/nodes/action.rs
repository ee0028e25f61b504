//! Actions: the leaves of the graph that accumulate results.

use crate::column::{ColumnTypes, SlotContext};
use crate::loop_manager::LoopManager;
use crate::node::{Node, NodeId};
use crate::slot::SlotCells;
use parking_lot::Mutex;
use quiver_core::{Error, Result};
use std::any::Any;
use std::sync::{Arc, OnceLock};

/// The accumulator behind an action.
///
/// A helper keeps whatever per-slot state it needs; `exec` is only ever called
/// for a slot by the worker owning that slot. `finalize` merges the per-slot
/// partial results and must not depend on the order slots finished in.
pub trait ActionHelper<Args: ColumnTypes>: Send + Sync + 'static {
    type Result: Send + Sync + 'static;

    fn name(&self) -> &str;

    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn init_slot(&self, _slot: usize) -> Result<()> {
        Ok(())
    }

    fn exec<'a>(&self, slot: usize, values: Args::Refs<'a>) -> Result<()>;

    fn finalize(&self) -> Result<Self::Result>;

    fn supports_partial_update(&self) -> bool {
        false
    }

    /// The not yet merged result of one slot.
    fn partial_update(&self, _slot: usize) -> Result<Self::Result> {
        Err(Error::unsupported(format!(
            "{} does not provide partial results",
            self.name()
        )))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ActionState {
    Booked,
    Initialized,
    Finalized,
    Failed,
}

/// An action as seen by the loop manager.
pub trait ActionBase: Send + Sync {
    fn id(&self) -> NodeId;

    fn name(&self) -> &str;

    fn prev(&self) -> &Arc<dyn Node>;

    fn columns(&self) -> &[String];

    /// Registers this action as a child of its predecessor.
    fn trigger_children_count(&self);

    fn initialize(&self) -> Result<()>;

    fn init_slot(&self, ctx: &SlotContext<'_>) -> Result<()>;

    /// Processes one entry if it passes the upstream filters.
    fn run(&self, slot: usize, entry: u64) -> Result<()>;

    fn finalize_slot(&self, slot: usize);

    /// Merges the slot results and publishes the final result.
    fn finalize(&self) -> Result<()>;

    /// Marks the action as failed; its result never becomes available.
    fn abandon(&self, reason: &str);

    fn has_run(&self) -> bool;

    fn supports_partial_update(&self) -> bool;

    /// A boxed `Helper::Result` with the current state of one slot.
    fn partial_update(&self, slot: usize) -> Result<Box<dyn Any + Send>>;
}

/// An action reading `Args` and accumulating with `H`.
pub struct Action<Args: ColumnTypes, H: ActionHelper<Args>> {
    id: NodeId,
    manager: Arc<LoopManager>,
    prev: Arc<dyn Node>,
    helper: H,
    columns: Vec<String>,
    bindings: Args::Bindings,
    readers: SlotCells<Option<Args::Readers>>,
    state: Mutex<ActionState>,
    result: Arc<OnceLock<H::Result>>,
}

impl<Args: ColumnTypes, H: ActionHelper<Args>> Action<Args, H> {
    pub(crate) fn new(
        manager: Arc<LoopManager>,
        prev: Arc<dyn Node>,
        helper: H,
        columns: Vec<String>,
        bindings: Args::Bindings,
    ) -> Self {
        Self {
            id: manager.next_node_id(),
            readers: SlotCells::new(manager.n_slots(), || None),
            manager,
            prev,
            helper,
            columns,
            bindings,
            state: Mutex::new(ActionState::Booked),
            result: Arc::new(OnceLock::new()),
        }
    }

    /// The cell the final result is published to.
    pub fn result(&self) -> Arc<OnceLock<H::Result>> {
        Arc::clone(&self.result)
    }

    pub fn helper(&self) -> &H {
        &self.helper
    }
}

impl<Args: ColumnTypes, H: ActionHelper<Args>> ActionBase for Action<Args, H> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        self.helper.name()
    }

    fn prev(&self) -> &Arc<dyn Node> {
        &self.prev
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn trigger_children_count(&self) {
        self.prev.incr_children_count();
    }

    fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != ActionState::Booked {
            return Err(Error::already_run(self.helper.name()));
        }
        self.helper.initialize()?;
        *state = ActionState::Initialized;
        Ok(())
    }

    fn init_slot(&self, ctx: &SlotContext<'_>) -> Result<()> {
        let readers = Args::readers(&self.bindings, ctx)?;
        *self.readers.lock(ctx.slot)? = Some(readers);
        self.helper.init_slot(ctx.slot)
    }

    fn run(&self, slot: usize, entry: u64) -> Result<()> {
        if !self.prev.check_filters(slot, entry)? {
            return Ok(());
        }
        let mut guard = self.readers.lock(slot)?;
        let readers = guard.as_mut().ok_or_else(|| {
            Error::invalid_operation(format!(
                "action {} ran before slot {} was initialised",
                self.helper.name(),
                slot
            ))
        })?;
        let values = Args::read(readers, entry)?;
        self.helper.exec(slot, values)
    }

    fn finalize_slot(&self, slot: usize) {
        if let Ok(mut readers) = self.readers.lock(slot) {
            *readers = None;
        }
    }

    fn finalize(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != ActionState::Initialized {
            return Err(Error::already_run(self.helper.name()));
        }
        match self.helper.finalize() {
            Ok(value) => {
                *state = ActionState::Finalized;
                self.result
                    .set(value)
                    .map_err(|_| Error::already_run(self.helper.name()))
            }
            Err(e) => {
                *state = ActionState::Failed;
                Err(e)
            }
        }
    }

    fn abandon(&self, reason: &str) {
        let mut state = self.state.lock();
        if *state != ActionState::Finalized {
            log::debug!("action {} abandoned: {}", self.helper.name(), reason);
            *state = ActionState::Failed;
        }
    }

    fn has_run(&self) -> bool {
        *self.state.lock() != ActionState::Booked
    }

    fn supports_partial_update(&self) -> bool {
        self.helper.supports_partial_update()
    }

    fn partial_update(&self, slot: usize) -> Result<Box<dyn Any + Send>> {
        Ok(Box::new(self.helper.partial_update(slot)?))
    }
}

impl<Args: ColumnTypes, H: ActionHelper<Args>> Drop for Action<Args, H> {
    fn drop(&mut self) {
        self.manager.deregister(self.id);
    }
}
