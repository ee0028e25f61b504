//! Positional entry windows.

use crate::loop_manager::LoopManager;
use crate::node::{ChildCounter, Node, NodeId, NodeKind};
use crate::report::CutFlowReport;
use parking_lot::Mutex;
use quiver_core::{Error, Result};
use std::sync::Arc;

#[derive(Debug, Default)]
struct RangeState {
    last_entry: Option<u64>,
    last_result: bool,
    processed: u64,
    has_stopped: bool,
}

/// Lets through the entries whose position among the entries reaching this
/// node lies in `start..stop`, every `stride`-th one.
///
/// A range counts entries in arrival order, so it only exists in single-slot graphs.
pub struct Range {
    id: NodeId,
    manager: Arc<LoopManager>,
    prev: Arc<dyn Node>,
    start: u64,
    stop: u64,
    stride: u64,
    state: Mutex<RangeState>,
    counter: ChildCounter,
}

impl Range {
    pub(crate) fn new(
        manager: Arc<LoopManager>,
        prev: Arc<dyn Node>,
        start: u64,
        stop: u64,
        stride: u64,
    ) -> Result<Self> {
        if manager.n_slots() > 1 {
            return Err(Error::invalid_operation(
                "range is not available with multiple slots",
            ));
        }
        if stride == 0 {
            return Err(Error::invalid_operation("range stride must be positive"));
        }
        if stop != 0 && stop < start {
            return Err(Error::invalid_operation(format!(
                "range stop {} is smaller than start {}",
                stop, start
            )));
        }
        Ok(Self {
            id: manager.next_node_id(),
            manager,
            prev,
            start,
            stop,
            stride,
            state: Mutex::new(RangeState::default()),
            counter: ChildCounter::new(),
        })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stop(&self) -> u64 {
        self.stop
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    fn in_window(&self, processed: u64) -> bool {
        processed > self.start
            && (self.stop == 0 || processed <= self.stop)
            && (self.stride == 1 || processed % self.stride == 0)
    }
}

impl Node for Range {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Range
    }

    fn label(&self) -> String {
        format!("Range\\n{}..{} step {}", self.start, self.stop, self.stride)
    }

    fn prev(&self) -> Option<&Arc<dyn Node>> {
        Some(&self.prev)
    }

    fn check_filters(&self, slot: usize, entry: u64) -> Result<bool> {
        let mut state = self.state.lock();
        if state.last_entry == Some(entry) {
            return Ok(state.last_result);
        }
        if state.has_stopped {
            return Ok(false);
        }
        let pass = if self.prev.check_filters(slot, entry)? {
            state.processed += 1;
            let pass = self.in_window(state.processed);
            if state.processed == self.stop {
                state.has_stopped = true;
                self.prev.stop_processing();
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
    }

    fn incr_children_count(&self) {
        if self.counter.increment() == 1 {
            self.prev.incr_children_count();
        }
    }

    fn stop_processing(&self) {
        let stopped = self.state.lock().has_stopped;
        if self.counter.stop() && !stopped {
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
        *self.state.lock() = RangeState::default();
    }
}

impl Drop for Range {
    fn drop(&mut self) {
        self.manager.deregister(self.id);
    }
}
