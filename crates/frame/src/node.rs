//! Node base and graph topology.
//!
//! Every node of the computation graph holds a strong reference to its single
//! predecessor; the loop manager is the root of every chain. Evaluation is
//! pull based: an action asks its predecessor whether an entry passes, which
//! asks its own predecessor, down to the root.

use crate::report::CutFlowReport;
use quiver_core::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Identifier of a node, unique within one graph.
pub type NodeId = u32;

/// Kind of a graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Define,
    Filter,
    Range,
    Action,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Define => "define",
            NodeKind::Filter => "filter",
            NodeKind::Range => "range",
            NodeKind::Action => "action",
        }
    }
}

/// The polymorphic interface shared by every node in a chain.
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    fn kind(&self) -> NodeKind;

    /// Human readable description used by graph rendering.
    fn label(&self) -> String;

    /// The predecessor of this node, `None` for the root.
    fn prev(&self) -> Option<&Arc<dyn Node>>;

    /// Whether `entry` passes every filter from the root down to this node.
    fn check_filters(&self, slot: usize, entry: u64) -> Result<bool>;

    /// Appends the cut-flow of the chain ending at this node.
    fn report(&self, report: &mut CutFlowReport) {
        self.partial_report(report);
    }

    /// Appends the cut-flow of the named filters upstream of and including this node.
    fn partial_report(&self, report: &mut CutFlowReport);

    /// Registers one more consumer of this node.
    fn incr_children_count(&self);

    /// Called by a consumer that needs no more entries.
    fn stop_processing(&self);

    /// Forgets the consumers registered for the previous event loop.
    fn reset_children_count(&self);

    /// Collects the names of the named filters upstream of and including this node.
    fn add_filter_name(&self, names: &mut Vec<String>);

    /// Prepares the node for a new event loop.
    fn init_node(&self) {}
}

/// Children and stop accounting for fan-in of stop requests.
#[derive(Debug, Default)]
pub struct ChildCounter {
    children: AtomicUsize,
    stops: AtomicUsize,
}

impl ChildCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a child and returns the new child count.
    pub fn increment(&self) -> usize {
        self.children.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Records a stop request; true exactly when every child has now asked to stop.
    pub fn stop(&self) -> bool {
        let stops = self.stops.fetch_add(1, Ordering::AcqRel) + 1;
        stops == self.children.load(Ordering::Acquire)
    }

    #[inline]
    pub fn children(&self) -> usize {
        self.children.load(Ordering::Acquire)
    }

    #[inline]
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::Acquire)
    }

    /// Whether every registered child has asked to stop.
    pub fn all_stopped(&self) -> bool {
        let children = self.children();
        children > 0 && self.stops() >= children
    }

    pub fn reset(&self) {
        self.children.store(0, Ordering::Release);
        self.stops.store(0, Ordering::Release);
    }
}
