//! DOT rendering of a computation graph.

use crate::loop_manager::LoopManager;
use crate::node::{Node, NodeId, NodeKind};
use crate::nodes::ActionBase;
use hashbrown::HashSet;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

struct GraphNode {
    label: String,
    kind: NodeKind,
}

#[derive(Default)]
struct Graph {
    nodes: BTreeMap<NodeId, GraphNode>,
    edges: Vec<(NodeId, NodeId)>,
    visited: HashSet<NodeId>,
}

impl Graph {
    /// Adds `node` and its ancestors; shared ancestors are visited once.
    fn walk(&mut self, node: &Arc<dyn Node>) {
        let mut current = Some(node);
        while let Some(node) = current {
            if !self.visited.insert(node.id()) {
                return;
            }
            self.nodes.insert(
                node.id(),
                GraphNode {
                    label: node.label(),
                    kind: node.kind(),
                },
            );
            if let Some(prev) = node.prev() {
                self.edges.push((prev.id(), node.id()));
            }
            current = node.prev();
        }
    }

    fn add_action(&mut self, action: &Arc<dyn ActionBase>) {
        let label = if action.columns().is_empty() {
            action.name().to_string()
        } else {
            format!("{}\\n{}", action.name(), action.columns().join(", "))
        };
        self.nodes.insert(
            action.id(),
            GraphNode {
                label,
                kind: NodeKind::Action,
            },
        );
        self.edges.push((action.prev().id(), action.id()));
        self.walk(action.prev());
    }

    fn render(mut self) -> String {
        self.edges.sort_unstable();
        self.edges.dedup();
        let mut out = String::from("digraph quiver {\n");
        for (id, node) in &self.nodes {
            let _ = writeln!(
                out,
                "  n{} [label=\"{}\", shape={}];",
                id,
                escape(&node.label),
                shape(node.kind)
            );
        }
        for (from, to) in &self.edges {
            let _ = writeln!(out, "  n{} -> n{};", from, to);
        }
        out.push_str("}\n");
        out
    }
}

fn shape(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Root => "box, style=filled, fillcolor=\"#e8f8fc\"",
        NodeKind::Define => "ellipse",
        NodeKind::Filter => "diamond",
        NodeKind::Range => "hexagon",
        NodeKind::Action => "box, style=filled, fillcolor=\"#e47c7e\"",
    }
}

/// Escapes double quotes; `\n` sequences in labels are kept as DOT line breaks.
fn escape(label: &str) -> String {
    label.replace('"', "\\\"")
}

/// Renders every live node and booked action of the graph.
pub(crate) fn render_graph(manager: &Arc<LoopManager>) -> String {
    let mut graph = Graph::default();
    let root: Arc<dyn Node> = Arc::clone(manager) as Arc<dyn Node>;
    graph.walk(&root);
    let (actions, nodes) = manager.live_nodes();
    for action in &actions {
        graph.add_action(action);
    }
    for node in &nodes {
        graph.walk(node);
    }
    graph.render()
}

/// Renders the chain from the root down to `node`.
pub(crate) fn render_chain(node: &Arc<dyn Node>) -> String {
    let mut graph = Graph::default();
    graph.walk(node);
    graph.render()
}
