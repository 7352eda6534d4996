// src/dag/graph.rs

use std::collections::HashMap;

use crate::flowchart::{Connection, Node};
use crate::types::NodeId;

/// Adjacency for a single node.
#[derive(Debug, Clone, Default)]
struct GraphNode {
    /// Indices into the flowchart's connection list, in document order.
    outgoing: Vec<usize>,
    /// Distinct nodes with a connection into this one.
    upstream: Vec<NodeId>,
}

/// Lightweight adjacency view over a flowchart's connections.
///
/// Unlike a build DAG, flowcharts may contain loops, so no acyclicity is
/// assumed here; cycle analysis lives in `flowchart::validate`.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    nodes: HashMap<NodeId, GraphNode>,
}

impl DagGraph {
    /// Build adjacency from nodes and connections.
    ///
    /// Connections naming unknown nodes are kept under their raw ids; the
    /// validator rejects such documents before a `Flowchart` is built.
    pub fn new(nodes: &[Node], connections: &[Connection]) -> Self {
        let mut map: HashMap<NodeId, GraphNode> = nodes
            .iter()
            .map(|n| (n.id.clone(), GraphNode::default()))
            .collect();

        for (i, conn) in connections.iter().enumerate() {
            map.entry(conn.from.clone()).or_default().outgoing.push(i);

            let to = map.entry(conn.to.clone()).or_default();
            if !to.upstream.contains(&conn.from) {
                to.upstream.push(conn.from.clone());
            }
        }

        Self { nodes: map }
    }

    /// Connection indices leaving `node`, in document order.
    pub fn outgoing_of(&self, node: &str) -> &[usize] {
        self.nodes
            .get(node)
            .map(|n| n.outgoing.as_slice())
            .unwrap_or(&[])
    }

    /// Distinct nodes with at least one connection into `node`.
    pub fn upstream_of(&self, node: &str) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|n| n.upstream.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str) -> Node {
        serde_json::from_value(json!({ "id": id, "task_type": "Start" })).unwrap()
    }

    fn conn(from: &str, to: &str) -> Connection {
        serde_json::from_value(json!({ "from": from, "to": to })).unwrap()
    }

    #[test]
    fn outgoing_keeps_document_order_and_upstream_is_distinct() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let conns = vec![conn("a", "c"), conn("a", "b"), conn("b", "c"), conn("a", "c")];
        let g = DagGraph::new(&nodes, &conns);

        assert_eq!(g.outgoing_of("a"), &[0, 1, 3]);
        assert_eq!(g.upstream_of("c"), &["a".to_string(), "b".to_string()]);
        assert!(g.upstream_of("a").is_empty());
        assert!(g.outgoing_of("missing").is_empty());
    }
}
