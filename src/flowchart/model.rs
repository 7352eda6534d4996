// src/flowchart/model.rs

use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::dag::DagGraph;
use crate::types::{DependencyMode, NodeId};

/// Flowchart document as produced by the authoring tool.
///
/// ```json
/// {
///   "nodes": [
///     { "id": "node_1", "label": "Start", "task_type": "Start",
///       "parameters": { "group": { "structures": ["a.str"] } } },
///     { "id": "node_2", "label": "Refine", "task_type": "External Program",
///       "incoming_params": { "node_1": ["structures_list"] },
///       "expected_deps": 1 }
///   ],
///   "connections": [
///     { "from": "node_1", "to": "node_2" },
///     { "from": "node_2", "to": "node_2",
///       "condition": "Number of runs (less than equal to)", "condition_param": "3" }
///   ],
///   "loops": [["node_2"]]
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawFlowchart {
    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub connections: Vec<Connection>,

    /// Node groups the author marked as intentional loops.
    #[serde(default)]
    pub loops: Vec<Vec<NodeId>>,
}

/// One step of the flowchart. Read-only during execution.
#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    pub id: NodeId,

    #[serde(default)]
    pub label: Option<String>,

    /// Tag selecting the task implementation (e.g. `"Start"`).
    pub task_type: String,

    /// Opaque configuration handed to the task.
    #[serde(default = "empty_object")]
    pub parameters: Value,

    /// Source node -> keys to pull from that source's latest output, in
    /// document order.
    #[serde(default, deserialize_with = "deserialize_incoming_params")]
    pub incoming_params: Vec<IncomingParam>,

    #[serde(default)]
    pub allow_partial_dependencies: bool,

    /// Distinct upstream arrivals required before the staged gate opens.
    /// Zero bypasses staging entirely.
    #[serde(default)]
    pub expected_deps: usize,
}

/// One `incoming_params` entry: which keys to take from which source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingParam {
    pub source: NodeId,
    pub keys: Vec<String>,
}

/// Directed edge `from -> to`, optionally guarded by a condition.
#[derive(Debug, Clone, Deserialize)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,

    /// Condition tag; `None` (or empty) always fires.
    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub condition_param: Option<Value>,
}

impl Node {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    pub fn dependency_mode(&self) -> DependencyMode {
        DependencyMode::from_partial_flag(self.allow_partial_dependencies)
    }

    /// Keys requested from `source`, if it is a declared dependency.
    pub fn keys_from(&self, source: &str) -> Option<&[String]> {
        self.incoming_params
            .iter()
            .find(|p| p.source == source)
            .map(|p| p.keys.as_slice())
    }
}

impl Connection {
    /// The condition tag, treating an empty string as "no condition".
    pub fn condition_tag(&self) -> Option<&str> {
        self.condition.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// A validated flowchart, loaded once per run and never mutated.
///
/// Built through `Flowchart::try_from(RawFlowchart)`, which checks that every
/// reference names a known node.
#[derive(Debug, Clone)]
pub struct Flowchart {
    nodes: Vec<Node>,
    positions: HashMap<NodeId, usize>,
    connections: Vec<Connection>,
    loops: Vec<Vec<NodeId>>,
    graph: DagGraph,
}

impl Flowchart {
    /// Construct without validation. Callers must have checked `raw` first.
    pub(crate) fn new_unchecked(raw: RawFlowchart) -> Self {
        let positions = raw
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        let graph = DagGraph::new(&raw.nodes, &raw.connections);

        Self {
            nodes: raw.nodes,
            positions,
            connections: raw.connections,
            loops: raw.loops,
            graph,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.positions.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes in document order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn loops(&self) -> &[Vec<NodeId>] {
        &self.loops
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Outgoing connections of `node`, in document order.
    pub fn outgoing(&self, node: &str) -> impl Iterator<Item = &Connection> {
        self.graph
            .outgoing_of(node)
            .iter()
            .map(|&i| &self.connections[i])
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn deserialize_incoming_params<'de, D>(deserializer: D) -> Result<Vec<IncomingParam>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Map::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(source, keys)| {
            let keys: Vec<String> = serde_json::from_value(keys).map_err(|e| {
                D::Error::custom(format!("incoming_params for '{source}': {e}"))
            })?;
            Ok(IncomingParam { source, keys })
        })
        .collect()
}
