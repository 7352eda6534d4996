// src/dag/task_info.rs

//! What the scheduler hands to the task layer for one execution.

use serde_json::Value;

use crate::flowchart::Node;
use crate::types::{NodeId, Payload, RunId};

/// Description of a node the scheduler wants executed now.
#[derive(Debug, Clone)]
pub struct ScheduledNode {
    pub run_id: RunId,
    pub node_id: NodeId,
    pub label: String,
    pub task_type: String,
    /// Static node configuration, passed through untouched.
    pub parameters: Value,
    /// Merged upstream data (staged or re-derived).
    pub input: Payload,
    /// Iteration this execution will be stored under if it succeeds.
    pub iteration: u64,
}

impl ScheduledNode {
    pub fn from_node(node: &Node, run_id: &str, input: Payload, iteration: u64) -> Self {
        Self {
            run_id: run_id.to_string(),
            node_id: node.id.clone(),
            label: node.label().to_string(),
            task_type: node.task_type.clone(),
            parameters: node.parameters.clone(),
            input,
            iteration,
        }
    }
}
