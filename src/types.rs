// src/types.rs

//! Small shared types used across the flowchart, store and engine layers.

use serde_json::{Map, Value};

/// Identifier of one independent traversal (e.g. `"run_1"`).
pub type RunId = String;

/// Identifier of a flowchart node (e.g. `"node_3"`).
pub type NodeId = String;

/// Key -> value output of a task, and the merged input handed to the next one.
///
/// `serde_json` is built with `preserve_order`, so key order follows insertion.
pub type Payload = Map<String, Value>;

/// Reserved payload key carrying the iteration number of an output record.
pub const ITERATION_KEY: &str = "iteration";

/// How a node's declared `incoming_params` sources gate its execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyMode {
    /// Every declared source must have produced output in this run.
    AllOf,
    /// At least one declared source must have produced output in this run.
    AnyOf,
}

impl DependencyMode {
    pub fn from_partial_flag(allow_partial_dependencies: bool) -> Self {
        if allow_partial_dependencies {
            DependencyMode::AnyOf
        } else {
            DependencyMode::AllOf
        }
    }
}
