// src/engine/mod.rs

//! Orchestration engine for flowrun.
//!
//! This module ties together:
//! - the scheduler (which node of which run goes next)
//! - the work queue (ready FIFO plus waiting list)
//! - the output store (where results are persisted)
//! - the task backend (what actually executes a node)
//!
//! The loop itself lives in [`runtime`]. It is single-threaded and
//! cooperative: one work item is processed to completion, including
//! persistence and downstream staging, before the next one is considered.

use std::path::PathBuf;

use crate::dag::NodeFailure;
use crate::types::{NodeId, RunId};

pub mod queue;
pub mod runtime;

pub use queue::{WorkItem, WorkQueue};
pub use runtime::Runtime;

/// Runtime options.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Upper bound on node executions across all runs. Guards against loops
    /// whose exit condition never fires.
    pub max_executions: usize,
    /// Directory handed to tasks for their side artifacts.
    pub output_dir: PathBuf,
    /// Optional job-wide input file handed to tasks.
    pub input_file: Option<PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_executions: 10_000,
            output_dir: PathBuf::from("output_files"),
            input_file: None,
        }
    }
}

/// One successful node execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub run_id: RunId,
    pub node_id: NodeId,
    pub iteration: u64,
}

/// How a traversal ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunOutcome {
    /// Ready queue and waiting list both drained.
    #[default]
    Completed,
    /// Items were left waiting on dependencies that can never be met.
    Deadlocked { waiting: Vec<String> },
}

/// Summary of everything that happened during [`Runtime::run`].
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Successful executions, in execution order.
    pub executions: Vec<ExecutionRecord>,
    /// Work items that were dropped.
    pub failures: Vec<NodeFailure>,
    /// Runs whose queue emptied, in the order they finished.
    pub completed_runs: Vec<RunId>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.outcome == RunOutcome::Completed
    }

    /// Executions of `(run_id, node_id)`, in order.
    pub fn executions_of<'a>(
        &'a self,
        run_id: &'a str,
        node_id: &'a str,
    ) -> impl Iterator<Item = &'a ExecutionRecord> + 'a {
        self.executions
            .iter()
            .filter(move |e| e.run_id == run_id && e.node_id == node_id)
    }

    /// `"<run_id>/<node_id>"` for every execution, in order.
    pub fn execution_order(&self) -> Vec<String> {
        self.executions
            .iter()
            .map(|e| format!("{}/{}", e.run_id, e.node_id))
            .collect()
    }
}
