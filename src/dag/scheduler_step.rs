// src/dag/scheduler_step.rs

//! Step-by-step result types for the scheduler.

use std::fmt;

use crate::dag::task_info::ScheduledNode;
use crate::engine::queue::WorkItem;
use crate::errors::FlowrunError;
use crate::types::{NodeId, RunId};

/// Why a work item was dropped without producing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// A required upstream source had no recorded output.
    MissingUpstream { source: NodeId },
    /// The task ran and returned an error.
    TaskFailed { message: String },
}

/// A work item that was aborted. The run itself keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub run_id: RunId,
    pub node_id: NodeId,
    pub reason: FailureReason,
}

impl NodeFailure {
    pub fn missing_upstream(run_id: &str, node_id: &str, source: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
            reason: FailureReason::MissingUpstream {
                source: source.to_string(),
            },
        }
    }

    pub fn task_failed(run_id: &str, node_id: &str, message: impl Into<String>) -> Self {
        Self {
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
            reason: FailureReason::TaskFailed {
                message: message.into(),
            },
        }
    }

    pub fn to_error(&self) -> FlowrunError {
        match &self.reason {
            FailureReason::MissingUpstream { source } => FlowrunError::MissingUpstream {
                run_id: self.run_id.clone(),
                node: self.node_id.clone(),
                source_node: source.clone(),
            },
            FailureReason::TaskFailed { message } => FlowrunError::TaskFailed {
                node: format!("{}/{}", self.run_id, self.node_id),
                message: message.clone(),
            },
        }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_error())
    }
}

/// What [`Scheduler::next`](crate::dag::Scheduler::next) found to do.
#[derive(Debug, Clone)]
pub enum NextStep {
    /// Execute this node now.
    Dispatch(ScheduledNode),
    /// An item could not be processed and was dropped.
    Failed(NodeFailure),
    /// Items are waiting but none can ever become ready.
    Deadlock(Vec<WorkItem>),
    /// Nothing queued and nothing waiting.
    Idle,
}

/// Structured result of handling one completed node.
///
/// Useful for tests that step the scheduler by hand.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Items pushed onto the ready queue, in connection order.
    pub newly_queued: Vec<WorkItem>,
    /// Targets that recorded an arrival but are still below their threshold.
    pub staged: Vec<NodeId>,
    /// Targets of outgoing connections whose condition did not fire.
    pub not_fired: Vec<NodeId>,
    /// Targets whose staged data could not be assembled.
    pub failures: Vec<NodeFailure>,
}
