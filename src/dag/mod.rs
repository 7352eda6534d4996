// src/dag/mod.rs

//! Flowchart graph and scheduling.
//!
//! - [`graph`] is the adjacency view over a flowchart's connections.
//! - [`merge`] implements the fan-in merge rule.
//! - [`staging`] tracks upstream arrivals per `(run, target)`.
//! - [`readiness`] decides whether a work item can run and builds its input.
//! - [`scheduler`] contains the queue-driven state machine shared by all runs.
//! - [`task_info`] describes a node scheduled for execution.
//! - [`scheduler_step`] defines the result types for scheduler steps.

pub mod graph;
pub mod merge;
pub mod readiness;
pub mod scheduler;
pub mod scheduler_step;
pub mod staging;
pub mod task_info;

pub use graph::DagGraph;
pub use readiness::Readiness;
pub use scheduler::Scheduler;
pub use scheduler_step::{FailureReason, NextStep, NodeFailure, SchedulerStep};
pub use staging::{Arrival, StagingEntry, StagingTable};
pub use task_info::ScheduledNode;
