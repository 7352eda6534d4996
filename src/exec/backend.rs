// src/exec/backend.rs

//! Pluggable task backend abstraction.
//!
//! The runtime talks to a `TaskBackend` instead of calling tasks directly.
//! This makes it easy to swap in a fake backend in tests while keeping the
//! production task registry in one place.
//!
//! - [`TaskRegistry`] is the default implementation used by `flowrun`. It maps
//!   a node's `task_type` tag to a [`Task`] implementation.
//! - Tests can provide their own `TaskBackend` that, for example, records
//!   which nodes were executed and returns scripted payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::dag::ScheduledNode;
use crate::types::Payload;

/// Boxed future returned by tasks and backends.
pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<Payload>> + Send + 'a>>;

/// Everything a task receives for one execution.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub node: ScheduledNode,
    /// Directory tasks may write their side artifacts to.
    pub output_dir: PathBuf,
    /// Optional sample/input file configured for the whole job.
    pub input_file: Option<PathBuf>,
}

/// Trait abstracting how a scheduled node is executed.
///
/// Production code uses [`TaskRegistry`]; tests can provide their own
/// implementation that doesn't run real tasks.
pub trait TaskBackend: Send {
    /// Whether this backend can execute nodes of `task_type`.
    ///
    /// Checked for every node before the first execution, so unknown task
    /// types are rejected up front instead of mid-run.
    fn supports(&self, task_type: &str) -> bool;

    /// Execute one node and return its output payload.
    ///
    /// Must only resolve once all of the task's internal work has finished.
    fn execute(&mut self, ctx: TaskContext) -> TaskFuture<'_>;
}

/// One kind of domain work, selected by a node's `task_type`.
pub trait Task: Send + Sync {
    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a>;
}

/// Task-type tag -> implementation.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Arc<dyn Task>>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("task_types", &self.tasks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `task_type`, replacing any previous entry.
    pub fn register(&mut self, task_type: impl Into<String>, task: impl Task + 'static) -> &mut Self {
        let task_type = task_type.into();
        debug!(%task_type, "registered task type");
        self.tasks.insert(task_type, Arc::new(task));
        self
    }
}

impl TaskBackend for TaskRegistry {
    fn supports(&self, task_type: &str) -> bool {
        self.tasks.contains_key(task_type)
    }

    fn execute(&mut self, ctx: TaskContext) -> TaskFuture<'_> {
        let task = self.tasks.get(&ctx.node.task_type).cloned();

        Box::pin(async move {
            let task = task.ok_or_else(|| anyhow!("no task registered for '{}'", ctx.node.task_type))?;
            task.run(&ctx).await
        })
    }
}
