// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually running the work behind each
//! flowchart node and handing back its output payload.
//!
//! - [`backend`] provides the `TaskBackend` trait the runtime talks to, the
//!   `Task` trait, and `TaskRegistry`, the production backend that maps task
//!   types to implementations. Tests can replace the backend with a fake.
//! - [`builtin`] holds the generic tasks (`Start`, `Combine Lists`,
//!   `Passthrough`).
//! - [`external`] runs an external program over a directory of inputs.
//! - [`executor_loop`] is the bounded worker pool used for that fan-out.
//! - [`task_runner`] handles a single external process.

pub mod backend;
pub mod builtin;
pub mod executor_loop;
pub mod external;
pub mod task_runner;

pub use backend::{Task, TaskBackend, TaskContext, TaskFuture, TaskRegistry};
pub use builtin::register_builtins;
pub use external::{ExternalProgramTask, ExternalSettings, EXTERNAL_PROGRAM};

/// Registry with the built-in tasks, plus `External Program` when a program
/// is configured.
pub fn default_registry(external: Option<ExternalSettings>) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    register_builtins(&mut registry);
    if let Some(settings) = external {
        registry.register(EXTERNAL_PROGRAM, ExternalProgramTask::new(settings));
    }
    registry
}
