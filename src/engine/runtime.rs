// src/engine/runtime.rs

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::dag::{NextStep, NodeFailure, ScheduledNode, Scheduler};
use crate::errors::{FlowrunError, Result};
use crate::exec::{TaskBackend, TaskContext};
use crate::flowchart::Flowchart;
use crate::store::OutputStore;
use crate::types::RunId;

use super::{ExecutionRecord, RunOutcome, RunReport, RuntimeOptions};

/// Drives the scheduler until every run is finished (or stuck), delegating
/// node execution to a `TaskBackend` and persistence to the `OutputStore`.
///
/// The runtime is the single place that decides whether a problem is
/// per-item (recorded in the [`RunReport`], loop continues) or fatal
/// (returned as `Err`):
/// - task failure, missing upstream data: per-item
/// - deadlock: ends the traversal, reported as [`RunOutcome::Deadlocked`]
/// - store corruption, IO errors, execution limit: fatal
pub struct Runtime<B: TaskBackend> {
    scheduler: Scheduler,
    store: OutputStore,
    backend: B,
    options: RuntimeOptions,
    /// Seeded runs that still have queued or waiting work.
    active_runs: Vec<RunId>,
}

impl<B: TaskBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("store", &self.store)
            .field("options", &self.options)
            .field("active_runs", &self.active_runs)
            .finish_non_exhaustive()
    }
}

impl<B: TaskBackend> Runtime<B> {
    /// Build a runtime, rejecting any node whose task type the backend
    /// cannot execute.
    pub fn new(
        flowchart: Flowchart,
        store: OutputStore,
        backend: B,
        options: RuntimeOptions,
    ) -> Result<Self> {
        for node in flowchart.nodes() {
            if !backend.supports(&node.task_type) {
                return Err(FlowrunError::UnknownTaskType {
                    node: node.id.clone(),
                    task_type: node.task_type.clone(),
                });
            }
        }

        Ok(Self {
            scheduler: Scheduler::new(flowchart),
            store,
            backend,
            options,
            active_runs: Vec::new(),
        })
    }

    /// Queue `start_node` for `run_id`.
    pub fn seed(&mut self, run_id: &str, start_node: &str) -> Result<()> {
        self.scheduler.seed(run_id, start_node)?;
        if !self.active_runs.iter().any(|r| r == run_id) {
            self.active_runs.push(run_id.to_string());
        }
        Ok(())
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_store(self) -> OutputStore {
        self.store
    }

    /// Main loop.
    ///
    /// - Pulls the next step from the scheduler.
    /// - Executes dispatched nodes and persists their output.
    /// - Feeds completions back into the scheduler.
    pub async fn run(&mut self) -> Result<RunReport> {
        info!(runs = ?self.active_runs, "flowrun runtime started");

        let mut report = RunReport::default();
        let mut dispatched = 0usize;

        loop {
            match self.scheduler.next(&self.store)? {
                NextStep::Idle => break,
                NextStep::Deadlock(waiting) => {
                    let labels: Vec<String> = waiting.iter().map(|w| w.label()).collect();
                    error!(waiting = ?labels, "deadlock: waiting nodes can never become ready; halting");
                    report.outcome = RunOutcome::Deadlocked { waiting: labels };
                    break;
                }
                NextStep::Failed(failure) => {
                    warn!(%failure, "work item dropped");
                    report.failures.push(failure);
                }
                NextStep::Dispatch(node) => {
                    if dispatched >= self.options.max_executions {
                        error!(limit = self.options.max_executions, "execution limit reached");
                        return Err(FlowrunError::ExecutionLimit {
                            limit: self.options.max_executions,
                        });
                    }
                    dispatched += 1;
                    self.execute(node, &mut report).await?;
                }
            }

            self.collect_finished_runs(&mut report);
        }

        info!(
            executions = report.executions.len(),
            failures = report.failures.len(),
            outcome = ?report.outcome,
            "runtime exiting"
        );
        Ok(report)
    }

    /// Execute one node, persist its output, and advance downstream staging.
    ///
    /// A failing task is recorded and its outgoing connections are left
    /// untouched.
    async fn execute(&mut self, node: ScheduledNode, report: &mut RunReport) -> Result<()> {
        let run_id = node.run_id.clone();
        let node_id = node.node_id.clone();

        info!(
            run_id = %run_id,
            node = %node_id,
            label = %node.label,
            task_type = %node.task_type,
            iteration = node.iteration,
            "executing node"
        );

        let ctx = TaskContext {
            node,
            output_dir: self.options.output_dir.clone(),
            input_file: self.options.input_file.clone(),
        };

        let output = match self.backend.execute(ctx).await {
            Ok(output) => output,
            Err(err) => {
                let message = format!("{err:#}");
                error!(
                    run_id = %run_id,
                    node = %node_id,
                    error = %message,
                    "task failed; downstream connections not evaluated"
                );
                report
                    .failures
                    .push(NodeFailure::task_failed(&run_id, &node_id, message));
                return Ok(());
            }
        };

        let iteration = self.store.put(&run_id, &node_id, output)?;
        report.executions.push(ExecutionRecord {
            run_id: run_id.clone(),
            node_id: node_id.clone(),
            iteration,
        });

        let step = self.scheduler.step_completion(&self.store, &run_id, &node_id)?;
        debug!(
            run_id = %run_id,
            node = %node_id,
            iteration,
            queued = step.newly_queued.len(),
            staged = ?step.staged,
            not_fired = ?step.not_fired,
            "node completed"
        );
        report.failures.extend(step.failures);

        Ok(())
    }

    fn collect_finished_runs(&mut self, report: &mut RunReport) {
        let scheduler = &self.scheduler;
        self.active_runs.retain(|run_id| {
            if scheduler.has_run(run_id) {
                return true;
            }
            info!(run_id = %run_id, "run complete");
            report.completed_runs.push(run_id.clone());
            false
        });
    }
}
