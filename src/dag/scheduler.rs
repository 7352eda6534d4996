// src/dag/scheduler.rs

use tracing::{debug, info, warn};

use crate::condition;
use crate::dag::readiness::{self, Readiness};
use crate::dag::scheduler_step::{NextStep, NodeFailure, SchedulerStep};
use crate::dag::staging::{Arrival, StagingTable};
use crate::dag::task_info::ScheduledNode;
use crate::engine::queue::{WorkItem, WorkQueue};
use crate::errors::{FlowrunError, Result};
use crate::flowchart::{Connection, Flowchart, Node};
use crate::store::OutputStore;

/// Scheduler holds the immutable flowchart plus the mutable work queue and
/// staging table shared by every run.
///
/// It is responsible for:
/// - picking the next runnable work item (ready queue first, then waiting)
/// - assembling a node's input from its upstream outputs
/// - deciding which outgoing connections fire after a node completes
/// - detecting deadlock
///
/// It never writes to the [`OutputStore`]; persisting results is the
/// runtime's job.
#[derive(Debug)]
pub struct Scheduler {
    flowchart: Flowchart,
    queue: WorkQueue,
    staging: StagingTable,
}

impl Scheduler {
    pub fn new(flowchart: Flowchart) -> Self {
        Self {
            flowchart,
            queue: WorkQueue::new(),
            staging: StagingTable::new(),
        }
    }

    pub fn flowchart(&self) -> &Flowchart {
        &self.flowchart
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn staging(&self) -> &StagingTable {
        &self.staging
    }

    /// Nothing queued and nothing waiting.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether `run_id` still has queued or waiting work.
    pub fn has_run(&self, run_id: &str) -> bool {
        self.queue.has_run(run_id)
    }

    /// Start a run at `start_node`.
    pub fn seed(&mut self, run_id: &str, start_node: &str) -> Result<()> {
        if self.flowchart.node(start_node).is_none() {
            return Err(FlowrunError::UnknownNode(start_node.to_string()));
        }
        info!(run_id, node = start_node, "seeding run");
        self.queue.push_ready(WorkItem::new(run_id, start_node));
        Ok(())
    }

    /// Pull the next piece of work.
    ///
    /// Items whose dependencies are unmet are parked on the waiting list and
    /// the search continues. Once the ready queue is empty, the first waiting
    /// item whose gate has opened is promoted; if none can be promoted the
    /// waiting list is handed back as a deadlock.
    pub fn next(&mut self, store: &OutputStore) -> Result<NextStep> {
        loop {
            let item = match self.queue.pop_ready() {
                Some(item) => item,
                None => {
                    let flowchart = &self.flowchart;
                    let promoted = self.queue.promote_first(|item| {
                        item.merged.is_some()
                            || flowchart
                                .node(&item.node_id)
                                .is_some_and(|n| readiness::is_satisfiable(n, &item.run_id, store))
                    });

                    match promoted {
                        Some(item) => item,
                        None if self.queue.waiting().is_empty() => return Ok(NextStep::Idle),
                        None => {
                            let waiting = self.queue.drain_waiting();
                            let labels: Vec<_> = waiting.iter().map(WorkItem::label).collect();
                            warn!(?labels, "no waiting item can become ready");
                            return Ok(NextStep::Deadlock(waiting));
                        }
                    }
                }
            };

            let node = self.lookup(&item.node_id)?;

            let readiness = match item.merged {
                Some(ref merged) => Readiness::Ready(merged.clone()),
                None => readiness::resolve(node, &item.run_id, store)?,
            };

            match readiness {
                Readiness::Ready(input) => {
                    let iteration = store.next_iteration(&item.run_id, &item.node_id)?;
                    debug!(
                        run_id = %item.run_id,
                        node = %item.node_id,
                        iteration,
                        staged = item.merged.is_some(),
                        "dispatching node"
                    );
                    return Ok(NextStep::Dispatch(ScheduledNode::from_node(
                        node,
                        &item.run_id,
                        input,
                        iteration,
                    )));
                }
                Readiness::NotReady => {
                    self.queue.push_waiting(item);
                }
                Readiness::MissingUpstream { source } => {
                    warn!(
                        run_id = %item.run_id,
                        node = %item.node_id,
                        source = %source,
                        "required upstream output missing; dropping item"
                    );
                    return Ok(NextStep::Failed(NodeFailure::missing_upstream(
                        &item.run_id,
                        &item.node_id,
                        &source,
                    )));
                }
            }
        }
    }

    /// React to `node_id` having completed in `run_id` (its output is already
    /// in `store`).
    ///
    /// Each outgoing connection is evaluated in document order. Targets with
    /// `expected_deps == 0` are queued straight away and derive their input
    /// when processed; other targets go through the staging table and are
    /// queued with merged data once their threshold is met.
    pub fn step_completion(
        &mut self,
        store: &OutputStore,
        run_id: &str,
        node_id: &str,
    ) -> Result<SchedulerStep> {
        let output = store.get_latest(run_id, node_id)?;
        let mut step = SchedulerStep::default();

        let outgoing: Vec<Connection> = self.flowchart.outgoing(node_id).cloned().collect();
        for conn in outgoing {
            let fires = condition::evaluate(
                conn.condition_tag(),
                conn.condition_param.as_ref(),
                &output,
            );
            if !fires {
                debug!(run_id, from = node_id, to = %conn.to, "connection did not fire");
                step.not_fired.push(conn.to.clone());
                continue;
            }

            debug!(run_id, from = node_id, to = %conn.to, "connection fired");
            let target = self.lookup(&conn.to)?.clone();
            self.advance_target(store, run_id, node_id, &target, &mut step)?;
        }

        Ok(step)
    }

    fn advance_target(
        &mut self,
        store: &OutputStore,
        run_id: &str,
        from: &str,
        target: &Node,
        step: &mut SchedulerStep,
    ) -> Result<()> {
        if target.expected_deps == 0 {
            let item = WorkItem::new(run_id, target.id.as_str());
            self.queue.push_ready(item.clone());
            step.newly_queued.push(item);
            return Ok(());
        }

        match self
            .staging
            .record_arrival(run_id, from, &target.id, target.expected_deps)
        {
            Arrival::Waiting { received, expected } => {
                debug!(run_id, node = %target.id, received, expected, "staged; waiting for more arrivals");
                step.staged.push(target.id.clone());
            }
            Arrival::Ready => {
                let Some(entry) = self.staging.consume(run_id, &target.id) else {
                    return Ok(());
                };

                match readiness::merge_staged(target, run_id, &entry.received_deps, store)? {
                    Readiness::Ready(merged) => {
                        info!(
                            run_id,
                            node = %target.id,
                            deps = ?entry.received_deps,
                            "all expected dependencies arrived; queueing with merged data"
                        );
                        let item = WorkItem::new(run_id, target.id.as_str()).with_merged(merged);
                        self.queue.push_ready(item.clone());
                        step.newly_queued.push(item);
                    }
                    Readiness::MissingUpstream { source } => {
                        warn!(
                            run_id,
                            node = %target.id,
                            source = %source,
                            "staged source has no output; target not queued"
                        );
                        step.failures
                            .push(NodeFailure::missing_upstream(run_id, &target.id, &source));
                    }
                    Readiness::NotReady => {}
                }
            }
        }

        Ok(())
    }

    fn lookup(&self, node_id: &str) -> Result<&Node> {
        self.flowchart
            .node(node_id)
            .ok_or_else(|| FlowrunError::UnknownNode(node_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowchart::parse_flowchart;
    use crate::fs::mock::MockFileSystem;
    use crate::types::Payload;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> OutputStore {
        OutputStore::open(Arc::new(MockFileSystem::new()), "/results", "t").unwrap()
    }

    fn dispatch(s: &mut Scheduler, store: &OutputStore) -> ScheduledNode {
        match s.next(store).unwrap() {
            NextStep::Dispatch(node) => node,
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    fn complete(s: &mut Scheduler, store: &mut OutputStore, node: &ScheduledNode, out: Payload) -> SchedulerStep {
        store.put(&node.run_id, &node.node_id, out).unwrap();
        s.step_completion(store, &node.run_id, &node.node_id).unwrap()
    }

    #[test]
    fn seeding_unknown_node_fails() {
        let chart = parse_flowchart(r#"{"nodes":[{"id":"a","task_type":"Start"}]}"#).unwrap();
        let mut s = Scheduler::new(chart);
        assert!(matches!(s.seed("run_1", "zzz"), Err(FlowrunError::UnknownNode(_))));
    }

    #[test]
    fn staged_target_queues_once_with_merged_data() {
        let chart = parse_flowchart(
            r#"{
              "nodes": [
                {"id":"s","task_type":"Start"},
                {"id":"a","task_type":"P","incoming_params":{"s":["x"]}},
                {"id":"b","task_type":"P","incoming_params":{"s":["x"]}},
                {"id":"j","task_type":"P","expected_deps":2,
                 "incoming_params":{"a":["x"],"b":["x"]}}
              ],
              "connections": [
                {"from":"s","to":"a"},{"from":"s","to":"b"},
                {"from":"a","to":"j"},{"from":"b","to":"j"}
              ]
            }"#,
        )
        .unwrap();
        let mut store = store();
        let mut s = Scheduler::new(chart);
        s.seed("run_1", "s").unwrap();

        let start = dispatch(&mut s, &store);
        complete(&mut s, &mut store, &start, json!({"x": 0}).as_object().cloned().unwrap());

        let a = dispatch(&mut s, &store);
        assert_eq!(a.node_id, "a");
        let step = complete(&mut s, &mut store, &a, json!({"x": "a"}).as_object().cloned().unwrap());
        assert_eq!(step.staged, vec!["j"]);
        assert!(step.newly_queued.is_empty());

        let b = dispatch(&mut s, &store);
        let step = complete(&mut s, &mut store, &b, json!({"x": "b"}).as_object().cloned().unwrap());
        assert_eq!(step.newly_queued.len(), 1);
        assert!(s.staging().is_empty());

        let j = dispatch(&mut s, &store);
        assert_eq!(j.node_id, "j");
        assert_eq!(j.input["x"], json!(["a", "b"]));
        assert!(matches!(s.next(&store).unwrap(), NextStep::Idle));
    }

    #[test]
    fn unreachable_dependency_deadlocks() {
        let chart = parse_flowchart(
            r#"{
              "nodes": [
                {"id":"s","task_type":"Start"},
                {"id":"never","task_type":"P"},
                {"id":"t","task_type":"P","incoming_params":{"s":["x"],"never":["x"]}}
              ],
              "connections": [
                {"from":"s","to":"t"},
                {"from":"s","to":"never","condition":"finished","condition_param":true}
              ]
            }"#,
        )
        .unwrap();
        let mut store = store();
        let mut s = Scheduler::new(chart);
        s.seed("run_1", "s").unwrap();

        let start = dispatch(&mut s, &store);
        let step = complete(&mut s, &mut store, &start, Payload::new());
        assert_eq!(step.not_fired, vec!["never"]);

        match s.next(&store).unwrap() {
            NextStep::Deadlock(waiting) => {
                assert_eq!(waiting.len(), 1);
                assert_eq!(waiting[0].label(), "run_1/t");
            }
            other => panic!("expected deadlock, got {other:?}"),
        }
        assert!(s.is_idle());
    }

    #[test]
    fn dispatch_reports_upcoming_iteration() {
        let chart = parse_flowchart(
            r#"{"nodes":[{"id":"s","task_type":"Start"}],
                "connections":[{"from":"s","to":"s","condition":"runs_lte","condition_param":1}]}"#,
        )
        .unwrap();
        let mut store = store();
        let mut s = Scheduler::new(chart);
        s.seed("run_1", "s").unwrap();

        let first = dispatch(&mut s, &store);
        assert_eq!(first.iteration, 1);
        complete(&mut s, &mut store, &first, Payload::new());

        let second = dispatch(&mut s, &store);
        assert_eq!(second.iteration, 2);
        let step = complete(&mut s, &mut store, &second, Payload::new());
        assert_eq!(step.not_fired, vec!["s"]);
        assert!(matches!(s.next(&store).unwrap(), NextStep::Idle));
    }
}
