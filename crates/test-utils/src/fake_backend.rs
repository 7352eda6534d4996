use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use flowrun::exec::{TaskBackend, TaskContext, TaskFuture};
use flowrun::types::Payload;

/// One recorded execution.
#[derive(Debug, Clone)]
pub struct FakeCall {
    pub run_id: String,
    pub node_id: String,
    pub iteration: u64,
    pub input: Payload,
}

impl FakeCall {
    pub fn label(&self) -> String {
        format!("{}/{}", self.run_id, self.node_id)
    }
}

/// A fake task backend that:
/// - records every execution (shared across clones, so a test can keep a
///   handle after moving the backend into a runtime)
/// - returns a scripted output per node, or echoes the node's input
/// - fails nodes marked as failing
#[derive(Clone, Default)]
pub struct FakeBackend {
    calls: Arc<Mutex<Vec<FakeCall>>>,
    outputs: HashMap<String, Payload>,
    failing: HashSet<String>,
    supported: Option<HashSet<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always return `output` for `node_id`.
    pub fn with_output(mut self, node_id: &str, output: Payload) -> Self {
        self.outputs.insert(node_id.to_string(), output);
        self
    }

    /// Make every execution of `node_id` fail.
    pub fn failing(mut self, node_id: &str) -> Self {
        self.failing.insert(node_id.to_string());
        self
    }

    /// Only accept these task types (default: accept everything).
    pub fn supporting(mut self, task_types: &[&str]) -> Self {
        self.supported = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().unwrap().clone()
    }

    /// `"<run_id>/<node_id>"` of every execution attempt, in order.
    pub fn executed(&self) -> Vec<String> {
        self.calls().iter().map(FakeCall::label).collect()
    }
}

impl TaskBackend for FakeBackend {
    fn supports(&self, task_type: &str) -> bool {
        self.supported
            .as_ref()
            .is_none_or(|types| types.contains(task_type))
    }

    fn execute(&mut self, ctx: TaskContext) -> TaskFuture<'_> {
        let node = ctx.node;
        {
            let mut guard = self.calls.lock().unwrap();
            guard.push(FakeCall {
                run_id: node.run_id.clone(),
                node_id: node.node_id.clone(),
                iteration: node.iteration,
                input: node.input.clone(),
            });
        }

        let result = if self.failing.contains(&node.node_id) {
            Err(anyhow!("scripted failure in {}", node.node_id))
        } else {
            Ok(self
                .outputs
                .get(&node.node_id)
                .cloned()
                .unwrap_or(node.input))
        };

        Box::pin(async move { result })
    }
}
