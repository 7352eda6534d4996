// src/engine/queue.rs

use std::collections::VecDeque;

use tracing::debug;

use crate::types::{NodeId, Payload, RunId};

/// A queued unit of work: one node of one run.
///
/// `merged` is set when the staging path already gathered the node's input;
/// otherwise the scheduler re-derives it from the node's declared
/// dependencies when the item is processed.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub run_id: RunId,
    pub node_id: NodeId,
    pub merged: Option<Payload>,
}

impl WorkItem {
    pub fn new(run_id: impl Into<RunId>, node_id: impl Into<NodeId>) -> Self {
        Self {
            run_id: run_id.into(),
            node_id: node_id.into(),
            merged: None,
        }
    }

    pub fn with_merged(mut self, merged: Payload) -> Self {
        self.merged = Some(merged);
        self
    }

    /// `"<run_id>/<node_id>"`, used in logs and deadlock reports.
    pub fn label(&self) -> String {
        format!("{}/{}", self.run_id, self.node_id)
    }
}

/// Ready queue (FIFO) plus the waiting list of items whose dependencies were
/// unmet when they were last looked at.
///
/// Semantics:
/// - `pop_ready` always drains the ready queue first.
/// - Waiting items are only reconsidered once the ready queue is empty, via
///   `promote_first`, which removes the first waiting item (in insertion
///   order) matching a predicate.
#[derive(Debug, Default)]
pub struct WorkQueue {
    ready: VecDeque<WorkItem>,
    waiting: Vec<WorkItem>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ready(&mut self, item: WorkItem) {
        debug!(
            run_id = %item.run_id,
            node = %item.node_id,
            merged = item.merged.is_some(),
            "queued ready item"
        );
        self.ready.push_back(item);
    }

    pub fn push_waiting(&mut self, item: WorkItem) {
        debug!(run_id = %item.run_id, node = %item.node_id, "item parked on waiting list");
        self.waiting.push(item);
    }

    pub fn pop_ready(&mut self) -> Option<WorkItem> {
        self.ready.pop_front()
    }

    /// Remove and return the first waiting item for which `ready` holds.
    pub fn promote_first<F>(&mut self, mut ready: F) -> Option<WorkItem>
    where
        F: FnMut(&WorkItem) -> bool,
    {
        let pos = self.waiting.iter().position(|item| ready(item))?;
        let item = self.waiting.remove(pos);
        debug!(run_id = %item.run_id, node = %item.node_id, "promoted waiting item");
        Some(item)
    }

    pub fn waiting(&self) -> &[WorkItem] {
        &self.waiting
    }

    /// Both the ready queue and the waiting list are empty.
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.waiting.is_empty()
    }

    /// Whether any queued or waiting item belongs to `run_id`.
    pub fn has_run(&self, run_id: &str) -> bool {
        self.ready
            .iter()
            .chain(self.waiting.iter())
            .any(|item| item.run_id == run_id)
    }

    /// Take the whole waiting list (used when reporting a deadlock).
    pub fn drain_waiting(&mut self) -> Vec<WorkItem> {
        std::mem::take(&mut self.waiting)
    }
}
