// src/dag/staging.rs

//! Dependency staging: bookkeeping of upstream arrivals before a node with
//! `expected_deps > 0` becomes runnable.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{NodeId, RunId};

/// Arrivals recorded so far for one `(run_id, target)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingEntry {
    /// Distinct upstream nodes that fired into the target, in arrival order.
    pub received_deps: Vec<NodeId>,
    pub expected_deps: usize,
}

impl StagingEntry {
    fn new(expected_deps: usize) -> Self {
        Self {
            received_deps: Vec::new(),
            expected_deps,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.received_deps.len() == self.expected_deps
    }
}

/// Result of recording one arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// The threshold was reached; the caller should `consume` the entry.
    Ready,
    /// Still waiting for more distinct upstream nodes.
    Waiting { received: usize, expected: usize },
}

/// Per `(run_id, target)` staging records.
///
/// An entry lives from its first arrival until it is consumed. Once consumed
/// it is gone; a later arrival for the same target starts a fresh round (this
/// is how loop bodies re-stage on every pass).
#[derive(Debug, Default)]
pub struct StagingTable {
    entries: HashMap<(RunId, NodeId), StagingEntry>,
}

impl StagingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark that `from` fired into `to` within `run_id`.
    ///
    /// Repeat arrivals from the same upstream node within one round do not
    /// count twice.
    pub fn record_arrival(
        &mut self,
        run_id: &str,
        from: &str,
        to: &str,
        expected_deps: usize,
    ) -> Arrival {
        let entry = self
            .entries
            .entry((run_id.to_string(), to.to_string()))
            .or_insert_with(|| StagingEntry::new(expected_deps));

        if entry.received_deps.iter().any(|d| d == from) {
            debug!(run_id, from, to, "duplicate arrival within staging round; ignored");
        } else {
            entry.received_deps.push(from.to_string());
        }

        let received = entry.received_deps.len();
        debug!(
            run_id,
            from,
            to,
            received,
            expected = entry.expected_deps,
            "recorded dependency arrival"
        );

        if entry.is_ready() {
            Arrival::Ready
        } else {
            Arrival::Waiting {
                received,
                expected: entry.expected_deps,
            }
        }
    }

    /// Whether `(run_id, to)` has exactly reached its threshold.
    pub fn is_ready(&self, run_id: &str, to: &str) -> bool {
        self.get(run_id, to).is_some_and(StagingEntry::is_ready)
    }

    pub fn get(&self, run_id: &str, to: &str) -> Option<&StagingEntry> {
        self.entries.get(&(run_id.to_string(), to.to_string()))
    }

    /// Remove and return a ready entry. Returns `None` if the entry does not
    /// exist or has not reached its threshold; such entries stay in place.
    pub fn consume(&mut self, run_id: &str, to: &str) -> Option<StagingEntry> {
        let key = (run_id.to_string(), to.to_string());
        if !self.entries.get(&key).is_some_and(StagingEntry::is_ready) {
            return None;
        }
        self.entries.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n_minus_one_arrivals_never_ready() {
        let mut table = StagingTable::new();
        assert_eq!(
            table.record_arrival("run_1", "a", "d", 3),
            Arrival::Waiting { received: 1, expected: 3 }
        );
        assert_eq!(
            table.record_arrival("run_1", "b", "d", 3),
            Arrival::Waiting { received: 2, expected: 3 }
        );
        assert!(!table.is_ready("run_1", "d"));
        assert!(table.consume("run_1", "d").is_none());

        assert_eq!(table.record_arrival("run_1", "c", "d", 3), Arrival::Ready);
        let entry = table.consume("run_1", "d").unwrap();
        assert_eq!(entry.received_deps, vec!["a", "b", "c"]);
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_arrivals_count_once() {
        let mut table = StagingTable::new();
        table.record_arrival("run_1", "a", "d", 2);
        assert_eq!(
            table.record_arrival("run_1", "a", "d", 2),
            Arrival::Waiting { received: 1, expected: 2 }
        );
    }

    #[test]
    fn consumed_entry_is_gone_and_next_arrival_starts_fresh() {
        let mut table = StagingTable::new();
        assert_eq!(table.record_arrival("run_1", "a", "b", 1), Arrival::Ready);
        assert!(table.consume("run_1", "b").is_some());
        assert!(table.consume("run_1", "b").is_none());

        assert_eq!(table.record_arrival("run_1", "a", "b", 1), Arrival::Ready);
        assert_eq!(table.get("run_1", "b").unwrap().received_deps, vec!["a"]);
    }

    #[test]
    fn runs_are_isolated() {
        let mut table = StagingTable::new();
        table.record_arrival("run_1", "a", "c", 2);
        table.record_arrival("run_2", "b", "c", 2);

        assert_eq!(table.get("run_1", "c").unwrap().received_deps, vec!["a"]);
        assert_eq!(table.get("run_2", "c").unwrap().received_deps, vec!["b"]);
        assert_eq!(table.len(), 2);
    }
}
