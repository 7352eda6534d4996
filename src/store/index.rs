// src/store/index.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, RunId};

/// Durable map `run_id -> node_id -> "<iteration>" -> file location`.
///
/// Serialized as-is to `index.json`. Iteration keys are strings on disk, so
/// "latest" is computed numerically rather than by key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index {
    runs: BTreeMap<RunId, BTreeMap<NodeId, BTreeMap<String, PathBuf>>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, run_id: &str, node_id: &str, iteration: u64, location: PathBuf) {
        self.runs
            .entry(run_id.to_string())
            .or_default()
            .entry(node_id.to_string())
            .or_default()
            .insert(iteration.to_string(), location);
    }

    pub fn location(&self, run_id: &str, node_id: &str, iteration: u64) -> Option<&Path> {
        self.iterations_of(run_id, node_id)?
            .get(&iteration.to_string())
            .map(PathBuf::as_path)
    }

    /// Highest iteration recorded for `(run_id, node_id)`.
    pub fn latest_iteration(&self, run_id: &str, node_id: &str) -> Option<u64> {
        self.iterations_of(run_id, node_id)?
            .keys()
            .filter_map(|k| k.parse::<u64>().ok())
            .max()
    }

    /// Every recorded iteration of `(run_id, node_id)`, ascending.
    pub fn iterations(&self, run_id: &str, node_id: &str) -> Vec<u64> {
        let mut its: Vec<u64> = self
            .iterations_of(run_id, node_id)
            .map(|m| m.keys().filter_map(|k| k.parse().ok()).collect())
            .unwrap_or_default();
        its.sort_unstable();
        its
    }

    pub fn run_ids(&self) -> impl Iterator<Item = &str> {
        self.runs.keys().map(String::as_str)
    }

    /// Nodes with at least one recorded output in `run_id`.
    pub fn node_ids(&self, run_id: &str) -> Vec<&str> {
        self.runs
            .get(run_id)
            .map(|nodes| nodes.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn iterations_of(&self, run_id: &str, node_id: &str) -> Option<&BTreeMap<String, PathBuf>> {
        self.runs.get(run_id)?.get(node_id)
    }
}
