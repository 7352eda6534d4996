// src/store/mod.rs

//! Append-only, iteration-versioned persistence of node outputs.
//!
//! Layout under `<results_dir>/<run_name>/`:
//!
//! ```text
//! index.json
//! <run_id>/<node_id>/node_info.json            {"iteration": N}
//! <run_id>/<node_id>/<node_id>_iter_<N>.json
//! ```
//!
//! [`OutputStore`] owns the [`Index`]; nothing else mutates it. `put` is the
//! only write path and always writes the record, then the node counter, then
//! the index. The index never points at a record that was not written, and a
//! failed record write leaves the counter where it was.

pub mod index;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{FlowrunError, Result};
use crate::fs::FileSystem;
use crate::types::{ITERATION_KEY, Payload};

pub use index::Index;

const INDEX_FILE: &str = "index.json";
const NODE_INFO_FILE: &str = "node_info.json";

/// Contents of `node_info.json`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct NodeInfo {
    iteration: u64,
}

#[derive(Debug)]
pub struct OutputStore {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    index: Index,
}

impl OutputStore {
    /// Open (or create) the store for `run_name` under `results_dir`.
    ///
    /// An existing `index.json` is loaded and treated as the source of truth,
    /// so a restarted process continues where the previous one stopped.
    pub fn open(
        fs: Arc<dyn FileSystem>,
        results_dir: impl AsRef<Path>,
        run_name: &str,
    ) -> Result<Self> {
        let root = std::path::absolute(results_dir.as_ref().join(run_name))?;
        let index_path = root.join(INDEX_FILE);

        let index = if fs.is_file(&index_path) {
            let raw = fs.read_to_string(&index_path)?;
            let index: Index = serde_json::from_str(&raw)?;
            info!(path = ?index_path, runs = index.run_ids().count(), "loaded existing output index");
            index
        } else {
            debug!(path = ?index_path, "no existing index; starting empty");
            Index::new()
        };

        Ok(Self { fs, root, index })
    }

    /// `<results_dir>/<run_name>` as an absolute path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn node_dir(&self, run_id: &str, node_id: &str) -> PathBuf {
        self.root.join(run_id).join(node_id)
    }

    /// Persist one execution's output and return its iteration.
    ///
    /// The `iteration` key of the stored payload is always set here,
    /// overriding anything the task produced.
    pub fn put(&mut self, run_id: &str, node_id: &str, mut payload: Payload) -> Result<u64> {
        let iteration = self.next_iteration(run_id, node_id)?;
        let node_dir = self.node_dir(run_id, node_id);

        payload.insert(ITERATION_KEY.to_string(), Value::from(iteration));
        let record_path = node_dir.join(format!("{node_id}_iter_{iteration}.json"));
        self.fs
            .write(&record_path, &serde_json::to_vec_pretty(&payload)?)?;

        let info = NodeInfo { iteration };
        self.fs
            .write(&node_dir.join(NODE_INFO_FILE), &serde_json::to_vec_pretty(&info)?)?;

        self.index.insert(run_id, node_id, iteration, record_path.clone());
        self.fs
            .write(&self.index_path(), &serde_json::to_vec_pretty(&self.index)?)?;

        debug!(run_id, node = node_id, iteration, path = ?record_path, "stored node output");
        Ok(iteration)
    }

    /// The iteration the next `put` for `(run_id, node_id)` will assign.
    ///
    /// Takes the larger of the on-disk counter and the index so neither a
    /// stale counter nor a stale index can cause an iteration to be reused.
    pub fn next_iteration(&self, run_id: &str, node_id: &str) -> Result<u64> {
        let info_path = self.node_dir(run_id, node_id).join(NODE_INFO_FILE);
        let counter = if self.fs.is_file(&info_path) {
            let raw = self.fs.read_to_string(&info_path)?;
            serde_json::from_str::<NodeInfo>(&raw)?.iteration
        } else {
            0
        };
        let indexed = self.index.latest_iteration(run_id, node_id).unwrap_or(0);
        Ok(counter.max(indexed) + 1)
    }

    /// Run ids with at least one record, sorted.
    pub fn runs(&self) -> Vec<&str> {
        self.index.run_ids().collect()
    }

    /// Whether `(run_id, node_id)` has any recorded output.
    pub fn has_output(&self, run_id: &str, node_id: &str) -> bool {
        self.index.latest_iteration(run_id, node_id).is_some()
    }

    pub fn latest_iteration(&self, run_id: &str, node_id: &str) -> Option<u64> {
        self.index.latest_iteration(run_id, node_id)
    }

    /// Output with the highest iteration on record.
    pub fn get_latest(&self, run_id: &str, node_id: &str) -> Result<Payload> {
        let iteration = self.index.latest_iteration(run_id, node_id).ok_or_else(|| {
            FlowrunError::MissingOutput {
                run_id: run_id.to_string(),
                node: node_id.to_string(),
                iteration: None,
            }
        })?;
        self.get(run_id, node_id, iteration)
    }

    /// Output of a specific iteration.
    ///
    /// A missing index entry is [`FlowrunError::MissingOutput`]; an index
    /// entry whose file is gone is [`FlowrunError::IndexInconsistent`].
    pub fn get(&self, run_id: &str, node_id: &str, iteration: u64) -> Result<Payload> {
        let path = self
            .index
            .location(run_id, node_id, iteration)
            .ok_or_else(|| FlowrunError::MissingOutput {
                run_id: run_id.to_string(),
                node: node_id.to_string(),
                iteration: Some(iteration),
            })?;

        if !self.fs.is_file(path) {
            return Err(FlowrunError::IndexInconsistent {
                run_id: run_id.to_string(),
                node: node_id.to_string(),
                iteration,
                path: path.to_path_buf(),
            });
        }

        let raw = self.fs.read_to_string(path)?;
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            other => Err(FlowrunError::Other(anyhow::anyhow!(
                "record {:?} is not a JSON object: {}",
                path,
                other
            ))),
        }
    }
}
