// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Flowchart error: {0}")]
    FlowchartError(String),

    #[error("Node '{node}' has unknown task type '{task_type}'")]
    UnknownTaskType { node: String, task_type: String },

    #[error("Node not found: {0}")]
    UnknownNode(String),

    #[error("Run '{run_id}': node '{node}' requires output from '{source_node}', which has none")]
    MissingUpstream {
        run_id: String,
        node: String,
        source_node: String,
    },

    #[error("Run '{run_id}': no output recorded for node '{node}'{}", iteration_suffix(.iteration))]
    MissingOutput {
        run_id: String,
        node: String,
        iteration: Option<u64>,
    },

    #[error(
        "Index inconsistency: run '{run_id}', node '{node}', iteration {iteration} points to missing file {path:?}"
    )]
    IndexInconsistent {
        run_id: String,
        node: String,
        iteration: u64,
        path: PathBuf,
    },

    #[error("Deadlock: waiting nodes can never become ready: {}", waiting.join(", "))]
    Deadlock { waiting: Vec<String> },

    #[error("Execution limit of {limit} node executions exceeded (runaway loop?)")]
    ExecutionLimit { limit: usize },

    #[error("Task for node '{node}' failed: {message}")]
    TaskFailed { node: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn iteration_suffix(iteration: &Option<u64>) -> String {
    match iteration {
        Some(i) => format!(" at iteration {i}"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, FlowrunError>;
