// src/exec/builtin.rs

//! Tasks that ship with the crate.
//!
//! Domain analyses are registered by the embedding application; these cover
//! the generic steps every flowchart needs.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

use super::backend::{Task, TaskContext, TaskFuture, TaskRegistry};
use crate::types::Payload;

pub const START: &str = "Start";
pub const COMBINE_LISTS: &str = "Combine Lists";
pub const PASSTHROUGH: &str = "Passthrough";

const STRUCTURES_LIST: &str = "structures_list";

/// Register [`START`], [`COMBINE_LISTS`] and [`PASSTHROUGH`].
pub fn register_builtins(registry: &mut TaskRegistry) {
    registry
        .register(START, StartTask)
        .register(COMBINE_LISTS, CombineListsTask)
        .register(PASSTHROUGH, PassthroughTask);
}

/// Gathers the `structures` arrays of every parameter group into
/// `structures_list`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartTask;

impl Task for StartTask {
    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move { start(ctx) })
    }
}

/// Like [`StartTask`], but also keeps the `structures_list` it received.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombineListsTask;

impl Task for CombineListsTask {
    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move { combine_lists(ctx) })
    }
}

/// Returns its merged input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTask;

impl Task for PassthroughTask {
    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move { passthrough(ctx) })
    }
}

fn start(ctx: &TaskContext) -> Result<Payload> {
    let structures = collect_structures(&ctx.node.parameters);
    info!(
        run_id = %ctx.node.run_id,
        node = %ctx.node.node_id,
        count = structures.len(),
        "collected structures from parameters"
    );

    let mut out = base_output(ctx);
    out.insert(STRUCTURES_LIST.to_string(), Value::Array(structures));
    Ok(out)
}

fn combine_lists(ctx: &TaskContext) -> Result<Payload> {
    let mut structures = collect_structures(&ctx.node.parameters);
    match ctx.node.input.get(STRUCTURES_LIST) {
        Some(Value::Array(items)) => structures.extend(items.iter().cloned()),
        Some(Value::Null) | None => {}
        Some(other) => structures.push(other.clone()),
    }
    debug!(node = %ctx.node.node_id, count = structures.len(), "combined structure lists");

    let mut out = base_output(ctx);
    out.insert(STRUCTURES_LIST.to_string(), Value::Array(structures));
    Ok(out)
}

fn passthrough(ctx: &TaskContext) -> Result<Payload> {
    Ok(ctx.node.input.clone())
}

/// Every `structures` array found one level down in `parameters`, in
/// parameter order.
fn collect_structures(parameters: &Value) -> Vec<Value> {
    let Some(groups) = parameters.as_object() else {
        return Vec::new();
    };
    groups
        .values()
        .filter_map(|group| group.get("structures"))
        .flat_map(|s| match s {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        })
        .collect()
}

/// Job-wide locations tasks pass downstream.
fn base_output(ctx: &TaskContext) -> Payload {
    let mut out = Payload::new();
    out.insert(
        "output_directory".to_string(),
        Value::String(ctx.output_dir.display().to_string()),
    );
    if let Some(input) = &ctx.input_file {
        out.insert(
            "input_file".to_string(),
            Value::String(input.display().to_string()),
        );
    }
    out
}
