// src/exec/external.rs

//! `External Program` task: run a configured executable over a directory of
//! input files and collect values from what it writes.
//!
//! Node parameters:
//!
//! ```json
//! {
//!   "input_dir": "input_files",
//!   "output_dir": "output_files",
//!   "extract": { "rwp": "r_wp\\s+([\\d.]+)" }
//! }
//! ```
//!
//! `output_dir` defaults to the job's output directory. Each `extract`
//! pattern's first capture group is parsed as a number from every output
//! file and stored under `results.<file stem>.<key>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::backend::{Task, TaskContext, TaskFuture};
use super::executor_loop::run_bounded;
use super::task_runner::{run_program, ProgramRun};
use crate::types::Payload;

pub const EXTERNAL_PROGRAM: &str = "External Program";

/// Job-wide settings for external program nodes (`[external]` in the config).
#[derive(Debug, Clone)]
pub struct ExternalSettings {
    pub program: PathBuf,
    pub max_parallel: usize,
    pub input_extension: String,
    pub output_extension: String,
}

#[derive(Debug, Deserialize)]
struct ExternalParams {
    input_dir: PathBuf,
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    extract: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ExternalProgramTask {
    settings: ExternalSettings,
}

impl ExternalProgramTask {
    pub fn new(settings: ExternalSettings) -> Self {
        Self { settings }
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<Payload> {
        let params: ExternalParams = serde_json::from_value(ctx.node.parameters.clone())
            .with_context(|| format!("parameters of node '{}'", ctx.node.node_id))?;
        let patterns = compile_patterns(&params.extract)?;

        // The program runs with `output_dir` as cwd, so nothing handed to it
        // may stay relative to ours.
        let output_dir = params.output_dir.unwrap_or_else(|| ctx.output_dir.clone());
        let output_dir = std::path::absolute(&output_dir)
            .with_context(|| format!("resolving output dir {:?}", output_dir))?;
        let input_dir = std::path::absolute(&params.input_dir)
            .with_context(|| format!("resolving input dir {:?}", params.input_dir))?;
        tokio::fs::create_dir_all(&output_dir)
            .await
            .with_context(|| format!("creating output dir {:?}", output_dir))?;

        let inputs = list_inputs(&input_dir, &self.settings.input_extension).await?;
        if inputs.is_empty() {
            warn!(
                node = %ctx.node.node_id,
                dir = %input_dir.display(),
                extension = %self.settings.input_extension,
                "no input files found"
            );
        }

        let program = resolve_program(&self.settings.program)?;
        let workdir = output_dir.clone();
        let runs = run_bounded(inputs, self.settings.max_parallel, move |input: PathBuf| {
            let program = program.clone();
            let workdir = workdir.clone();
            async move { run_program(&program, &input, &workdir).await }
        })
        .await
        .with_context(|| format!("external program for node '{}'", ctx.node.node_id))?;

        let mut results = Map::new();
        let mut output_files = Vec::new();
        for run in &runs {
            let Some(stem) = run.input_file.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let out_file = self.locate_output(&output_dir, run, &stem);
            output_files.push(Value::String(out_file.display().to_string()));

            if !patterns.is_empty() {
                let values = extract_values(&out_file, &patterns).await?;
                results.insert(stem, Value::Object(values));
            }
        }

        info!(
            node = %ctx.node.node_id,
            files = runs.len(),
            "external program finished for all inputs"
        );

        let mut out = ctx.node.input.clone();
        out.insert("output_directory".into(), Value::String(output_dir.display().to_string()));
        out.insert("output_files".into(), Value::Array(output_files));
        out.insert("results".into(), Value::Object(results));
        Ok(out)
    }

    /// `<output_dir>/<stem>.<ext>`, or next to the input file if the program
    /// wrote it there instead.
    fn locate_output(&self, output_dir: &Path, run: &ProgramRun, stem: &str) -> PathBuf {
        let name = format!("{stem}.{}", self.settings.output_extension);
        let in_output_dir = output_dir.join(&name);
        if in_output_dir.is_file() {
            return in_output_dir;
        }
        let beside_input = run.input_file.with_file_name(&name);
        if beside_input.is_file() {
            beside_input
        } else {
            in_output_dir
        }
    }
}

impl Task for ExternalProgramTask {
    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(self.execute(ctx))
    }
}

/// A program given with a directory part (`./tc`, `bin/tc`) is made absolute;
/// a bare name is left for the `PATH` lookup.
fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 && program.is_relative() {
        std::path::absolute(program).with_context(|| format!("resolving program {:?}", program))
    } else {
        Ok(program.to_path_buf())
    }
}

fn compile_patterns(extract: &BTreeMap<String, String>) -> Result<Vec<(String, Regex)>> {
    extract
        .iter()
        .map(|(key, pattern)| {
            let re = Regex::new(pattern)
                .with_context(|| format!("invalid extract pattern for '{key}': {pattern}"))?;
            if re.captures_len() < 2 {
                bail!("extract pattern for '{key}' needs a capture group: {pattern}");
            }
            Ok((key.clone(), re))
        })
        .collect()
}

/// Files in `dir` with `extension`, sorted by path.
async fn list_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("reading input dir {:?}", dir))?;

    let mut inputs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|e| e == extension) {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

async fn extract_values(file: &Path, patterns: &[(String, Regex)]) -> Result<Map<String, Value>> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading program output {:?}", file))?;

    let mut values = Map::new();
    for (key, re) in patterns {
        let value = re
            .captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number);

        if value.is_none() {
            warn!(file = %file.display(), key = %key, "pattern did not match a number");
        }
        values.insert(key.clone(), value.unwrap_or(Value::Null));
    }
    Ok(values)
}
