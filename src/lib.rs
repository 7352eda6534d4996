// src/lib.rs

pub mod cli;
pub mod condition;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod flowchart;
pub mod fs;
pub mod logging;
pub mod store;
pub mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::model::ConfigFile;
use crate::config::{default_config_path, load_and_validate, load_or_default, validate_config};
use crate::engine::{RunOutcome, RunReport, Runtime, RuntimeOptions};
use crate::errors::FlowrunError;
use crate::exec::ExternalSettings;
use crate::flowchart::validate::Analysis;
use crate::flowchart::{analyze, load_flowchart, Flowchart};
use crate::fs::RealFileSystem;
use crate::store::OutputStore;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings loading (file + CLI overrides)
/// - flowchart loading and analysis
/// - output store, task registry, runtime
/// - seeding `run_1` .. `run_N` at the start node
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;
    let flowchart = load_flowchart(&args.flowchart)
        .with_context(|| format!("loading flowchart {:?}", args.flowchart))?;

    let start_node = cfg.config.start_node.clone();
    if flowchart.node(&start_node).is_none() {
        return Err(FlowrunError::UnknownNode(start_node).into());
    }
    let analysis = analyze(&flowchart, &start_node);

    if args.dry_run {
        print_dry_run(&flowchart, &cfg, &analysis);
        return Ok(());
    }

    let run_name = cfg
        .config
        .run_name
        .clone()
        .unwrap_or_else(|| default_run_name(&args.flowchart));
    let store = OutputStore::open(Arc::new(RealFileSystem), &cfg.config.results_dir, &run_name)?;
    info!(root = %store.root().display(), "output store ready");

    let registry = exec::default_registry(external_settings(&cfg));
    let options = RuntimeOptions {
        max_executions: cfg.config.max_executions,
        output_dir: cfg.config.output_dir.clone(),
        input_file: cfg.config.input_file.clone(),
    };

    let mut runtime = Runtime::new(flowchart, store, registry, options)?;
    for i in 1..=cfg.config.runs {
        runtime.seed(&format!("run_{i}"), &start_node)?;
    }

    let report = runtime.run().await?;
    summarize(&report)
}

/// Settings file (explicit, or the default path if present) with CLI
/// overrides applied and re-validated.
fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    let mut cfg = match &args.config {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("loading settings {:?}", path))?,
        None => load_or_default(default_config_path())?,
    };

    if let Some(dir) = &args.results_dir {
        cfg.config.results_dir = dir.clone();
    }
    if let Some(name) = &args.run_name {
        cfg.config.run_name = Some(name.clone());
    }
    if let Some(node) = &args.start_node {
        cfg.config.start_node = node.clone();
    }
    if let Some(runs) = args.runs {
        cfg.config.runs = runs;
    }

    validate_config(&cfg)?;
    debug!(?cfg, "effective settings");
    Ok(cfg)
}

fn external_settings(cfg: &ConfigFile) -> Option<ExternalSettings> {
    let program = cfg.external.program.clone()?;
    Some(ExternalSettings {
        program,
        max_parallel: cfg.external.max_parallel,
        input_extension: cfg.external.input_extension.clone(),
        output_extension: cfg.external.output_extension.clone(),
    })
}

/// `<flowchart stem>_<unix seconds>`.
fn default_run_name(flowchart: &Path) -> String {
    let stem = flowchart
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "flowchart".to_string());
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{stem}_{secs}")
}

fn summarize(report: &RunReport) -> Result<()> {
    info!(
        executions = report.executions.len(),
        completed_runs = ?report.completed_runs,
        "all runs processed"
    );
    for failure in &report.failures {
        warn!(%failure, "node failed");
    }

    if let RunOutcome::Deadlocked { waiting } = &report.outcome {
        return Err(FlowrunError::Deadlock {
            waiting: waiting.clone(),
        }
        .into());
    }
    if let Some(first) = report.failures.first() {
        return Err(anyhow::Error::from(first.to_error())
            .context(format!("{} node execution(s) failed", report.failures.len())));
    }
    Ok(())
}

/// Simple dry-run output: print nodes, gates, connections and loops.
fn print_dry_run(flowchart: &Flowchart, cfg: &ConfigFile, analysis: &Analysis) {
    println!("flowrun dry-run");
    println!("  config.results_dir = {}", cfg.config.results_dir.display());
    println!("  config.start_node = {}", cfg.config.start_node);
    println!("  config.runs = {}", cfg.config.runs);
    println!("  config.max_executions = {}", cfg.config.max_executions);
    if let Some(program) = &cfg.external.program {
        println!("  external.program = {}", program.display());
    }
    println!();

    println!("nodes ({}):", flowchart.nodes().len());
    for node in flowchart.nodes() {
        println!("  - {} ({})", node.id, node.label());
        println!("      task_type: {}", node.task_type);
        if !node.incoming_params.is_empty() {
            println!("      dependencies: {:?}", node.dependency_mode());
            for param in &node.incoming_params {
                println!("        {} -> {:?}", param.source, param.keys);
            }
        }
        if node.expected_deps > 0 {
            println!("      expected_deps: {}", node.expected_deps);
        }
    }
    println!();

    println!("connections ({}):", flowchart.connections().len());
    for conn in flowchart.connections() {
        match conn.condition_tag() {
            Some(tag) => println!(
                "  - {} -> {} [{} {}]",
                conn.from,
                conn.to,
                tag,
                conn.condition_param
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_default()
            ),
            None => println!("  - {} -> {}", conn.from, conn.to),
        }
    }

    if !flowchart.loops().is_empty() {
        println!();
        println!("loops:");
        for group in flowchart.loops() {
            println!("  - {:?}", group);
        }
    }

    if !analysis.is_clean() {
        println!();
        println!("warnings:");
        for cycle in &analysis.undeclared_cycles {
            println!("  - undeclared cycle: {:?}", cycle);
        }
        for node in &analysis.unreachable {
            println!("  - unreachable from start: {node}");
        }
        for node in &analysis.unsatisfiable_gates {
            println!("  - expected_deps can never be met: {node}");
        }
    }

    debug!("dry-run complete (no execution)");
}
