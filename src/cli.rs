// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `flowrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowrun",
    version,
    about = "Execute a flowchart of analysis steps across one or more runs.",
    long_about = None
)]
pub struct CliArgs {
    /// Flowchart document (JSON) to execute.
    #[arg(long, short = 'f', value_name = "PATH")]
    pub flowchart: PathBuf,

    /// Path to the settings file (TOML).
    ///
    /// Default: `Flowrun.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override `[config].results_dir`.
    #[arg(long, value_name = "DIR")]
    pub results_dir: Option<PathBuf>,

    /// Override `[config].run_name`. Reusing a name resumes its index.
    #[arg(long, value_name = "NAME")]
    pub run_name: Option<String>,

    /// Override `[config].start_node`.
    #[arg(long, value_name = "NODE")]
    pub start_node: Option<String>,

    /// Override `[config].runs`.
    #[arg(long, value_name = "N")]
    pub runs: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLOWRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the flowchart, but don't execute any node.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
