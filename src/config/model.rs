// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level settings as read from a TOML file.
///
/// ```toml
/// [config]
/// results_dir = "results"
/// run_name = "quartz_screening"
/// start_node = "node_1"
/// runs = 2
///
/// [external]
/// program = "/opt/refine/tc"
/// max_parallel = 10
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub external: ExternalSection,
}

/// Validated settings. Construct through `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub external: ExternalSection,
}

impl ConfigFile {
    /// Construct without validation. Callers must have checked the sections.
    pub(crate) fn new_unchecked(config: ConfigSection, external: ExternalSection) -> Self {
        Self { config, external }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(ConfigSection::default(), ExternalSection::default())
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Root of the persisted layout; each job lives in
    /// `<results_dir>/<run_name>/`.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Job name. If unset, `<flowchart stem>_<unix seconds>` is used.
    #[serde(default)]
    pub run_name: Option<String>,

    /// Node every run starts at.
    #[serde(default = "default_start_node")]
    pub start_node: String,

    /// Number of independent runs (`run_1` .. `run_N`).
    #[serde(default = "default_runs")]
    pub runs: usize,

    /// Upper bound on node executions across all runs.
    #[serde(default = "default_max_executions")]
    pub max_executions: usize,

    /// Directory handed to tasks for their side artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Optional sample file handed to every task.
    #[serde(default)]
    pub input_file: Option<PathBuf>,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_start_node() -> String {
    "node_1".to_string()
}

fn default_runs() -> usize {
    1
}

fn default_max_executions() -> usize {
    10_000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output_files")
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            run_name: None,
            start_node: default_start_node(),
            runs: default_runs(),
            max_executions: default_max_executions(),
            output_dir: default_output_dir(),
            input_file: None,
        }
    }
}

/// `[external]` section: the executable behind `External Program` nodes.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalSection {
    /// If unset, `External Program` nodes are rejected before execution.
    #[serde(default)]
    pub program: Option<PathBuf>,

    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default = "default_input_extension")]
    pub input_extension: String,

    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

fn default_max_parallel() -> usize {
    10
}

fn default_input_extension() -> String {
    "inp".to_string()
}

fn default_output_extension() -> String {
    "out".to_string()
}

impl Default for ExternalSection {
    fn default() -> Self {
        Self {
            program: None,
            max_parallel: default_max_parallel(),
            input_extension: default_input_extension(),
            output_extension: default_output_extension(),
        }
    }
}
