// src/logging.rs

//! Logging setup for `flowrun` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `FLOWRUN_LOG` environment variable (a level like "debug", or full
//!    directives like "flowrun::dag=trace,info")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for dry-run output.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "FLOWRUN_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_str());
    }
    env.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
