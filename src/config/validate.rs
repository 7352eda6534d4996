// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{FlowrunError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FlowrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.external))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    validate_external(cfg)?;
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    let c = &cfg.config;

    if c.start_node.trim().is_empty() {
        return Err(FlowrunError::ConfigError(
            "[config].start_node must not be empty".to_string(),
        ));
    }
    if c.runs == 0 {
        return Err(FlowrunError::ConfigError(
            "[config].runs must be >= 1 (got 0)".to_string(),
        ));
    }
    if c.max_executions == 0 {
        return Err(FlowrunError::ConfigError(
            "[config].max_executions must be >= 1 (got 0)".to_string(),
        ));
    }
    if let Some(name) = &c.run_name {
        if name.trim().is_empty() || name.contains(['/', '\\']) {
            return Err(FlowrunError::ConfigError(format!(
                "[config].run_name must be a plain directory name (got '{name}')"
            )));
        }
    }
    Ok(())
}

fn validate_external(cfg: &RawConfigFile) -> Result<()> {
    let e = &cfg.external;

    if e.max_parallel == 0 {
        return Err(FlowrunError::ConfigError(
            "[external].max_parallel must be >= 1 (got 0)".to_string(),
        ));
    }
    for (field, ext) in [
        ("input_extension", &e.input_extension),
        ("output_extension", &e.output_extension),
    ] {
        if ext.is_empty() || ext.starts_with('.') {
            return Err(FlowrunError::ConfigError(format!(
                "[external].{field} must be a bare extension like \"inp\" (got '{ext}')"
            )));
        }
    }
    Ok(())
}

/// Validate an already-constructed config (e.g. after CLI overrides).
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_raw_config(&RawConfigFile {
        config: cfg.config.clone(),
        external: cfg.external.clone(),
    })
}
