// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a settings file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a settings file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to defaults.
///
/// Used for the implicit default path; an explicitly requested file that is
/// missing is still an error at the call site.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if path.is_file() {
        load_and_validate(path)
    } else {
        debug!(path = %path.display(), "no settings file; using defaults");
        Ok(ConfigFile::default())
    }
}

/// `Flowrun.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Flowrun.toml")
}
