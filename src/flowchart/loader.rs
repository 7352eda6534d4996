// src/flowchart/loader.rs

use std::fs;
use std::path::Path;

use crate::errors::Result;
use crate::flowchart::model::{Flowchart, RawFlowchart};

/// Load and validate a flowchart document from disk.
///
/// Structural validation happens here; task types are checked later against
/// the task backend, before any node executes.
pub fn load_flowchart(path: impl AsRef<Path>) -> Result<Flowchart> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_flowchart(&contents)
}

/// Parse and validate a flowchart from a JSON string.
pub fn parse_flowchart(json: &str) -> Result<Flowchart> {
    let raw: RawFlowchart = serde_json::from_str(json)?;
    Flowchart::try_from(raw)
}
