// src/condition/mod.rs

//! Branch conditions on flowchart connections.
//!
//! A condition inspects the full output of the node a connection leaves and
//! decides whether the connection fires. The set of conditions is closed and
//! dispatched by tag. Evaluation is fail-closed: an unknown tag, a missing
//! key, or a malformed parameter all resolve to `false` so one bad edge
//! cannot take down a run.

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{Payload, ITERATION_KEY};

/// Known condition variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    ListLengthAtLeast,
    ListLengthAtMost,
    GradientExceeds,
    Contains,
    RunCountAtLeast,
    RunCountAtMost,
    Finished,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 7] = [
        ConditionKind::ListLengthAtLeast,
        ConditionKind::ListLengthAtMost,
        ConditionKind::GradientExceeds,
        ConditionKind::Contains,
        ConditionKind::RunCountAtLeast,
        ConditionKind::RunCountAtMost,
        ConditionKind::Finished,
    ];

    /// Resolve a tag, accepting both the authoring tool's labels and short
    /// snake_case aliases.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(tag) || k.alias() == tag)
    }

    /// Label used by the flowchart authoring tool.
    pub fn label(self) -> &'static str {
        match self {
            ConditionKind::ListLengthAtLeast => "List length (greater than equal to)",
            ConditionKind::ListLengthAtMost => "List length (less than equal to)",
            ConditionKind::GradientExceeds => "RWP gradient",
            ConditionKind::Contains => "Contains",
            ConditionKind::RunCountAtLeast => "Number of runs (greater than equal to)",
            ConditionKind::RunCountAtMost => "Number of runs (less than equal to)",
            ConditionKind::Finished => "Finished",
        }
    }

    pub fn alias(self) -> &'static str {
        match self {
            ConditionKind::ListLengthAtLeast => "list_length_gte",
            ConditionKind::ListLengthAtMost => "list_length_lte",
            ConditionKind::GradientExceeds => "gradient_exceeds",
            ConditionKind::Contains => "contains",
            ConditionKind::RunCountAtLeast => "runs_gte",
            ConditionKind::RunCountAtMost => "runs_lte",
            ConditionKind::Finished => "finished",
        }
    }

    /// Evaluate against the source node's output. Errors mean "malformed
    /// input" and are turned into `false` by [`evaluate`].
    pub fn check(self, param: Option<&Value>, data: &Payload) -> Result<bool> {
        match self {
            ConditionKind::ListLengthAtLeast => {
                Ok(structure_list(data)?.len() as f64 >= number_param(param)?)
            }
            ConditionKind::ListLengthAtMost => {
                Ok(structure_list(data)?.len() as f64 <= number_param(param)?)
            }
            ConditionKind::GradientExceeds => {
                let threshold = number_param(param)?;
                for entry in structure_list(data)? {
                    let gradient = entry
                        .get("rwp_gradient")
                        .and_then(as_number)
                        .ok_or_else(|| anyhow!("structure entry without numeric rwp_gradient"))?;
                    if gradient > threshold {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ConditionKind::Contains => {
                let needle = param.ok_or_else(|| anyhow!("missing condition_param"))?;
                Ok(structure_list(data)?.iter().any(|v| v == needle))
            }
            ConditionKind::RunCountAtLeast => Ok(run_count(data)? >= number_param(param)?),
            ConditionKind::RunCountAtMost => Ok(run_count(data)? <= number_param(param)?),
            ConditionKind::Finished => {
                let wanted = bool_param(param)?;
                let finished = data
                    .get("results")
                    .and_then(|r| r.get("finished"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                Ok(finished == wanted)
            }
        }
    }
}

/// Decide whether a connection fires.
///
/// `None` (no condition) always fires. Unknown tags and evaluation failures
/// never fire.
pub fn evaluate(tag: Option<&str>, param: Option<&Value>, data: &Payload) -> bool {
    let Some(tag) = tag else {
        return true;
    };

    let Some(kind) = ConditionKind::from_tag(tag) else {
        warn!(condition = %tag, "unknown condition tag; connection does not fire");
        return false;
    };

    match kind.check(param, data) {
        Ok(fires) => {
            debug!(condition = kind.alias(), ?param, fires, "condition evaluated");
            fires
        }
        Err(err) => {
            warn!(
                condition = kind.alias(),
                ?param,
                error = %err,
                "condition could not be evaluated; connection does not fire"
            );
            false
        }
    }
}

fn structure_list(data: &Payload) -> Result<&Vec<Value>> {
    data.get("structures_list")
        .or_else(|| data.get("structure_list"))
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("output has no structures_list array"))
}

fn run_count(data: &Payload) -> Result<f64> {
    data.get(ITERATION_KEY)
        .and_then(as_number)
        .ok_or_else(|| anyhow!("output has no numeric iteration"))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number_param(param: Option<&Value>) -> Result<f64> {
    match param {
        Some(v) => as_number(v).ok_or_else(|| anyhow!("condition_param {v} is not numeric")),
        None => bail!("missing condition_param"),
    }
}

fn bool_param(param: Option<&Value>) -> Result<bool> {
    match param {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => Ok(s.trim().eq_ignore_ascii_case("true")),
        Some(other) => bail!("condition_param {other} is not a boolean"),
        None => bail!("missing condition_param"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Payload {
        match v {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn no_condition_always_fires() {
        assert!(evaluate(None, None, &Payload::new()));
    }

    #[test]
    fn unknown_tag_never_fires() {
        let data = payload(json!({ "structures_list": [1, 2, 3] }));
        assert!(!evaluate(Some("Phase of the moon"), Some(&json!("1")), &data));
    }

    #[test]
    fn list_length_bounds_are_inclusive() {
        let data = payload(json!({ "structures_list": ["a", "b", "c"] }));
        let gte = ConditionKind::ListLengthAtLeast.label();
        let lte = ConditionKind::ListLengthAtMost.label();

        assert!(evaluate(Some(gte), Some(&json!("3")), &data));
        assert!(!evaluate(Some(gte), Some(&json!(4)), &data));
        assert!(evaluate(Some(lte), Some(&json!(3)), &data));
        assert!(!evaluate(Some(lte), Some(&json!("2")), &data));
    }

    #[test]
    fn list_conditions_fail_closed_without_list() {
        let data = payload(json!({ "other": 1 }));
        assert!(!evaluate(Some("list_length_lte"), Some(&json!(100)), &data));
        assert!(!evaluate(Some("contains"), Some(&json!("a")), &data));
    }

    #[test]
    fn gradient_fires_when_any_entry_exceeds() {
        let data = payload(json!({
            "structure_list": [ { "rwp_gradient": 0.1 }, { "rwp_gradient": 2.5 } ]
        }));
        assert!(evaluate(Some("RWP gradient"), Some(&json!(1.0)), &data));
        assert!(!evaluate(Some("RWP gradient"), Some(&json!("3")), &data));
    }

    #[test]
    fn contains_matches_whole_elements() {
        let data = payload(json!({ "structures_list": ["quartz.str", "calcite.str"] }));
        assert!(evaluate(Some("Contains"), Some(&json!("quartz.str")), &data));
        assert!(!evaluate(Some("Contains"), Some(&json!("quartz")), &data));
    }

    #[test]
    fn run_count_uses_iteration() {
        let data = payload(json!({ "iteration": 3 }));
        assert!(evaluate(Some("runs_gte"), Some(&json!("3")), &data));
        assert!(!evaluate(Some("runs_gte"), Some(&json!(4)), &data));
        assert!(evaluate(Some("Number of runs (less than equal to)"), Some(&json!(3)), &data));
        assert!(!evaluate(Some("runs_lte"), Some(&json!(2)), &data));
    }

    #[test]
    fn finished_compares_flag_with_param() {
        let done = payload(json!({ "results": { "finished": true } }));
        let not_done = payload(json!({ "results": {} }));

        assert!(evaluate(Some("Finished"), Some(&json!("True")), &done));
        assert!(!evaluate(Some("Finished"), Some(&json!(false)), &done));
        assert!(evaluate(Some("finished"), Some(&json!("false")), &not_done));
        assert!(!evaluate(Some("finished"), None, &done));
    }

    #[test]
    fn tags_resolve_by_label_case_insensitively_and_alias() {
        assert_eq!(
            ConditionKind::from_tag("contains"),
            Some(ConditionKind::Contains)
        );
        assert_eq!(
            ConditionKind::from_tag(" finished "),
            Some(ConditionKind::Finished)
        );
        for kind in ConditionKind::ALL {
            assert_eq!(ConditionKind::from_tag(kind.label()), Some(kind));
            assert_eq!(ConditionKind::from_tag(kind.alias()), Some(kind));
        }
    }
}
