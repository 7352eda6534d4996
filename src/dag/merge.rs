// src/dag/merge.rs

//! Fan-in merging of upstream output values.
//!
//! When several sources deliver the same key, values are folded left to
//! right in source order:
//! - sequence + sequence: concatenate
//! - sequence + scalar / scalar + sequence: the scalar joins the sequence
//! - scalar + scalar: `[existing, incoming]`

use serde_json::Value;

use crate::types::Payload;

/// A JSON value seen through the lens of the merge rule.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeValue {
    Scalar(Value),
    Sequence(Vec<Value>),
}

impl From<Value> for MergeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => MergeValue::Sequence(items),
            other => MergeValue::Scalar(other),
        }
    }
}

impl From<MergeValue> for Value {
    fn from(value: MergeValue) -> Self {
        match value {
            MergeValue::Scalar(v) => v,
            MergeValue::Sequence(items) => Value::Array(items),
        }
    }
}

impl MergeValue {
    /// Combine `self` (already collected) with `incoming` (next source).
    pub fn merge(self, incoming: MergeValue) -> MergeValue {
        match (self, incoming) {
            (MergeValue::Sequence(mut a), MergeValue::Sequence(b)) => {
                a.extend(b);
                MergeValue::Sequence(a)
            }
            (MergeValue::Sequence(mut a), MergeValue::Scalar(b)) => {
                a.push(b);
                MergeValue::Sequence(a)
            }
            (MergeValue::Scalar(a), MergeValue::Sequence(b)) => {
                let mut items = Vec::with_capacity(b.len() + 1);
                items.push(a);
                items.extend(b);
                MergeValue::Sequence(items)
            }
            (MergeValue::Scalar(a), MergeValue::Scalar(b)) => MergeValue::Sequence(vec![a, b]),
        }
    }
}

/// Merge two JSON values with the fan-in rule.
pub fn merge_values(existing: Value, incoming: Value) -> Value {
    MergeValue::from(existing)
        .merge(MergeValue::from(incoming))
        .into()
}

/// Insert `value` under `key`, merging with whatever is already there.
///
/// A missing key in the source output arrives as `null`, matching how the
/// value would have been looked up.
pub fn merge_into(target: &mut Payload, key: &str, value: Value) {
    match target.remove(key) {
        Some(existing) => {
            target.insert(key.to_string(), merge_values(existing, value));
        }
        None => {
            target.insert(key.to_string(), value);
        }
    }
}

/// Pull `keys` out of one source's output and merge them into `target`.
pub fn merge_source(target: &mut Payload, source_output: &Payload, keys: &[String]) {
    for key in keys {
        let value = source_output.get(key).cloned().unwrap_or(Value::Null);
        merge_into(target, key, value);
    }
}
