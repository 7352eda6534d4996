// src/dag/readiness.rs

//! Dependency gate and data acquisition for a single work item.
//!
//! The gate answers with data instead of control flow: a node is either
//! ready (with its merged input), not ready yet, or cannot be run because a
//! source it needs has nothing on record. Store corruption is the only hard
//! error and is returned as `Err`.

use tracing::{debug, warn};

use crate::dag::merge::merge_source;
use crate::errors::{FlowrunError, Result};
use crate::flowchart::{IncomingParam, Node};
use crate::store::OutputStore;
use crate::types::{DependencyMode, NodeId, Payload};

#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Ready(Payload),
    NotReady,
    MissingUpstream { source: NodeId },
}

/// Declared sources that currently satisfy `node`'s gate in `run_id`.
///
/// `None` means the gate is closed. A node without declared sources is
/// always open, whichever mode it uses.
fn satisfied_sources<'n>(
    node: &'n Node,
    run_id: &str,
    store: &OutputStore,
) -> Option<Vec<&'n IncomingParam>> {
    if node.incoming_params.is_empty() {
        return Some(Vec::new());
    }

    match node.dependency_mode() {
        DependencyMode::AllOf => node
            .incoming_params
            .iter()
            .all(|p| store.has_output(run_id, &p.source))
            .then(|| node.incoming_params.iter().collect()),
        DependencyMode::AnyOf => {
            let available: Vec<_> = node
                .incoming_params
                .iter()
                .filter(|p| store.has_output(run_id, &p.source))
                .collect();
            (!available.is_empty()).then_some(available)
        }
    }
}

/// Whether `node` could run in `run_id` given what is on record now.
pub fn is_satisfiable(node: &Node, run_id: &str, store: &OutputStore) -> bool {
    satisfied_sources(node, run_id, store).is_some()
}

/// Check the gate and, if open, merge the requested keys of every satisfied
/// source in declaration order.
pub fn resolve(node: &Node, run_id: &str, store: &OutputStore) -> Result<Readiness> {
    let Some(sources) = satisfied_sources(node, run_id, store) else {
        debug!(run_id, node = %node.id, mode = ?node.dependency_mode(), "dependencies not met");
        return Ok(Readiness::NotReady);
    };

    let mut input = Payload::new();
    for param in sources {
        match fetch(store, run_id, &param.source)? {
            Some(output) => merge_source(&mut input, &output, &param.keys),
            None => {
                return Ok(Readiness::MissingUpstream {
                    source: param.source.clone(),
                });
            }
        }
    }

    Ok(Readiness::Ready(input))
}

/// Merge the outputs of the upstream nodes that fired into a staged target,
/// in arrival order.
///
/// Arrivals from nodes the target does not list in `incoming_params` count
/// towards the threshold but contribute no data.
pub fn merge_staged(
    node: &Node,
    run_id: &str,
    received: &[NodeId],
    store: &OutputStore,
) -> Result<Readiness> {
    let mut input = Payload::new();

    for from in received {
        let Some(keys) = node.keys_from(from) else {
            warn!(
                run_id,
                node = %node.id,
                from = %from,
                "arrival from source without incoming_params entry; no data merged"
            );
            continue;
        };

        match fetch(store, run_id, from)? {
            Some(output) => merge_source(&mut input, &output, keys),
            None => {
                return Ok(Readiness::MissingUpstream {
                    source: from.clone(),
                });
            }
        }
    }

    Ok(Readiness::Ready(input))
}

/// Latest output of `source`, `None` if it never produced any. Any other
/// store failure is fatal.
fn fetch(store: &OutputStore, run_id: &str, source: &str) -> Result<Option<Payload>> {
    match store.get_latest(run_id, source) {
        Ok(output) => Ok(Some(output)),
        Err(FlowrunError::MissingOutput { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}
