// src/flowchart/validate.rs

use std::collections::HashSet;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use tracing::warn;

use crate::condition::ConditionKind;
use crate::errors::{FlowrunError, Result};
use crate::flowchart::model::{Flowchart, RawFlowchart};

impl TryFrom<RawFlowchart> for Flowchart {
    type Error = FlowrunError;

    fn try_from(raw: RawFlowchart) -> std::result::Result<Self, Self::Error> {
        validate_raw_flowchart(&raw)?;
        Ok(Flowchart::new_unchecked(raw))
    }
}

fn validate_raw_flowchart(doc: &RawFlowchart) -> Result<()> {
    ensure_has_nodes(doc)?;
    let ids = unique_node_ids(doc)?;
    validate_connections(doc, &ids)?;
    validate_incoming_params(doc, &ids)?;
    validate_loops(doc, &ids)?;
    Ok(())
}

fn ensure_has_nodes(doc: &RawFlowchart) -> Result<()> {
    if doc.nodes.is_empty() {
        return Err(FlowrunError::FlowchartError(
            "flowchart must contain at least one node".to_string(),
        ));
    }
    Ok(())
}

fn unique_node_ids(doc: &RawFlowchart) -> Result<HashSet<&str>> {
    let mut ids = HashSet::new();
    for node in &doc.nodes {
        if node.id.trim().is_empty() {
            return Err(FlowrunError::FlowchartError(
                "node with empty id".to_string(),
            ));
        }
        if !ids.insert(node.id.as_str()) {
            return Err(FlowrunError::FlowchartError(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
    }
    Ok(ids)
}

fn validate_connections(doc: &RawFlowchart, ids: &HashSet<&str>) -> Result<()> {
    for conn in &doc.connections {
        for end in [&conn.from, &conn.to] {
            if !ids.contains(end.as_str()) {
                return Err(FlowrunError::FlowchartError(format!(
                    "connection {} -> {} references unknown node '{}'",
                    conn.from, conn.to, end
                )));
            }
        }
        if let Some(tag) = conn.condition_tag() {
            if ConditionKind::from_tag(tag).is_none() {
                // Not fatal: unknown conditions never fire at run time.
                warn!(
                    from = %conn.from,
                    to = %conn.to,
                    condition = %tag,
                    "connection uses an unknown condition; it will never fire"
                );
            }
        }
    }
    Ok(())
}

fn validate_incoming_params(doc: &RawFlowchart, ids: &HashSet<&str>) -> Result<()> {
    for node in &doc.nodes {
        for param in &node.incoming_params {
            if !ids.contains(param.source.as_str()) {
                return Err(FlowrunError::FlowchartError(format!(
                    "node '{}' has unknown dependency '{}' in incoming_params",
                    node.id, param.source
                )));
            }
        }
    }
    Ok(())
}

fn validate_loops(doc: &RawFlowchart, ids: &HashSet<&str>) -> Result<()> {
    for group in &doc.loops {
        for id in group {
            if !ids.contains(id.as_str()) {
                return Err(FlowrunError::FlowchartError(format!(
                    "loop references unknown node '{}'",
                    id
                )));
            }
        }
    }
    Ok(())
}

/// Structural findings that do not prevent execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    /// Strongly connected groups (sorted ids) not covered by a declared loop.
    pub undeclared_cycles: Vec<Vec<String>>,
    /// Nodes no path from the start node reaches.
    pub unreachable: Vec<String>,
    /// Nodes whose `expected_deps` exceeds the number of distinct nodes
    /// connected into them, so their staged gate can never open.
    pub unsatisfiable_gates: Vec<String>,
}

impl Analysis {
    pub fn is_clean(&self) -> bool {
        self.undeclared_cycles.is_empty()
            && self.unreachable.is_empty()
            && self.unsatisfiable_gates.is_empty()
    }
}

/// Inspect the connection graph with `petgraph` and log anything suspicious.
///
/// Loops are legitimate in flowcharts, so cycles are only reported when the
/// author did not declare them in `loops`.
pub fn analyze(flowchart: &Flowchart, start_node: &str) -> Analysis {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for node in flowchart.nodes() {
        graph.add_node(node.id.as_str());
    }
    for conn in flowchart.connections() {
        graph.add_edge(conn.from.as_str(), conn.to.as_str(), ());
    }

    let declared: Vec<HashSet<&str>> = flowchart
        .loops()
        .iter()
        .map(|group| group.iter().map(|s| s.as_str()).collect())
        .collect();

    let mut analysis = Analysis::default();

    for component in tarjan_scc(&graph) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| graph.contains_edge(n, n));
        if !is_cycle {
            continue;
        }
        let covered = declared
            .iter()
            .any(|group| component.iter().all(|n| group.contains(n)));
        if !covered {
            let mut ids: Vec<String> = component.iter().map(|s| s.to_string()).collect();
            ids.sort();
            warn!(nodes = ?ids, "cycle in flowchart is not declared in `loops`");
            analysis.undeclared_cycles.push(ids);
        }
    }

    if graph.contains_node(start_node) {
        let mut reached = HashSet::new();
        let mut dfs = Dfs::new(&graph, start_node);
        while let Some(n) = dfs.next(&graph) {
            reached.insert(n);
        }
        for node in flowchart.nodes() {
            if !reached.contains(node.id.as_str()) {
                warn!(node = %node.id, start = %start_node, "node is unreachable from start node");
                analysis.unreachable.push(node.id.clone());
            }
        }
    }

    for node in flowchart.nodes() {
        let upstream = flowchart.graph().upstream_of(&node.id).len();
        if node.expected_deps > upstream {
            warn!(
                node = %node.id,
                expected_deps = node.expected_deps,
                upstream,
                "expected_deps exceeds number of connected upstream nodes"
            );
            analysis.unsatisfiable_gates.push(node.id.clone());
        }
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowchart::parse_flowchart;

    #[test]
    fn rejects_unknown_connection_target() {
        let err = parse_flowchart(
            r#"{"nodes":[{"id":"a","task_type":"Start"}],
                "connections":[{"from":"a","to":"ghost"}]}"#,
        )
        .unwrap_err();
        match err {
            FlowrunError::FlowchartError(msg) => assert!(msg.contains("ghost")),
            other => panic!("expected FlowchartError, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_ids_and_empty_documents() {
        assert!(parse_flowchart(r#"{"nodes":[]}"#).is_err());
        let err = parse_flowchart(
            r#"{"nodes":[{"id":"a","task_type":"Start"},{"id":"a","task_type":"Start"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate node id 'a'"));
    }

    #[test]
    fn rejects_unknown_incoming_source() {
        let err = parse_flowchart(
            r#"{"nodes":[{"id":"a","task_type":"Start",
                          "incoming_params":{"zzz":["k"]}}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown dependency 'zzz'"));
    }

    #[test]
    fn declared_loops_are_not_reported() {
        let fc = parse_flowchart(
            r#"{"nodes":[{"id":"a","task_type":"Start"},{"id":"b","task_type":"Start"},
                         {"id":"c","task_type":"Start"}],
                "connections":[{"from":"a","to":"b"},{"from":"b","to":"b"},
                               {"from":"b","to":"c"},{"from":"c","to":"b"}],
                "loops":[["b","c"]]}"#,
        )
        .unwrap();
        let analysis = analyze(&fc, "a");
        assert!(analysis.is_clean(), "{analysis:?}");
    }

    #[test]
    fn reports_undeclared_cycles_unreachable_nodes_and_impossible_gates() {
        let fc = parse_flowchart(
            r#"{"nodes":[{"id":"a","task_type":"Start"},
                         {"id":"b","task_type":"Start","expected_deps":2},
                         {"id":"c","task_type":"Start"},
                         {"id":"island","task_type":"Start"}],
                "connections":[{"from":"a","to":"b"},{"from":"b","to":"c"},
                               {"from":"c","to":"a"}]}"#,
        )
        .unwrap();
        let analysis = analyze(&fc, "a");
        assert_eq!(
            analysis.undeclared_cycles,
            vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]
        );
        assert_eq!(analysis.unreachable, vec!["island".to_string()]);
        assert_eq!(analysis.unsatisfiable_gates, vec!["b".to_string()]);
    }
}
