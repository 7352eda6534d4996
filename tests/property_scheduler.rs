// tests/property_scheduler.rs

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;
use serde_json::{json, Value};

use flowrun::dag::merge::merge_source;
use flowrun::engine::{RunOutcome, Runtime, RuntimeOptions};
use flowrun::flowchart::Flowchart;
use flowrun::types::Payload;
use flowrun_test_utils::{mock_store, payload, FakeBackend, FlowchartBuilder, NodeBuilder};

// Acyclic fan-in graphs: node i > 0 always depends on i - 1 plus a random
// subset of earlier nodes, and waits for all of them through staging.
fn fan_in_dag_strategy(max_nodes: usize) -> impl Strategy<Value = Flowchart> {
    (2..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..n), n).prop_map(
            move |raw_deps| {
                let mut builder = FlowchartBuilder::new();
                let mut edges = Vec::new();

                for (i, extra) in raw_deps.into_iter().enumerate() {
                    let id = format!("n{i}");
                    if i == 0 {
                        builder = builder.node(NodeBuilder::new(&id, "Start"));
                        continue;
                    }

                    let mut deps = BTreeSet::from([i - 1]);
                    deps.extend(extra.into_iter().map(|d| d % i));

                    let mut node = NodeBuilder::new(&id, "Step").expected_deps(deps.len());
                    for d in &deps {
                        node = node.needs(&format!("n{d}"), &["v"]);
                        edges.push((format!("n{d}"), id.clone()));
                    }
                    builder = builder.node(node);
                }

                for (from, to) in edges {
                    builder = builder.connect(&from, &to);
                }
                builder.build()
            },
        )
    })
}

fn scalar_or_list() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(|n| json!(n)),
        proptest::collection::vec(any::<i32>(), 0..4).prop_map(|v| json!(v)),
    ]
}

fn flatten(values: &[Value]) -> Vec<Value> {
    values
        .iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        })
        .collect()
}

proptest! {
    #[test]
    fn staged_fan_in_runs_every_node_exactly_once(chart in fan_in_dag_strategy(8)) {
        let node_count = chart.nodes().len();
        let (_fs, store) = mock_store("prop");
        let backend = FakeBackend::new();
        let mut rt = Runtime::new(chart, store, backend.clone(), RuntimeOptions::default())
            .expect("runtime");
        rt.seed("run_1", "n0").expect("seed");

        let report = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("tokio runtime")
            .block_on(rt.run())
            .expect("run");

        prop_assert_eq!(&report.outcome, &RunOutcome::Completed);
        prop_assert_eq!(report.executions.len(), node_count);

        let mut seen = HashMap::new();
        for exec in &report.executions {
            *seen.entry(exec.node_id.clone()).or_insert(0) += 1;
        }
        prop_assert!(seen.values().all(|&count| count == 1));
        prop_assert!(rt.scheduler().staging().is_empty());
    }

    #[test]
    fn fan_in_merge_preserves_source_order(values in proptest::collection::vec(scalar_or_list(), 2..6)) {
        let mut merged = Payload::new();
        for value in &values {
            merge_source(&mut merged, &payload(json!({ "v": value })), &["v".to_string()]);
        }
        prop_assert_eq!(&merged["v"], &Value::Array(flatten(&values)));
    }

    #[test]
    fn iterations_are_gapless_and_latest_is_max(
        writes in proptest::collection::vec((0..2usize, 0..3usize), 1..30)
    ) {
        let (_fs, mut store) = mock_store("prop");
        let mut counts: HashMap<(String, String), u64> = HashMap::new();

        for (run, node) in writes {
            let run_id = format!("run_{}", run + 1);
            let node_id = format!("node_{}", node + 1);
            let iteration = store
                .put(&run_id, &node_id, payload(json!({ "n": node })))
                .expect("put");

            let count = counts.entry((run_id.clone(), node_id.clone())).or_insert(0);
            *count += 1;
            prop_assert_eq!(iteration, *count);
        }

        for ((run_id, node_id), count) in counts {
            let expected: Vec<u64> = (1..=count).collect();
            prop_assert_eq!(store.index().iterations(&run_id, &node_id), expected);
            let latest = store.get_latest(&run_id, &node_id).expect("latest");
            prop_assert_eq!(&latest["iteration"], &json!(count));
        }
    }
}
