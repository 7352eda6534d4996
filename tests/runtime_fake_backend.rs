// tests/runtime_fake_backend.rs

use std::error::Error;

use serde_json::json;

use flowrun::engine::{RunOutcome, Runtime, RuntimeOptions};
use flowrun::errors::FlowrunError;
use flowrun::flowchart::Flowchart;
use flowrun_test_utils::{
    init_tracing, mock_store, payload, with_timeout, FakeBackend, FlowchartBuilder, NodeBuilder,
};

type TestResult = Result<(), Box<dyn Error>>;

fn runtime(chart: Flowchart, backend: FakeBackend) -> Runtime<FakeBackend> {
    let (_fs, store) = mock_store("job");
    Runtime::new(chart, store, backend, RuntimeOptions::default()).expect("runtime")
}

/// A -> B (all-of {A}) -> C (any-of {A, B}), with A -> C as well.
fn any_of_chain() -> Flowchart {
    FlowchartBuilder::new()
        .node(NodeBuilder::new("A", "Start"))
        .node(NodeBuilder::new("B", "Step").needs("A", &["x"]))
        .node(
            NodeBuilder::new("C", "Step")
                .needs("A", &["x"])
                .needs("B", &["y"])
                .partial(),
        )
        .connect("A", "B")
        .connect("A", "C")
        .connect("B", "C")
        .build()
}

#[tokio::test]
async fn any_of_target_runs_on_first_arrival_and_again_after_second() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new()
        .with_output("A", payload(json!({ "x": 1 })))
        .with_output("B", payload(json!({ "y": 2 })));
    let mut rt = runtime(any_of_chain(), backend.clone());
    rt.seed("run_1", "A")?;

    let report = with_timeout(rt.run()).await?;

    assert!(report.is_success());
    assert_eq!(
        report.execution_order(),
        vec!["run_1/A", "run_1/B", "run_1/C", "run_1/C"]
    );

    // B completes before the first queued C is processed, so both C
    // executions see every source that has output.
    let calls = backend.calls();
    assert_eq!(calls[2].input, payload(json!({ "x": 1, "y": 2 })));
    assert_eq!(calls[2].iteration, 1);
    assert_eq!(calls[3].iteration, 2);
    Ok(())
}

#[tokio::test]
async fn any_of_target_runs_when_only_one_source_fires() -> TestResult {
    init_tracing();

    let chart = FlowchartBuilder::new()
        .node(NodeBuilder::new("A", "Start"))
        .node(NodeBuilder::new("B", "Step").needs("A", &["x"]))
        .node(
            NodeBuilder::new("C", "Step")
                .needs("A", &["x"])
                .needs("B", &["y"])
                .partial(),
        )
        .connect_if("A", "B", "finished", json!(true))
        .connect("A", "C")
        .build();
    let backend = FakeBackend::new().with_output("A", payload(json!({ "x": 1 })));
    let mut rt = runtime(chart, backend.clone());
    rt.seed("run_1", "A")?;

    let report = with_timeout(rt.run()).await?;

    assert!(report.is_success());
    assert_eq!(report.execution_order(), vec!["run_1/A", "run_1/C"]);
    assert_eq!(backend.calls()[1].input, payload(json!({ "x": 1 })));
    Ok(())
}

#[tokio::test]
async fn runs_are_isolated_in_the_store() -> TestResult {
    init_tracing();

    let chart = FlowchartBuilder::new()
        .node(NodeBuilder::new("s", "Start"))
        .node(NodeBuilder::new("t", "Step").needs("s", &["x"]))
        .connect("s", "t")
        .build();
    let backend = FakeBackend::new().with_output("s", payload(json!({ "x": "v" })));
    let mut rt = runtime(chart, backend.clone());
    rt.seed("run_1", "s")?;
    rt.seed("run_2", "s")?;

    let report = with_timeout(rt.run()).await?;
    assert!(report.is_success());
    assert_eq!(report.completed_runs, vec!["run_1", "run_2"]);

    let store = rt.store();
    assert_eq!(store.runs(), vec!["run_1", "run_2"]);
    for run in ["run_1", "run_2"] {
        for node in ["s", "t"] {
            assert_eq!(store.latest_iteration(run, node), Some(1), "{run}/{node}");
            let path = store.index().location(run, node, 1).expect("indexed");
            assert!(path.starts_with(store.root().join(run)));
        }
    }
    Ok(())
}

#[tokio::test]
async fn waiting_on_a_source_that_never_runs_is_a_deadlock() -> TestResult {
    init_tracing();

    let chart = FlowchartBuilder::new()
        .node(NodeBuilder::new("s", "Start"))
        .node(NodeBuilder::new("never", "Step"))
        .node(
            NodeBuilder::new("t", "Step")
                .needs("s", &["x"])
                .needs("never", &["x"]),
        )
        .connect("s", "t")
        .connect_if("s", "never", "finished", json!(true))
        .build();
    let backend = FakeBackend::new();
    let mut rt = runtime(chart, backend.clone());
    rt.seed("run_1", "s")?;

    let report = with_timeout(rt.run()).await?;

    assert_eq!(
        report.outcome,
        RunOutcome::Deadlocked {
            waiting: vec!["run_1/t".to_string()]
        }
    );
    assert_eq!(backend.executed(), vec!["run_1/s"]);
    assert!(rt.scheduler().is_idle());
    Ok(())
}

#[tokio::test]
async fn unknown_condition_never_fires() -> TestResult {
    init_tracing();

    let chart = FlowchartBuilder::new()
        .node(NodeBuilder::new("s", "Start"))
        .node(NodeBuilder::new("t", "Step"))
        .connect_if("s", "t", "Phase of the moon", json!("full"))
        .build();
    let backend = FakeBackend::new();
    let mut rt = runtime(chart, backend.clone());
    rt.seed("run_1", "s")?;

    let report = with_timeout(rt.run()).await?;

    assert!(report.is_success());
    assert_eq!(backend.executed(), vec!["run_1/s"]);
    Ok(())
}

fn fan_in(expected_deps: usize) -> Flowchart {
    FlowchartBuilder::new()
        .node(NodeBuilder::new("s", "Start"))
        .node(NodeBuilder::new("a", "Step").needs("s", &["v"]))
        .node(NodeBuilder::new("b", "Step").needs("s", &["v"]))
        .node(NodeBuilder::new("c", "Step").needs("s", &["v"]))
        .node(
            NodeBuilder::new("j", "Step")
                .needs("a", &["v"])
                .needs("b", &["v"])
                .needs("c", &["v"])
                .expected_deps(expected_deps),
        )
        .connect("s", "a")
        .connect("s", "b")
        .connect("s", "c")
        .connect("a", "j")
        .connect("b", "j")
        .connect_if("c", "j", "finished", json!(true))
        .build()
}

#[tokio::test]
async fn staged_target_runs_once_with_merged_input() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new()
        .with_output("s", payload(json!({ "v": 0 })))
        .with_output("a", payload(json!({ "v": ["a1", "a2"] })))
        .with_output("b", payload(json!({ "v": "b" })));
    let mut rt = runtime(fan_in(2), backend.clone());
    rt.seed("run_1", "s")?;

    let report = with_timeout(rt.run()).await?;

    assert!(report.is_success());
    let j: Vec<_> = backend
        .calls()
        .into_iter()
        .filter(|c| c.node_id == "j")
        .collect();
    assert_eq!(j.len(), 1);
    assert_eq!(j[0].input, payload(json!({ "v": ["a1", "a2", "b"] })));
    assert!(rt.scheduler().staging().is_empty());
    Ok(())
}

#[tokio::test]
async fn one_arrival_short_of_threshold_never_runs() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new();
    let mut rt = runtime(fan_in(3), backend.clone());
    rt.seed("run_1", "s")?;

    let report = with_timeout(rt.run()).await?;

    assert!(report.is_success());
    assert!(!backend.executed().contains(&"run_1/j".to_string()));

    let entry = rt.scheduler().staging().get("run_1", "j").expect("staged");
    assert_eq!(entry.received_deps, vec!["a", "b"]);
    assert_eq!(entry.expected_deps, 3);
    Ok(())
}

#[tokio::test]
async fn failed_task_does_not_advance_downstream() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().failing("a");
    let mut rt = runtime(fan_in(2), backend.clone());
    rt.seed("run_1", "s")?;

    let report = with_timeout(rt.run()).await?;

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].node_id, "a");
    assert!(matches!(
        report.failures[0].to_error(),
        FlowrunError::TaskFailed { .. }
    ));
    assert!(rt.store().latest_iteration("run_1", "a").is_none());
    assert!(!backend.executed().contains(&"run_1/j".to_string()));

    // Only b arrived.
    let entry = rt.scheduler().staging().get("run_1", "j").expect("staged");
    assert_eq!(entry.received_deps, vec!["b"]);
    Ok(())
}

#[tokio::test]
async fn bounded_loop_exits_on_condition() -> TestResult {
    init_tracing();

    let chart = FlowchartBuilder::new()
        .node(NodeBuilder::new("s", "Start"))
        .node(NodeBuilder::new("body", "Step").needs("s", &["v"]))
        .node(NodeBuilder::new("done", "Step").needs("body", &["v"]))
        .connect("s", "body")
        .connect_if("body", "body", "Number of runs (less than equal to)", json!("2"))
        .connect_if("body", "done", "Number of runs (greater than equal to)", json!("3"))
        .declare_loop(&["body"])
        .build();
    let backend = FakeBackend::new();
    let mut rt = runtime(chart, backend.clone());
    rt.seed("run_1", "s")?;

    let report = with_timeout(rt.run()).await?;

    assert!(report.is_success());
    let body: Vec<u64> = report
        .executions_of("run_1", "body")
        .map(|e| e.iteration)
        .collect();
    assert_eq!(body, vec![1, 2, 3]);
    assert_eq!(report.executions_of("run_1", "done").count(), 1);
    Ok(())
}

#[tokio::test]
async fn unbounded_loop_hits_execution_limit() {
    init_tracing();

    let chart = FlowchartBuilder::new()
        .node(NodeBuilder::new("s", "Start"))
        .connect("s", "s")
        .declare_loop(&["s"])
        .build();
    let (_fs, store) = mock_store("job");
    let options = RuntimeOptions {
        max_executions: 5,
        ..RuntimeOptions::default()
    };
    let backend = FakeBackend::new();
    let mut rt = Runtime::new(chart, store, backend.clone(), options).expect("runtime");
    rt.seed("run_1", "s").expect("seed");

    let err = with_timeout(rt.run()).await.unwrap_err();

    assert!(matches!(err, FlowrunError::ExecutionLimit { limit: 5 }));
    assert_eq!(backend.executed().len(), 5);
}

#[test]
fn unsupported_task_type_is_rejected_before_execution() {
    init_tracing();

    let chart = FlowchartBuilder::new()
        .node(NodeBuilder::new("s", "Start"))
        .node(NodeBuilder::new("t", "Quantum Annealer"))
        .connect("s", "t")
        .build();
    let (_fs, store) = mock_store("job");
    let backend = FakeBackend::new().supporting(&["Start"]);

    let err = Runtime::new(chart, store, backend.clone(), RuntimeOptions::default()).unwrap_err();

    match err {
        FlowrunError::UnknownTaskType { node, task_type } => {
            assert_eq!(node, "t");
            assert_eq!(task_type, "Quantum Annealer");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(backend.calls().is_empty());
}

#[test]
fn seeding_an_unknown_start_node_fails() {
    let chart = FlowchartBuilder::new()
        .node(NodeBuilder::new("s", "Start"))
        .build();
    let mut rt = runtime(chart, FakeBackend::new());

    assert!(matches!(
        rt.seed("run_1", "nope"),
        Err(FlowrunError::UnknownNode(_))
    ));
}
