// tests/adaptation.rs

mod common;
use crate::common::builders::GraphBuilder;
use crate::common::fake_runner::{ScriptedAdapter, ScriptedRunner};
use crate::common::{init_tracing, with_timeout};

use tokio::sync::mpsc;

use taskdag::dag::{Condition, Edge, ExecutionState, Node, NodeStatus, TaskGraph};
use taskdag::engine::{
    apply_operations, AdaptationPlan, AdaptationPolicy, EngineEvent, EngineOptions,
    PlanOperation, StepScheduler,
};
use taskdag::errors::{EngineError, StructuralViolation};

fn remove(node: &str) -> PlanOperation {
    PlanOperation::Remove {
        node: node.into(),
        reason: "no longer needed".into(),
    }
}

fn add(id: &str, edges: Vec<Edge>) -> PlanOperation {
    PlanOperation::Add {
        node: Node::leaf(id, format!("new step {id}")),
        edges,
        reason: "gap in plan".into(),
    }
}

fn modify(node: &str, description: &str, expected_generation: Option<u64>) -> PlanOperation {
    PlanOperation::Modify {
        node: node.into(),
        description: Some(description.into()),
        criteria: None,
        expected_generation,
        reason: "sharpen".into(),
    }
}

/// a -> b -> c
fn chain() -> TaskGraph {
    GraphBuilder::new()
        .leaves(&["a", "b", "c"])
        .dep("a", "b")
        .dep("b", "c")
        .build()
}

fn adaptive_scheduler(graph: TaskGraph, adapter: ScriptedAdapter) -> StepScheduler<ScriptedRunner> {
    let options = EngineOptions {
        max_parallel: 3,
        ..EngineOptions::default()
    };
    StepScheduler::new(graph, ExecutionState::new("task", ""), options, ScriptedRunner::new())
        .with_adapter(adapter)
}

#[test]
fn operations_apply_in_order_and_describe_themselves() {
    let mut graph = chain();
    let applied = apply_operations(
        &mut graph,
        vec![
            modify("b", "tighter b", Some(0)),
            remove("c"),
            add("d", vec![Edge::dependency("b", "d")]),
        ],
    )
    .unwrap();

    assert_eq!(
        applied.changes,
        vec![
            "MODIFY b (generation 1): sharpen",
            "REMOVE c: no longer needed",
            "ADD d: gap in plan",
        ]
    );
    assert!(applied.rejected.is_empty());
    assert!(!graph.contains("c"));
    assert_eq!(graph.dependency_ids("d"), vec!["b"]);
    assert_eq!(graph.node("b").unwrap().description, "tighter b");
}

#[test]
fn rejected_operations_do_not_stop_the_batch() {
    let mut graph = chain();
    graph.transition("a", NodeStatus::Ready).unwrap();
    graph.transition("a", NodeStatus::Running).unwrap();
    graph.transition("a", NodeStatus::Completed).unwrap();

    let applied = apply_operations(
        &mut graph,
        vec![
            remove("a"),
            modify("b", "stale edit", Some(7)),
            remove("ghost"),
            remove("c"),
        ],
    )
    .unwrap();

    assert_eq!(applied.changes, vec!["REMOVE c: no longer needed"]);
    let rejected: Vec<&str> = applied.rejected.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(rejected, vec!["a", "b", "ghost"]);
    assert!(graph.contains("a"));
    assert_eq!(graph.node("b").unwrap().description, "do b");
}

#[test]
fn failed_add_leaves_no_partial_node() {
    let mut graph = chain();
    let applied = apply_operations(
        &mut graph,
        vec![add(
            "d",
            vec![Edge::dependency("a", "d"), Edge::dependency("d", "ghost")],
        )],
    )
    .unwrap();

    assert!(applied.changes.is_empty());
    assert_eq!(applied.rejected.len(), 1);
    assert!(!graph.contains("d"));
    assert!(graph.edges().iter().all(|e| !e.touches("d")));
    assert_eq!(graph.edges().len(), 2);
}

#[test]
fn cycle_is_fatal_and_rolled_back() {
    let mut graph = chain();
    let err = apply_operations(
        &mut graph,
        vec![add(
            "loop",
            vec![Edge::dependency("c", "loop"), Edge::dependency("loop", "a")],
        )],
    )
    .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Structural(StructuralViolation::CycleDetected(_))
    ));
    assert!(!graph.contains("loop"));
    assert!(graph.topological_order().is_ok());
}

#[test]
fn policy_cadence() {
    let policy = AdaptationPolicy {
        enabled: true,
        every_n_steps: 2,
        min_completed: 1,
    };
    assert!(!policy.is_due(1, 1));
    assert!(policy.is_due(2, 1));
    assert!(!policy.is_due(2, 0));
    assert!(policy.is_due(4, 3));
    assert!(!AdaptationPolicy::disabled().is_due(2, 5));
}

#[tokio::test]
async fn adapter_reshapes_the_remaining_plan() {
    init_tracing();

    let graph = GraphBuilder::new().leaves(&["a", "b"]).dep("a", "b").build();
    let adapter = ScriptedAdapter::new().then_plan(AdaptationPlan::with_operations(vec![
        remove("b"),
        add("c", vec![Edge::dependency("a", "c")]),
    ]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut sched = adaptive_scheduler(graph, adapter.clone()).with_events(tx);

    let report = with_timeout(sched.run()).await.unwrap();

    assert_eq!(report.steps, 2);
    assert!(!report.statuses.contains_key("b"));
    assert_eq!(report.statuses["c"], NodeStatus::Completed);
    assert_eq!(report.adaptations.len(), 2);
    // Not consulted once no pending leaves remain.
    assert_eq!(adapter.calls(), 1);

    let mut adapted = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if let EngineEvent::PlanAdapted { step, changes } = ev {
            adapted.push((step, changes.len()));
        }
    }
    assert_eq!(adapted, vec![(1, 2)]);
}

#[tokio::test]
async fn adapter_errors_are_ignored() {
    init_tracing();

    let adapter = ScriptedAdapter::new().then_error("model unavailable");
    let mut sched = adaptive_scheduler(chain(), adapter.clone());

    let report = with_timeout(sched.run()).await.unwrap();
    assert_eq!(report.steps, 3);
    assert!(report.adaptations.is_empty());
    assert_eq!(report.statuses["c"], NodeStatus::Completed);
    assert_eq!(adapter.calls(), 2);
}

#[tokio::test]
async fn adaptation_cycle_aborts_the_run() {
    init_tracing();

    let adapter = ScriptedAdapter::new().then_plan(AdaptationPlan::with_operations(vec![add(
        "loop",
        vec![Edge::dependency("c", "loop"), Edge::dependency("loop", "b")],
    )]));
    let mut sched = adaptive_scheduler(chain(), adapter);

    let err = with_timeout(sched.run()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Structural(StructuralViolation::CycleDetected(_))
    ));
    assert_eq!(sched.steps(), 1);
    assert!(!sched.graph().contains("loop"));
}

#[tokio::test]
async fn added_conditional_target_is_evaluated_before_it_runs() {
    init_tracing();

    let adapter = ScriptedAdapter::new().then_plan(AdaptationPlan::with_operations(vec![add(
        "extra",
        vec![Edge::conditional("a", "extra", Condition::contains("escalate"))],
    )]));
    let graph = GraphBuilder::new().leaves(&["a", "b"]).dep("a", "b").build();
    let mut sched = adaptive_scheduler(graph, adapter);

    let report = with_timeout(sched.run()).await.unwrap();
    assert_eq!(report.statuses["extra"], NodeStatus::Skipped);
    assert_eq!(report.statuses["b"], NodeStatus::Completed);
    assert!(!sched.runner().ran("extra"));
}

#[tokio::test]
async fn no_change_plans_leave_the_graph_alone() {
    init_tracing();

    let adapter = ScriptedAdapter::new().then_plan(AdaptationPlan::no_change());
    let mut sched = adaptive_scheduler(chain(), adapter);

    let report = with_timeout(sched.run()).await.unwrap();
    assert!(report.adaptations.is_empty());
    assert_eq!(sched.graph().revision(), 0);
}

#[tokio::test]
async fn removing_the_only_rollback_source_retires_the_cleanup_unit() {
    init_tracing();

    let graph = GraphBuilder::new()
        .leaves(&["a", "x", "r"])
        .dep("a", "x")
        .rollback("x", "r")
        .build();
    let adapter =
        ScriptedAdapter::new().then_plan(AdaptationPlan::with_operations(vec![remove("x")]));
    let mut sched = adaptive_scheduler(graph, adapter);

    let report = with_timeout(sched.run()).await.unwrap();
    assert_eq!(report.steps, 1);
    assert_eq!(report.statuses["r"], NodeStatus::Skipped);
    assert_eq!(sched.runner().executed(), vec!["a"]);
    assert_eq!(
        report.adaptations,
        vec!["REMOVE x: no longer needed (skipped r)"]
    );
}
