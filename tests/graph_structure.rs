// tests/graph_structure.rs

mod common;
use crate::common::builders::GraphBuilder;

use std::collections::HashSet;

use taskdag::dag::{Condition, Edge, Node, NodePatch, NodeStatus, TaskGraph};
use taskdag::errors::{EngineError, RejectReason, StructuralViolation};

fn ids(nodes: Vec<&Node>) -> Vec<String> {
    nodes.into_iter().map(|n| n.id.clone()).collect()
}

fn set(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// a -> b -> d, a -> c -> d, c -> e
fn diamond() -> TaskGraph {
    GraphBuilder::new()
        .leaves(&["a", "b", "c", "d", "e"])
        .dep("a", "b")
        .dep("a", "c")
        .dep("b", "d")
        .dep("c", "d")
        .dep("c", "e")
        .build()
}

fn complete(graph: &mut TaskGraph, id: &str) {
    graph.transition(id, NodeStatus::Ready).unwrap();
    graph.transition(id, NodeStatus::Running).unwrap();
    graph.transition(id, NodeStatus::Completed).unwrap();
}

#[test]
fn ready_nodes_require_completed_dependencies() {
    let mut graph = diamond();
    assert_eq!(ids(graph.ready_nodes()), vec!["a"]);

    complete(&mut graph, "a");
    assert_eq!(ids(graph.ready_nodes()), vec!["b", "c"]);

    complete(&mut graph, "b");
    // d still waits for c.
    assert_eq!(ids(graph.ready_nodes()), vec!["c"]);
}

#[test]
fn skipped_dependency_does_not_satisfy() {
    let mut graph = diamond();
    graph.transition("a", NodeStatus::Skipped).unwrap();
    assert!(graph.ready_nodes().is_empty());
    assert!(!graph.dependencies_satisfied("b"));
}

#[test]
fn dependency_ids_and_downstream() {
    let graph = diamond();
    assert_eq!(set(&["b", "c"]), graph.dependency_ids("d").into_iter().collect());
    assert_eq!(
        set(&["b", "c", "d", "e"]),
        graph.downstream("a").into_iter().collect()
    );
    assert_eq!(set(&["d", "e"]), graph.downstream("c").into_iter().collect());
    assert!(graph.downstream("d").is_empty());
    assert!(graph.reaches("a", "e"));
    assert!(!graph.reaches("b", "e"));
}

#[test]
fn downstream_follows_every_edge_kind() {
    let graph = GraphBuilder::new()
        .leaves(&["x", "r", "y", "z"])
        .rollback("x", "r")
        .conditional("x", "y", Condition::contains("go"))
        .dep("y", "z")
        .build();
    assert_eq!(set(&["r", "y", "z"]), graph.downstream("x").into_iter().collect());
    assert_eq!(graph.rollback_targets("x"), vec!["r"]);
    assert_eq!(graph.conditional_edges("x").len(), 1);
    assert!(graph.is_rollback_unit("r"));
    // Conditional edges gate readiness too.
    assert_eq!(graph.dependency_ids("y"), vec!["x"]);
}

#[test]
fn cascade_skips_only_pending_and_ready_downstream() {
    let mut graph = diamond();
    complete(&mut graph, "a");
    graph.transition("b", NodeStatus::Ready).unwrap();
    graph.transition("c", NodeStatus::Ready).unwrap();
    graph.transition("c", NodeStatus::Running).unwrap();
    graph.transition("c", NodeStatus::Completed).unwrap();
    graph.transition("e", NodeStatus::Ready).unwrap();

    let skipped = graph.mark_subtree_skipped("a").unwrap();
    assert_eq!(set(&["b", "d", "e"]), skipped.into_iter().collect());
    assert_eq!(graph.status_of("a"), Some(NodeStatus::Completed));
    assert_eq!(graph.status_of("c"), Some(NodeStatus::Completed));
    assert_eq!(graph.status_of("d"), Some(NodeStatus::Skipped));

    // Second call is a no-op.
    assert!(graph.mark_subtree_skipped("a").unwrap().is_empty());
}

#[test]
fn topological_order_respects_edges() {
    let graph = diamond();
    let order = graph.topological_order().unwrap();
    let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
    for edge in graph.edges() {
        assert!(pos(&edge.source) < pos(&edge.target));
    }
    assert_eq!(order.len(), 5);
}

#[test]
fn add_edge_rejects_cycles_and_leaves_graph_unchanged() {
    let mut graph = diamond();
    let before = graph.edges().len();
    let revision = graph.revision();

    let err = graph.add_edge(Edge::dependency("d", "a")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Structural(StructuralViolation::CycleDetected(_))
    ));
    let err = graph.add_edge(Edge::dependency("b", "b")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Structural(StructuralViolation::CycleDetected(_))
    ));

    assert_eq!(graph.edges().len(), before);
    assert_eq!(graph.revision(), revision);
    assert!(graph.topological_order().is_ok());
}

#[test]
fn add_edge_rejects_missing_endpoints_and_duplicates() {
    let mut graph = diamond();

    let err = graph.add_edge(Edge::dependency("a", "ghost")).unwrap_err();
    match err {
        EngineError::Structural(StructuralViolation::MissingEndpoint { missing, .. }) => {
            assert_eq!(missing, "ghost")
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = graph.add_edge(Edge::dependency("a", "b")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Structural(StructuralViolation::DuplicateEdge { .. })
    ));

    // Same endpoints, different kind, is a different edge.
    graph.add_edge(Edge::rollback("a", "b")).unwrap();
}

#[test]
fn add_node_rejects_duplicates_missing_parents_and_non_pending() {
    let mut graph = diamond();

    let err = graph.add_node(Node::leaf("a", "again")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Structural(StructuralViolation::DuplicateNode(_))
    ));

    let err = graph
        .add_node(Node::leaf("f", "orphan").with_parent("nowhere"))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Structural(StructuralViolation::MissingParent { .. })
    ));

    let mut running = Node::leaf("g", "already going");
    taskdag::dag::NodeLifecycle::transition(&mut running, NodeStatus::Ready).unwrap();
    let err = graph.add_node(running).unwrap_err();
    assert!(matches!(
        err,
        EngineError::MutationRejected {
            reason: RejectReason::NotPending(NodeStatus::Ready),
            ..
        }
    ));

    assert_eq!(graph.len(), 5);
}

#[test]
fn remove_completed_node_is_rejected() {
    let mut graph = diamond();
    complete(&mut graph, "a");

    let err = graph.remove_node("a").unwrap_err();
    assert!(matches!(
        err,
        EngineError::MutationRejected {
            reason: RejectReason::NotMutable(NodeStatus::Completed),
            ..
        }
    ));
    assert!(graph.contains("a"));
}

#[test]
fn remove_pending_node_drops_its_edges() {
    let mut graph = diamond();
    complete(&mut graph, "a");
    complete(&mut graph, "b");

    let removed = graph.remove_node("c").unwrap();
    assert_eq!(removed.id, "c");
    assert!(!graph.contains("c"));
    assert!(graph.edges().iter().all(|e| !e.touches("c")));

    // d now only waits for b, which is done; e has no dependencies left.
    assert_eq!(ids(graph.ready_nodes()), vec!["d", "e"]);
    assert!(graph.topological_order().is_ok());
}

#[test]
fn remove_unknown_node_reports_not_found() {
    let mut graph = diamond();
    assert!(matches!(
        graph.remove_node("ghost"),
        Err(EngineError::NodeNotFound(_))
    ));
}

#[test]
fn modify_node_bumps_generation_and_rejects_stale_requests() {
    let mut graph = diamond();

    let generation = graph
        .modify_node(
            "b",
            NodePatch {
                description: Some("rewritten".into()),
                criteria: Some("must mention totals".into()),
                expected_generation: Some(0),
            },
        )
        .unwrap();
    assert_eq!(generation, 1);
    let node = graph.node("b").unwrap();
    assert_eq!(node.description, "rewritten");
    assert_eq!(node.criteria.description, "must mention totals");

    let err = graph
        .modify_node(
            "b",
            NodePatch {
                description: Some("late".into()),
                expected_generation: Some(0),
                ..NodePatch::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::MutationRejected {
            reason: RejectReason::StaleGeneration {
                expected: 0,
                actual: 1
            },
            ..
        }
    ));
    assert_eq!(graph.node("b").unwrap().description, "rewritten");
}

#[test]
fn modify_terminal_node_is_rejected() {
    let mut graph = diamond();
    graph.transition("e", NodeStatus::Skipped).unwrap();
    let err = graph
        .modify_node(
            "e",
            NodePatch {
                description: Some("nope".into()),
                ..NodePatch::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::MutationRejected { .. }));
}

#[test]
fn revision_counts_successful_mutations_only() {
    let mut graph = diamond();
    assert_eq!(graph.revision(), 0);
    graph.add_node(Node::leaf("f", "f")).unwrap();
    graph.add_edge(Edge::dependency("e", "f")).unwrap();
    let _ = graph.add_edge(Edge::dependency("f", "a"));
    graph.remove_node("f").unwrap();
    assert_eq!(graph.revision(), 3);
}

#[test]
fn group_queries_and_summary() {
    let mut graph = GraphBuilder::new()
        .group("g")
        .child("x", "g")
        .child("y", "g")
        .leaf("z")
        .build();

    assert_eq!(ids(graph.children_of("g")), vec!["x", "y"]);
    assert_eq!(ids(graph.pending_leaf_nodes()), vec!["x", "y", "z"]);

    complete(&mut graph, "x");
    graph.transition("y", NodeStatus::Skipped).unwrap();
    assert_eq!(graph.completed_leaf_count(), 1);
    assert!(!graph.is_complete());
    assert!(!graph.has_failed_nodes());
    assert_eq!(
        graph.summary(),
        "4 nodes: 1 completed, 2 pending, 1 skipped"
    );
}

#[test]
fn children_wait_for_their_groups_dependencies() {
    let mut graph = GraphBuilder::new()
        .leaf("setup")
        .group("g")
        .child("x", "g")
        .dep("setup", "g")
        .build();

    assert_eq!(ids(graph.ready_nodes()), vec!["setup"]);
    complete(&mut graph, "setup");
    assert_eq!(ids(graph.ready_nodes()), vec!["g", "x"]);
}

#[test]
fn removing_a_group_detaches_its_children() {
    let mut graph = GraphBuilder::new().group("g").child("x", "g").build();
    graph.remove_node("g").unwrap();
    assert_eq!(graph.node("x").unwrap().parent, None);
}

#[test]
fn removing_a_rollback_source_skips_orphaned_cleanup_units() {
    let mut graph = GraphBuilder::new()
        .leaves(&["x", "y", "r_only", "r_shared", "after_r"])
        .rollback("x", "r_only")
        .rollback("x", "r_shared")
        .rollback("y", "r_shared")
        .dep("r_only", "after_r")
        .build();

    let (removed, orphaned) = graph.remove_node_reporting("x").unwrap();
    assert_eq!(removed.id, "x");
    assert_eq!(orphaned, vec!["r_only", "after_r"]);
    assert_eq!(graph.status_of("r_only"), Some(NodeStatus::Skipped));
    assert_eq!(graph.status_of("after_r"), Some(NodeStatus::Skipped));

    // Still reachable from y, so it stays dormant.
    assert_eq!(graph.status_of("r_shared"), Some(NodeStatus::Pending));
    assert!(graph.is_rollback_unit("r_shared"));
}
