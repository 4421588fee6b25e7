// tests/property_graph.rs

mod common;
use crate::common::builders::GraphBuilder;
use crate::common::fake_runner::ScriptedRunner;
use crate::common::scheduler;

use std::collections::BTreeSet;

use proptest::prelude::*;
use taskdag::dag::{Edge, NodeStatus, TaskGraph};

// Acyclic by construction: node i may only depend on nodes 0..i.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1..=max_nodes).prop_flat_map(|n| {
        let pairs = proptest::collection::vec((0..n, 0..n), 0..n * 2);
        pairs.prop_map(move |raw| {
            let edges: BTreeSet<(usize, usize)> = raw
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.min(b), a.max(b)))
                .collect();
            (n, edges.into_iter().collect())
        })
    })
}

fn name(i: usize) -> String {
    format!("n{i}")
}

fn build(n: usize, edges: &[(usize, usize)]) -> TaskGraph {
    let mut builder = GraphBuilder::new();
    for i in 0..n {
        builder = builder.leaf(&name(i));
    }
    for (a, b) in edges {
        builder = builder.dep(&name(*a), &name(*b));
    }
    builder.build()
}

proptest! {
    #[test]
    fn random_edge_insertions_never_create_cycles(
        (n, edges) in dag_strategy(8),
        attempts in proptest::collection::vec((0..8usize, 0..8usize), 0..24),
    ) {
        let mut graph = build(n, &edges);

        for (a, b) in attempts {
            if a >= n || b >= n {
                continue;
            }
            let before = graph.edges().len();
            match graph.add_edge(Edge::dependency(name(a), name(b))) {
                Ok(()) => prop_assert_eq!(graph.edges().len(), before + 1),
                Err(_) => prop_assert_eq!(graph.edges().len(), before),
            }
            prop_assert!(graph.topological_order().is_ok());
        }
    }

    #[test]
    fn every_run_terminates_with_consistent_statuses(
        (n, edges) in dag_strategy(8),
        failing in proptest::collection::btree_set(0..8usize, 0..4),
        max_parallel in 1..4usize,
    ) {
        let graph = build(n, &edges);
        let mut runner = ScriptedRunner::new();
        for i in failing.iter().filter(|i| **i < n) {
            runner = runner.fail(&name(*i), "scripted failure");
        }

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let mut sched = scheduler(graph, runner, max_parallel);
        let report = rt.block_on(sched.run()).unwrap();

        prop_assert_eq!(sched.checkpoints().len(), report.steps);
        prop_assert!(report.steps <= n);
        prop_assert!(report.statuses.values().all(|s| s.is_terminal()));

        let graph = sched.graph();
        for (a, b) in edges.iter() {
            let (sa, sb) = (report.statuses[&name(*a)], report.statuses[&name(*b)]);
            // A node only completes after all of its dependencies did.
            if sb == NodeStatus::Completed {
                prop_assert_eq!(sa, NodeStatus::Completed);
            }
            if sa != NodeStatus::Completed {
                prop_assert_eq!(sb, NodeStatus::Skipped);
            }
        }
        for i in failing.iter().filter(|i| **i < n) {
            prop_assert_eq!(graph.status_of(&name(*i)), Some(NodeStatus::Skipped));
        }
    }
}
