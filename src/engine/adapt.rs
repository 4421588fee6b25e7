// src/engine/adapt.rs

//! Applying plan adaptations between super-steps.
//!
//! An adapter returns an [`AdaptationPlan`]; each operation is applied
//! through the graph's fail-closed mutation API. A rejected operation is
//! logged and skipped, the rest of the batch still applies. A cycle is the
//! one error that aborts the run.

use tracing::{debug, info, warn};

use crate::dag::{Edge, Node, NodeId, NodePatch, TaskGraph};
use crate::errors::{EngineError, Result};

/// When the adapter is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptationPolicy {
    pub enabled: bool,
    /// Consult the adapter after every N-th super-step.
    pub every_n_steps: usize,
    /// Minimum number of COMPLETED leaf nodes before adapting.
    pub min_completed: usize,
}

impl Default for AdaptationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            every_n_steps: 1,
            min_completed: 1,
        }
    }
}

impl AdaptationPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn is_due(&self, step: usize, completed: usize) -> bool {
        self.enabled
            && self.every_n_steps > 0
            && step % self.every_n_steps == 0
            && completed >= self.min_completed
    }
}

/// One structural change requested by an adapter.
#[derive(Debug, Clone)]
pub enum PlanOperation {
    Remove {
        node: NodeId,
        reason: String,
    },
    Modify {
        node: NodeId,
        description: Option<String>,
        criteria: Option<String>,
        /// Reject the change if the node was modified since the adapter
        /// looked at it.
        expected_generation: Option<u64>,
        reason: String,
    },
    Add {
        node: Node,
        edges: Vec<Edge>,
        reason: String,
    },
}

impl PlanOperation {
    pub fn target(&self) -> &str {
        match self {
            PlanOperation::Remove { node, .. } | PlanOperation::Modify { node, .. } => node,
            PlanOperation::Add { node, .. } => &node.id,
        }
    }
}

/// Adapter response.
#[derive(Debug, Clone, Default)]
pub struct AdaptationPlan {
    pub should_adapt: bool,
    pub reasoning: String,
    pub operations: Vec<PlanOperation>,
}

impl AdaptationPlan {
    pub fn no_change() -> Self {
        Self::default()
    }

    pub fn with_operations(operations: Vec<PlanOperation>) -> Self {
        Self {
            should_adapt: true,
            reasoning: String::new(),
            operations,
        }
    }
}

/// Outcome of [`apply_operations`].
#[derive(Debug, Clone, Default)]
pub struct AppliedAdaptations {
    /// One description per applied operation.
    pub changes: Vec<String>,
    /// Operations refused by the graph, with the error text.
    pub rejected: Vec<(NodeId, String)>,
}

/// Apply `operations` in order.
///
/// Returns an error only for a cycle; the graph is then left as it was
/// before the offending operation. On success the graph is re-checked with
/// [`TaskGraph::topological_order`].
pub fn apply_operations(
    graph: &mut TaskGraph,
    operations: Vec<PlanOperation>,
) -> Result<AppliedAdaptations> {
    let mut applied = AppliedAdaptations::default();

    for op in operations {
        let target = op.target().to_string();
        match apply_one(graph, op) {
            Ok(change) => {
                info!(node = %target, change = %change, "plan adapted");
                applied.changes.push(change);
            }
            Err(err) if err.is_fatal_mutation() => {
                warn!(node = %target, error = %err, "adaptation would introduce a cycle");
                return Err(err);
            }
            Err(err) => {
                warn!(node = %target, error = %err, "adaptation operation rejected");
                applied.rejected.push((target, err.to_string()));
            }
        }
    }

    graph.topological_order()?;
    Ok(applied)
}

fn apply_one(graph: &mut TaskGraph, op: PlanOperation) -> Result<String> {
    match op {
        PlanOperation::Remove { node, reason } => {
            let (_, orphaned) = graph.remove_node_reporting(&node)?;
            if orphaned.is_empty() {
                Ok(format!("REMOVE {node}: {reason}"))
            } else {
                Ok(format!(
                    "REMOVE {node}: {reason} (skipped {})",
                    orphaned.join(", ")
                ))
            }
        }
        PlanOperation::Modify {
            node,
            description,
            criteria,
            expected_generation,
            reason,
        } => {
            let generation = graph.modify_node(
                &node,
                NodePatch {
                    description,
                    criteria,
                    expected_generation,
                },
            )?;
            Ok(format!("MODIFY {node} (generation {generation}): {reason}"))
        }
        PlanOperation::Add {
            node,
            edges,
            reason,
        } => {
            let id = node.id.clone();
            add_atomically(graph, node, edges)?;
            Ok(format!("ADD {id}: {reason}"))
        }
    }
}

/// Insert a node and its edges, or nothing at all.
fn add_atomically(graph: &mut TaskGraph, node: Node, edges: Vec<Edge>) -> Result<()> {
    let id = node.id.clone();
    graph.add_node(node)?;

    let mut inserted: Vec<Edge> = Vec::with_capacity(edges.len());
    for edge in edges {
        match graph.add_edge(edge.clone()) {
            Ok(()) => inserted.push(edge),
            Err(err) => {
                debug!(node = %id, error = %err, "undoing partial ADD");
                for e in inserted.iter().rev() {
                    graph.remove_edge(e);
                }
                graph.remove_node(&id).map_err(|undo| {
                    EngineError::Other(anyhow::anyhow!(
                        "failed to undo ADD of '{id}' after {err}: {undo}"
                    ))
                })?;
                return Err(err);
            }
        }
    }

    Ok(())
}
