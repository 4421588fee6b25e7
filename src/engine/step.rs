// src/engine/step.rs

//! Per-step result type for manual stepping.

use crate::dag::NodeId;

/// Structured result of a single super-step.
///
/// Useful for tests and drivers that step the graph manually and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    /// 1-based index of this super-step.
    pub step: usize,
    /// Leaf nodes executed in this step, in admission order.
    pub admitted: Vec<NodeId>,
    /// Ready leaf nodes left for a later step by the parallelism cap.
    pub deferred: Vec<NodeId>,
    /// Nodes that reached COMPLETED, including auto-completed groups.
    pub completed: Vec<NodeId>,
    /// Admitted nodes whose run or validation failed.
    pub failed: Vec<NodeId>,
    /// Failed nodes that ended ROLLED_BACK.
    pub rolled_back: Vec<NodeId>,
    /// Rollback units that ran in this step.
    pub rollbacks_executed: Vec<NodeId>,
    /// Every node that ended SKIPPED in this step.
    pub skipped: Vec<NodeId>,
    /// Applied adaptation changes.
    pub adaptations: Vec<String>,
    /// Whether every node is terminal after this step.
    pub run_finished: bool,
}
