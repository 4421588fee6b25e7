// src/dag/lifecycle.rs

//! Node status state machine.
//!
//! [`NodeLifecycle::transition`] is the only code path that changes a node's
//! status. Everything else (scheduler, graph cascades, structural passes)
//! goes through it, so the transition table below is enforced everywhere.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::dag::node::Node;
use crate::errors::{EngineError, Result};

/// Status of a node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    RolledBack,
    Skipped,
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Pending
    }
}

impl NodeStatus {
    /// Absorbing states: no transition leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::RolledBack | NodeStatus::Skipped
        )
    }

    /// Whether the node may still be removed or modified by adaptation.
    pub fn is_mutable(self) -> bool {
        matches!(self, NodeStatus::Pending | NodeStatus::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Ready => "ready",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::RolledBack => "rolled_back",
            NodeStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition table and the single mutator of [`Node`] status.
pub struct NodeLifecycle;

impl NodeLifecycle {
    /// Statuses reachable in one step from `from`.
    pub fn allowed_targets(from: NodeStatus) -> &'static [NodeStatus] {
        use NodeStatus::*;
        match from {
            Pending => &[Ready, Skipped],
            Ready => &[Running, Skipped],
            Running => &[Completed, Failed],
            Failed => &[RolledBack, Skipped],
            Completed | RolledBack | Skipped => &[],
        }
    }

    pub fn can_transition(from: NodeStatus, to: NodeStatus) -> bool {
        Self::allowed_targets(from).contains(&to)
    }

    /// Move `node` to `to`, returning the previous status.
    ///
    /// On an illegal move the node is left untouched and
    /// [`EngineError::InvalidTransition`] is returned.
    pub fn transition(node: &mut Node, to: NodeStatus) -> Result<NodeStatus> {
        let from = node.status();
        if !Self::can_transition(from, to) {
            return Err(EngineError::InvalidTransition {
                node: node.id.clone(),
                from,
                to,
            });
        }

        node.set_status(to);
        debug!(node = %node.id, %from, %to, "status transition");
        Ok(from)
    }
}
