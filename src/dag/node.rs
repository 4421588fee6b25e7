// src/dag/node.rs

//! Node metadata.
//!
//! Status and generation are private: status only changes through
//! [`NodeLifecycle`](crate::dag::NodeLifecycle) and the generation only
//! through [`TaskGraph::modify_node`](crate::dag::TaskGraph::modify_node).

use serde::Serialize;

use crate::config::NodeConfig;
use crate::dag::lifecycle::NodeStatus;
use crate::types::{NodeKind, RiskLevel};

/// Nodes and edges are keyed by identifier.
pub type NodeId = String;

/// Exit criteria handed to the external validator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionCriteria {
    pub description: String,
    /// When false the validator is not consulted and a successful run
    /// completes the node directly.
    pub required: bool,
}

impl CompletionCriteria {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: false,
        }
    }
}

impl Default for CompletionCriteria {
    fn default() -> Self {
        Self::new("")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub description: String,
    pub criteria: CompletionCriteria,
    /// Enclosing group, if any.
    pub parent: Option<NodeId>,
    pub confidence: Option<f64>,
    pub risk: RiskLevel,
    /// Free-text note on how to undo this node; opaque to the engine.
    pub rollback_action: Option<String>,
    generation: u64,
    status: NodeStatus,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            criteria: CompletionCriteria::default(),
            parent: None,
            confidence: None,
            risk: RiskLevel::default(),
            rollback_action: None,
            generation: 0,
            status: NodeStatus::Pending,
        }
    }

    pub fn leaf(id: impl Into<NodeId>, description: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Leaf, description)
    }

    pub fn group(id: impl Into<NodeId>, description: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Group, description)
    }

    pub fn with_criteria(mut self, criteria: CompletionCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<NodeId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_rollback_action(mut self, action: impl Into<String>) -> Self {
        self.rollback_action = Some(action.into());
        self
    }

    /// Build a pending node from a `[node.<id>]` section.
    pub fn from_config(id: &str, cfg: &NodeConfig) -> Self {
        let criteria = CompletionCriteria {
            description: cfg.criteria.clone(),
            required: cfg.validate,
        };

        Self {
            id: id.to_string(),
            kind: cfg.kind,
            description: cfg.description.clone(),
            criteria,
            parent: cfg.parent.clone(),
            confidence: cfg.confidence,
            risk: cfg.risk,
            rollback_action: cfg.rollback_action.clone(),
            generation: 0,
            status: NodeStatus::Pending,
        }
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(super) fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
    }

    pub(super) fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}
