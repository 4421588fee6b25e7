// src/errors.rs

//! Crate-wide error types.
//!
//! Node-level failures never show up here: they travel as
//! [`NodeOutcome`](crate::engine::NodeOutcome) values and are recovered by
//! the scheduler. Everything in [`EngineError`] is raised immediately at the
//! call that caused it.

use std::fmt;

use thiserror::Error;

use crate::dag::{NodeId, NodeStatus};
use crate::types::EdgeKind;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("node '{node}': cannot transition from {from} to {to}")]
    InvalidTransition {
        node: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },

    #[error("structural violation: {0}")]
    Structural(#[from] StructuralViolation),

    #[error("mutation of node '{node}' rejected: {reason}")]
    MutationRejected { node: NodeId, reason: RejectReason },

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error(
        "deadlock at super-step {step}: nothing is ready but {} node(s) are not terminal ({})",
        .pending.len(),
        .pending.join(", ")
    )]
    Deadlock { step: usize, pending: Vec<NodeId> },

    #[error("result for node '{0}' was already written in this super-step")]
    ResultConflict(NodeId),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether this error must abort a run when raised while applying plan
    /// adaptations. Everything else only rejects the offending operation.
    pub fn is_fatal_mutation(&self) -> bool {
        matches!(
            self,
            EngineError::Structural(StructuralViolation::CycleDetected(_))
        )
    }
}

/// Graph-shape violations. The graph is left unchanged when one is raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralViolation {
    #[error("node '{0}' already exists")]
    DuplicateNode(NodeId),

    #[error("node '{node}' names missing parent '{parent}'")]
    MissingParent { node: NodeId, parent: NodeId },

    #[error("edge {from} -> {to} references missing node '{missing}'")]
    MissingEndpoint {
        from: NodeId,
        to: NodeId,
        missing: NodeId,
    },

    #[error("edge {from} -> {to} ({kind}) already exists")]
    DuplicateEdge {
        from: NodeId,
        to: NodeId,
        kind: EdgeKind,
    },

    #[error("cycle detected: {0}")]
    CycleDetected(String),
}

/// Why a remove/modify/add request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Only PENDING and READY nodes may be removed or modified.
    NotMutable(NodeStatus),
    /// The request was computed against an older version of the node.
    StaleGeneration { expected: u64, actual: u64 },
    /// Newly added nodes must start out PENDING.
    NotPending(NodeStatus),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotMutable(status) => {
                write!(f, "status is {status} (must be pending or ready)")
            }
            RejectReason::StaleGeneration { expected, actual } => {
                write!(f, "stale request for generation {expected} (node is at {actual})")
            }
            RejectReason::NotPending(status) => {
                write!(f, "new nodes must be pending (got {status})")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
