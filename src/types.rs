use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether a node does work itself or only groups other nodes.
///
/// - `Group`: structural node; completes on its own once every child is
///   terminal and is never handed to the runner.
/// - `Leaf`: executable action (default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Group,
    Leaf,
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Leaf
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "group" => Ok(NodeKind::Group),
            "leaf" => Ok(NodeKind::Leaf),
            other => Err(format!(
                "invalid node kind: {other} (expected \"group\" or \"leaf\")"
            )),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Group => f.write_str("group"),
            NodeKind::Leaf => f.write_str("leaf"),
        }
    }
}

/// Relation carried by an edge.
///
/// - `Dependency`: target waits until source is COMPLETED.
/// - `Conditional`: like `Dependency`, and additionally the edge predicate
///   must hold on the source's result, otherwise the target is skipped.
/// - `Rollback`: target is a cleanup unit run only when the source fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Dependency,
    Conditional,
    Rollback,
}

impl Default for EdgeKind {
    fn default() -> Self {
        EdgeKind::Dependency
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dependency" => Ok(EdgeKind::Dependency),
            "conditional" => Ok(EdgeKind::Conditional),
            "rollback" => Ok(EdgeKind::Rollback),
            other => Err(format!(
                "invalid edge kind: {other} (expected \"dependency\", \"conditional\" or \"rollback\")"
            )),
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Dependency => f.write_str("dependency"),
            EdgeKind::Conditional => f.write_str("conditional"),
            EdgeKind::Rollback => f.write_str("rollback"),
        }
    }
}

/// Planner-assigned risk tag. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Low
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!(
                "invalid risk level: {other} (expected \"low\", \"medium\" or \"high\")"
            )),
        }
    }
}
