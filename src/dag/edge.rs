// src/dag/edge.rs

//! Directed edges and the predicates carried by conditional edges.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::dag::node::NodeId;
use crate::types::EdgeKind;

/// A user-supplied predicate over a source node's textual result.
pub trait ConditionPredicate: Send + Sync + fmt::Debug {
    fn evaluate(&self, result: &str) -> bool;
}

/// Predicate attached to a [`EdgeKind::Conditional`] edge.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Always true; the edge only gates ordering.
    Always,
    /// Case-insensitive substring match. An empty keyword always matches.
    Contains(String),
    Matches(Regex),
    Custom(Arc<dyn ConditionPredicate>),
}

impl Condition {
    pub fn contains(keyword: impl Into<String>) -> Self {
        Condition::Contains(keyword.into())
    }

    pub fn matches(pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Condition::Matches(Regex::new(pattern)?))
    }

    pub fn custom(predicate: impl ConditionPredicate + 'static) -> Self {
        Condition::Custom(Arc::new(predicate))
    }

    pub fn evaluate(&self, result: &str) -> bool {
        match self {
            Condition::Always => true,
            Condition::Contains(keyword) => {
                let keyword = keyword.trim();
                keyword.is_empty() || result.to_lowercase().contains(&keyword.to_lowercase())
            }
            Condition::Matches(re) => re.is_match(result),
            Condition::Custom(predicate) => predicate.evaluate(result),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("always"),
            Condition::Contains(keyword) => write!(f, "contains({keyword:?})"),
            Condition::Matches(re) => write!(f, "matches(/{}/)", re.as_str()),
            Condition::Custom(predicate) => write!(f, "custom({predicate:?})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    /// Only set on conditional edges.
    pub condition: Option<Condition>,
}

impl Edge {
    pub fn dependency(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: EdgeKind::Dependency,
            condition: None,
        }
    }

    pub fn conditional(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        condition: Condition,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: EdgeKind::Conditional,
            condition: Some(condition),
        }
    }

    pub fn rollback(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: EdgeKind::Rollback,
            condition: None,
        }
    }

    /// Evaluate the edge predicate against the source's result.
    ///
    /// A conditional edge without a predicate falls back to `Always`.
    pub fn evaluate(&self, result: &str) -> bool {
        self.condition
            .as_ref()
            .map(|c| c.evaluate(result))
            .unwrap_or(true)
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }

    /// Whether the target has to wait for the source to complete.
    pub fn gates_readiness(&self) -> bool {
        matches!(self.kind, EdgeKind::Dependency | EdgeKind::Conditional)
    }

    fn same_link(&self, other: &Edge) -> bool {
        self.source == other.source && self.target == other.target && self.kind == other.kind
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.same_link(other)
    }
}
