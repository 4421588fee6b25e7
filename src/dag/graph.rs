// src/dag/graph.rs

//! In-memory task graph keyed by node id.
//!
//! The graph answers the structural questions the scheduler asks between
//! super-steps (readiness, reachability, cycle freedom) and performs the
//! runtime mutations requested by plan adaptation. Every mutation either
//! succeeds completely or leaves the graph untouched.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::config::PlanFile;
use crate::dag::edge::{Condition, Edge};
use crate::dag::lifecycle::{NodeLifecycle, NodeStatus};
use crate::dag::node::{CompletionCriteria, Node, NodeId};
use crate::errors::{EngineError, RejectReason, Result, StructuralViolation};
use crate::types::EdgeKind;

/// Requested changes for [`TaskGraph::modify_node`].
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub description: Option<String>,
    pub criteria: Option<String>,
    /// When set, the patch is rejected unless the node is still at this
    /// generation.
    pub expected_generation: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: HashMap<NodeId, Node>,
    /// Insertion order; admission and output compilation follow it.
    order: Vec<NodeId>,
    edges: Vec<Edge>,
    revision: u64,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from nodes and edges, validating every insertion.
    ///
    /// Parents must appear before their children in `nodes`.
    pub fn with_nodes(
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Result<Self> {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node)?;
        }
        for edge in edges {
            graph.add_edge(edge)?;
        }
        graph.revision = 0;
        Ok(graph)
    }

    /// Build a graph from a validated plan file.
    ///
    /// Nodes are inserted in id order. `after` lists become dependency
    /// edges; `[[edge]]` entries are added afterwards.
    pub fn from_plan(plan: &PlanFile) -> Result<Self> {
        let mut graph = Self::new();

        // Parent ids may sort after their children, so insert everything
        // first and check parents once all ids are known.
        for (id, cfg) in plan.node.iter() {
            if graph.nodes.contains_key(id) {
                return Err(StructuralViolation::DuplicateNode(id.clone()).into());
            }
            graph.order.push(id.clone());
            graph.nodes.insert(id.clone(), Node::from_config(id, cfg));
        }
        for node in graph.nodes.values() {
            if let Some(parent) = &node.parent {
                if !graph.nodes.contains_key(parent) {
                    return Err(StructuralViolation::MissingParent {
                        node: node.id.clone(),
                        parent: parent.clone(),
                    }
                    .into());
                }
            }
        }

        for (id, cfg) in plan.node.iter() {
            for dep in cfg.after.iter() {
                graph.add_edge(Edge::dependency(dep.as_str(), id.as_str()))?;
            }
        }

        for edge_cfg in plan.edge.iter() {
            let condition = match (&edge_cfg.condition, &edge_cfg.condition_regex) {
                (Some(keyword), _) => Some(Condition::contains(keyword.as_str())),
                (None, Some(pattern)) => Some(Condition::matches(pattern).map_err(|e| {
                    EngineError::ConfigError(format!(
                        "edge {} -> {} has invalid condition_regex: {e}",
                        edge_cfg.source, edge_cfg.target
                    ))
                })?),
                (None, None) => None,
            };
            graph.add_edge(Edge {
                source: edge_cfg.source.clone(),
                target: edge_cfg.target.clone(),
                kind: edge_cfg.kind,
                condition,
            })?;
        }

        graph.revision = 0;
        Ok(graph)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bumped on every successful mutation after construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn status_of(&self, id: &str) -> Option<NodeStatus> {
        self.nodes.get(id).map(Node::status)
    }

    /// Nodes that may be admitted now, in insertion order.
    ///
    /// A node qualifies when it is PENDING or READY, is not a dormant
    /// rollback unit, and every gating predecessor (its own and its
    /// ancestors') is COMPLETED.
    pub fn ready_nodes(&self) -> Vec<&Node> {
        self.nodes()
            .filter(|n| n.status().is_mutable())
            .filter(|n| !self.is_rollback_unit(&n.id))
            .filter(|n| self.dependencies_satisfied(&n.id))
            .collect()
    }

    /// Direct predecessors over dependency and conditional edges.
    pub fn dependency_ids(&self, id: &str) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.target == id && e.gates_readiness())
            .map(|e| e.source.clone())
            .collect()
    }

    /// Whether every gating predecessor of `id` and of each of its
    /// enclosing groups has COMPLETED.
    pub fn dependencies_satisfied(&self, id: &str) -> bool {
        let mut current = Some(id);
        let mut seen = HashSet::new();

        while let Some(cur) = current {
            if !seen.insert(cur) {
                break;
            }
            let all_completed = self
                .edges
                .iter()
                .filter(|e| e.target == cur && e.gates_readiness())
                .all(|e| self.status_of(&e.source) == Some(NodeStatus::Completed));
            if !all_completed {
                return false;
            }
            current = self.nodes.get(cur).and_then(|n| n.parent.as_deref());
        }

        true
    }

    /// Every node reachable from `id` over outgoing edges of any kind,
    /// in breadth-first order. `id` itself is not included.
    pub fn downstream(&self, id: &str) -> Vec<NodeId> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        let mut out = Vec::new();

        visited.insert(id);
        queue.push_back(id);

        while let Some(cur) = queue.pop_front() {
            for edge in self.edges.iter().filter(|e| e.source == cur) {
                if visited.insert(edge.target.as_str()) {
                    out.push(edge.target.clone());
                    queue.push_back(edge.target.as_str());
                }
            }
        }

        out
    }

    /// Whether `to` is reachable from `from` (a node reaches itself).
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        from == to || self.downstream(from).iter().any(|n| n == to)
    }

    pub fn conditional_edges(&self, id: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.source == id && e.kind == EdgeKind::Conditional)
            .collect()
    }

    pub fn rollback_targets(&self, id: &str) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.source == id && e.kind == EdgeKind::Rollback)
            .map(|e| e.target.clone())
            .collect()
    }

    /// Nodes whose failure would trigger `id` as a rollback.
    pub fn rollback_sources(&self, id: &str) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.target == id && e.kind == EdgeKind::Rollback)
            .map(|e| e.source.clone())
            .collect()
    }

    /// Rollback units stay dormant until one of their sources fails.
    pub fn is_rollback_unit(&self, id: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.target == id && e.kind == EdgeKind::Rollback)
    }

    /// Direct children of a group, in insertion order.
    pub fn children_of(&self, id: &str) -> Vec<&Node> {
        self.nodes()
            .filter(|n| n.parent.as_deref() == Some(id))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.nodes.values().all(Node::is_terminal)
    }

    pub fn has_failed_nodes(&self) -> bool {
        self.nodes
            .values()
            .any(|n| n.status() == NodeStatus::Failed)
    }

    /// Ids of nodes not yet in a terminal state, in insertion order.
    pub fn non_terminal_ids(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| !n.is_terminal())
            .map(|n| n.id.clone())
            .collect()
    }

    /// Leaf nodes still waiting to run (PENDING or READY).
    pub fn pending_leaf_nodes(&self) -> Vec<&Node> {
        self.nodes()
            .filter(|n| n.is_leaf() && n.status().is_mutable())
            .collect()
    }

    pub fn completed_leaf_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.is_leaf() && n.status() == NodeStatus::Completed)
            .count()
    }

    /// Status of every node, keyed by id.
    pub fn statuses(&self) -> BTreeMap<NodeId, NodeStatus> {
        self.nodes
            .iter()
            .map(|(id, n)| (id.clone(), n.status()))
            .collect()
    }

    /// One-line status histogram, e.g. `"4 nodes: 2 completed, 2 pending"`.
    pub fn summary(&self) -> String {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.status().as_str()).or_default() += 1;
        }
        let parts: Vec<String> = counts
            .iter()
            .map(|(status, count)| format!("{count} {status}"))
            .collect();
        format!("{} nodes: {}", self.nodes.len(), parts.join(", "))
    }

    /// Kahn's algorithm over every edge.
    ///
    /// Used as an invariant check after mutation batches, not as the
    /// execution order.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut in_degree: HashMap<&str, usize> =
            self.order.iter().map(|id| (id.as_str(), 0)).collect();
        for edge in &self.edges {
            if let Some(d) = in_degree.get_mut(edge.target.as_str()) {
                *d += 1;
            }
        }

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while let Some(id) = queue.pop_front() {
            sorted.push(id.to_string());
            for edge in self.edges.iter().filter(|e| e.source == id) {
                if let Some(d) = in_degree.get_mut(edge.target.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(edge.target.as_str());
                    }
                }
            }
        }

        if sorted.len() != self.order.len() {
            let stuck: Vec<&str> = self
                .order
                .iter()
                .map(String::as_str)
                .filter(|id| in_degree.get(id).copied().unwrap_or(0) > 0)
                .collect();
            return Err(StructuralViolation::CycleDetected(format!(
                "nodes left with incoming edges: {}",
                stuck.join(", ")
            ))
            .into());
        }

        Ok(sorted)
    }

    // ------------------------------------------------------------------
    // Status changes
    // ------------------------------------------------------------------

    /// Apply a lifecycle transition to the node with the given id.
    pub fn transition(&mut self, id: &str, to: NodeStatus) -> Result<NodeStatus> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;
        NodeLifecycle::transition(node, to)
    }

    /// Skip every PENDING or READY node in `downstream(id)`.
    ///
    /// Terminal and in-flight nodes are left alone, so calling this twice
    /// is harmless. Returns the ids that were skipped.
    pub fn mark_subtree_skipped(&mut self, id: &str) -> Result<Vec<NodeId>> {
        let mut skipped = Vec::new();
        for nid in self.downstream(id) {
            if self.status_of(&nid).is_some_and(NodeStatus::is_mutable) {
                self.transition(&nid, NodeStatus::Skipped)?;
                debug!(node = %nid, upstream = %id, "skipped (downstream)");
                skipped.push(nid);
            }
        }
        Ok(skipped)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(StructuralViolation::DuplicateNode(node.id).into());
        }
        if node.status() != NodeStatus::Pending {
            return Err(EngineError::MutationRejected {
                node: node.id.clone(),
                reason: RejectReason::NotPending(node.status()),
            });
        }
        if let Some(parent) = &node.parent {
            if !self.nodes.contains_key(parent) {
                return Err(StructuralViolation::MissingParent {
                    node: node.id.clone(),
                    parent: parent.clone(),
                }
                .into());
            }
        }

        debug!(node = %node.id, kind = %node.kind, "node added");
        self.order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
        self.revision += 1;
        Ok(())
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        for endpoint in [&edge.source, &edge.target] {
            if !self.nodes.contains_key(endpoint) {
                return Err(StructuralViolation::MissingEndpoint {
                    from: edge.source.clone(),
                    to: edge.target.clone(),
                    missing: endpoint.clone(),
                }
                .into());
            }
        }
        if self.edges.contains(&edge) {
            return Err(StructuralViolation::DuplicateEdge {
                from: edge.source,
                to: edge.target,
                kind: edge.kind,
            }
            .into());
        }
        if self.reaches(&edge.target, &edge.source) {
            return Err(StructuralViolation::CycleDetected(format!(
                "edge {} -> {} would close a cycle",
                edge.source, edge.target
            ))
            .into());
        }

        debug!(from = %edge.source, to = %edge.target, kind = %edge.kind, "edge added");
        self.edges.push(edge);
        self.revision += 1;
        Ok(())
    }

    /// Remove a PENDING or READY node together with every edge touching it.
    ///
    /// Children of a removed group become top-level nodes. Rollback units
    /// left without any rollback source can never be triggered and are
    /// skipped, with their downstream; use [`remove_node_reporting`] to
    /// learn which.
    ///
    /// [`remove_node_reporting`]: Self::remove_node_reporting
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        self.remove_node_reporting(id).map(|(node, _)| node)
    }

    /// [`remove_node`](Self::remove_node), also returning the ids skipped
    /// because they lost their last rollback source.
    pub fn remove_node_reporting(&mut self, id: &str) -> Result<(Node, Vec<NodeId>)> {
        let status = self
            .status_of(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;
        if !status.is_mutable() {
            return Err(EngineError::MutationRejected {
                node: id.to_string(),
                reason: RejectReason::NotMutable(status),
            });
        }

        let removed = self
            .nodes
            .remove(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;
        self.order.retain(|n| n != id);
        let before = self.edges.len();
        let cleanup_targets = self.rollback_targets(id);
        self.edges.retain(|e| !e.touches(id));
        for node in self.nodes.values_mut() {
            if node.parent.as_deref() == Some(id) {
                node.parent = None;
            }
        }

        debug!(
            node = %id,
            edges_removed = before - self.edges.len(),
            "node removed"
        );
        self.revision += 1;

        let mut orphaned = Vec::new();
        for target in cleanup_targets {
            if self.is_rollback_unit(&target)
                || !self.status_of(&target).is_some_and(NodeStatus::is_mutable)
            {
                continue;
            }
            self.transition(&target, NodeStatus::Skipped)?;
            debug!(node = %target, removed = %id, "rollback unit lost its last source");
            orphaned.push(target.clone());
            orphaned.extend(self.mark_subtree_skipped(&target)?);
        }

        Ok((removed, orphaned))
    }

    /// Rewrite the description and/or criteria of a PENDING or READY node.
    ///
    /// Returns the node's new generation.
    pub fn modify_node(&mut self, id: &str, patch: NodePatch) -> Result<u64> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))?;

        if !node.status().is_mutable() {
            return Err(EngineError::MutationRejected {
                node: id.to_string(),
                reason: RejectReason::NotMutable(node.status()),
            });
        }
        if let Some(expected) = patch.expected_generation {
            if expected != node.generation() {
                return Err(EngineError::MutationRejected {
                    node: id.to_string(),
                    reason: RejectReason::StaleGeneration {
                        expected,
                        actual: node.generation(),
                    },
                });
            }
        }

        if let Some(description) = patch.description {
            node.description = description;
        }
        if let Some(criteria) = patch.criteria {
            node.criteria = CompletionCriteria {
                description: criteria,
                required: node.criteria.required,
            };
        }
        let generation = node.bump_generation();

        debug!(node = %id, generation, "node modified");
        self.revision += 1;
        Ok(generation)
    }

    /// Remove a single edge. Used to undo a partially applied ADD.
    pub(crate) fn remove_edge(&mut self, edge: &Edge) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| e != edge);
        before != self.edges.len()
    }
}
