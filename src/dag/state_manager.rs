// src/dag/state_manager.rs

//! Between-step status passes that need no runner.
//!
//! - group nodes complete or skip from their children's outcome,
//! - children of a skipped group are skipped with it,
//! - dormant rollback units are retired once no source can fail anymore,
//! - PENDING nodes with satisfied dependencies are promoted to READY.

use tracing::{debug, info};

use crate::dag::graph::TaskGraph;
use crate::dag::lifecycle::NodeStatus;
use crate::dag::node::NodeId;
use crate::errors::Result;

/// Nodes whose status changed during a settle pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settled {
    /// Groups that auto-completed.
    pub completed: Vec<NodeId>,
    /// Everything skipped, including cascades.
    pub skipped: Vec<NodeId>,
}

impl Settled {
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.skipped.is_empty()
    }

    fn absorb(&mut self, other: Settled) {
        self.completed.extend(other.completed);
        self.skipped.extend(other.skipped);
    }
}

/// Mutable view over a graph for the structural passes.
pub struct StateManager<'a> {
    graph: &'a mut TaskGraph,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a mut TaskGraph) -> Self {
        Self { graph }
    }

    /// Run every structural pass until none of them changes anything.
    ///
    /// Nested groups need several rounds: an inner group completing can
    /// make its parent complete.
    pub fn settle(&mut self) -> Result<Settled> {
        let mut total = Settled::default();
        loop {
            let mut round = Settled::default();
            round.absorb(self.skip_children_of_skipped_groups()?);
            round.absorb(self.retire_dormant_rollbacks()?);
            round.absorb(self.complete_structural_nodes()?);
            if round.is_empty() {
                break;
            }
            total.absorb(round);
        }
        Ok(total)
    }

    /// Complete or skip groups whose children have all reached a terminal
    /// state.
    ///
    /// A group with at least one COMPLETED child completes along the normal
    /// path (PENDING -> READY -> RUNNING -> COMPLETED). A group whose
    /// children all ended SKIPPED or ROLLED_BACK is skipped together with
    /// its downstream. A childless group completes as soon as its
    /// dependencies have.
    pub fn complete_structural_nodes(&mut self) -> Result<Settled> {
        let mut out = Settled::default();

        let candidates: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|n| n.is_group() && n.status().is_mutable())
            .map(|n| n.id.clone())
            .collect();

        for id in candidates {
            let children: Vec<NodeStatus> = self
                .graph
                .children_of(&id)
                .into_iter()
                .map(|c| c.status())
                .collect();

            let complete = if children.is_empty() {
                self.graph.dependencies_satisfied(&id)
            } else if children.iter().all(|s| s.is_terminal()) {
                children.contains(&NodeStatus::Completed)
            } else {
                continue;
            };

            if complete {
                if self.graph.status_of(&id) == Some(NodeStatus::Pending) {
                    self.graph.transition(&id, NodeStatus::Ready)?;
                }
                self.graph.transition(&id, NodeStatus::Running)?;
                self.graph.transition(&id, NodeStatus::Completed)?;
                info!(node = %id, children = children.len(), "group completed");
                out.completed.push(id);
            } else if !children.is_empty() {
                self.graph.transition(&id, NodeStatus::Skipped)?;
                debug!(node = %id, "group skipped; no child completed");
                let cascade = self.graph.mark_subtree_skipped(&id)?;
                out.skipped.push(id);
                out.skipped.extend(cascade);
            }
        }

        Ok(out)
    }

    /// Skip the PENDING/READY children of skipped groups, and their
    /// downstream.
    pub fn skip_children_of_skipped_groups(&mut self) -> Result<Settled> {
        let mut out = Settled::default();

        let orphans: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|n| n.status().is_mutable())
            .filter(|n| {
                n.parent
                    .as_deref()
                    .and_then(|p| self.graph.status_of(p))
                    == Some(NodeStatus::Skipped)
            })
            .map(|n| n.id.clone())
            .collect();

        for id in orphans {
            // An earlier cascade in this loop may already have reached it.
            if !self.graph.status_of(&id).is_some_and(NodeStatus::is_mutable) {
                continue;
            }
            self.graph.transition(&id, NodeStatus::Skipped)?;
            debug!(node = %id, "skipped with enclosing group");
            let cascade = self.graph.mark_subtree_skipped(&id)?;
            out.skipped.push(id);
            out.skipped.extend(cascade);
        }

        Ok(out)
    }

    /// Skip rollback units none of whose sources can still fail.
    pub fn retire_dormant_rollbacks(&mut self) -> Result<Settled> {
        let mut out = Settled::default();

        let dormant: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|n| n.status().is_mutable())
            .filter(|n| self.graph.is_rollback_unit(&n.id))
            .filter(|n| {
                self.graph
                    .rollback_sources(&n.id)
                    .iter()
                    .all(|s| self.graph.status_of(s).is_some_and(NodeStatus::is_terminal))
            })
            .map(|n| n.id.clone())
            .collect();

        for id in dormant {
            if !self.graph.status_of(&id).is_some_and(NodeStatus::is_mutable) {
                continue;
            }
            self.graph.transition(&id, NodeStatus::Skipped)?;
            debug!(node = %id, "rollback unit retired unused");
            let cascade = self.graph.mark_subtree_skipped(&id)?;
            out.skipped.push(id);
            out.skipped.extend(cascade);
        }

        Ok(out)
    }

    /// Promote PENDING nodes whose dependencies have completed to READY.
    ///
    /// Rollback units stay PENDING until they are triggered.
    pub fn refresh_ready_states(&mut self) -> Result<Vec<NodeId>> {
        let promotable: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|n| n.status() == NodeStatus::Pending)
            .filter(|n| !self.graph.is_rollback_unit(&n.id))
            .filter(|n| self.graph.dependencies_satisfied(&n.id))
            .map(|n| n.id.clone())
            .collect();

        for id in promotable.iter() {
            self.graph.transition(id, NodeStatus::Ready)?;
        }

        Ok(promotable)
    }
}
