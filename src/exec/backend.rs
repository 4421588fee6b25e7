// src/exec/backend.rs

//! Collaborator traits injected into the scheduler.
//!
//! The engine never produces results itself. It hands nodes to a
//! [`NodeRunner`], asks a [`NodeValidator`] whether a successful result
//! meets the node's criteria, and optionally asks a [`PlanAdapter`] to
//! restructure the remaining plan between steps. Tests substitute scripted
//! implementations for all three.

use std::future::Future;
use std::pin::Pin;

use crate::dag::{ExecutionState, Node, TaskGraph};
use crate::engine::{AdaptationPlan, NodeOutcome, Verdict};
use crate::router::RouterHandle;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a runner gets for one node.
#[derive(Debug, Clone)]
pub struct NodeInput {
    /// Snapshot of the node at admission time.
    pub node: Node,
    /// Accumulated context plus the results of the node's dependencies.
    pub context: String,
    /// Circuit-breaker hint at admission time, present when the router
    /// already holds failing stats for this node id.
    pub hint: Option<String>,
    /// Live router. Runners record every resource call here as it happens
    /// and ask [`hint`](crate::router::ResourceRouter::hint) before picking
    /// the next resource. The scheduler never records calls itself.
    pub router: RouterHandle,
}

/// Executes a single node.
///
/// A runner that uses resources reports each call through
/// `input.router` while it works, so a resource that keeps failing shows
/// up in `input.router.hint(&input.node.id)` within the same run.
///
/// Failures are reported through [`NodeOutcome::success`], never by
/// panicking; a panic is still caught and recorded as a failure.
pub trait NodeRunner: Send + Sync {
    fn run(&self, input: NodeInput) -> BoxFuture<'_, NodeOutcome>;
}

/// Decides whether a successful outcome satisfies the node's criteria.
pub trait NodeValidator: Send + Sync {
    fn validate<'a>(&'a self, node: &'a Node, outcome: &'a NodeOutcome) -> BoxFuture<'a, Verdict>;
}

/// Proposes structural changes to the remaining plan.
///
/// Errors are logged by the scheduler and the step continues unchanged.
pub trait PlanAdapter: Send + Sync {
    fn adapt<'a>(
        &'a self,
        graph: &'a TaskGraph,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, anyhow::Result<AdaptationPlan>>;
}

/// Validator that accepts every successful outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughValidator;

impl NodeValidator for PassThroughValidator {
    fn validate<'a>(&'a self, _node: &'a Node, outcome: &'a NodeOutcome) -> BoxFuture<'a, Verdict> {
        let verdict = if outcome.success {
            Verdict::pass()
        } else {
            Verdict::fail("runner reported failure")
        };
        Box::pin(async move { verdict })
    }
}
