// src/exec/task_runner.rs

//! Single node execution.

use tracing::{debug, info, warn};

use crate::engine::{FailureKind, NodeOutcome};
use crate::exec::backend::{NodeInput, NodeRunner};

/// Run one node through `runner` and normalise the outcome.
///
/// A failed outcome without a failure kind is tagged as an execution
/// failure; a successful one never carries a kind.
pub async fn run_node<R: NodeRunner + ?Sized>(runner: &R, input: NodeInput) -> NodeOutcome {
    let node = input.node.id.clone();
    info!(
        node = %node,
        kind = %input.node.kind,
        hinted = input.hint.is_some(),
        "starting node"
    );
    debug!(node = %node, context_len = input.context.len(), "node context");

    let mut outcome = runner.run(input).await;

    if outcome.success {
        outcome.failure = None;
        debug!(node = %node, output_len = outcome.output.len(), "runner succeeded");
    } else {
        let kind = *outcome.failure.get_or_insert(FailureKind::Execution);
        warn!(node = %node, ?kind, "runner reported failure");
    }

    outcome
}
