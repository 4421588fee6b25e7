// src/exec/executor_loop.rs

//! Bounded fan-out / fan-in of one batch.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::dag::NodeId;
use crate::engine::NodeOutcome;
use crate::exec::backend::{NodeInput, NodeRunner};
use crate::exec::task_runner::run_node;

/// Run every input concurrently, at most `max_parallel` at a time, and
/// return once all of them have finished.
///
/// Results come back in the order of `inputs`, independent of completion
/// order. A runner that panics yields a [`FailureKind::Panicked`] outcome
/// for its node; the rest of the batch is unaffected.
///
/// [`FailureKind::Panicked`]: crate::engine::FailureKind::Panicked
pub async fn run_batch<R>(
    runner: Arc<R>,
    inputs: Vec<NodeInput>,
    max_parallel: usize,
) -> Vec<(NodeId, NodeOutcome)>
where
    R: NodeRunner + ?Sized + 'static,
{
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut handles = Vec::with_capacity(inputs.len());

    for input in inputs {
        let id = input.node.id.clone();
        let runner = Arc::clone(&runner);
        let permits = Arc::clone(&permits);

        let handle = tokio::spawn(async move {
            // The semaphore is never closed.
            let _permit = permits.acquire_owned().await.ok();
            run_node(runner.as_ref(), input).await
        });
        handles.push((id, handle));
    }

    debug!(batch = handles.len(), max_parallel, "batch dispatched");

    // Barrier: nothing is merged until every handle has been joined.
    let mut results = Vec::with_capacity(handles.len());
    for (id, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(node = %id, error = %err, "runner task panicked");
                NodeOutcome::panicked(format!("runner panicked: {err}"))
            }
        };
        results.push((id, outcome));
    }

    results
}
