// src/engine/scheduler.rs

//! The super-step control loop.
//!
//! Each call to [`StepScheduler::step`] runs one barrier-synchronised round:
//!
//! 1. settle structural nodes and resolve pending conditionals,
//! 2. discover ready leaf nodes (none while work remains is a deadlock),
//! 3. admit up to `max_parallel` of them in insertion order,
//! 4. run the batch concurrently and wait for all of it,
//! 5. merge every result into [`ExecutionState`],
//! 6. validate successes,
//! 7. handle failures (rollback, then cascade skip),
//! 8. resolve conditional edges out of newly completed nodes,
//! 9. optionally apply plan adaptations,
//! 10. settle groups and conditionals to a fixpoint, promote ready nodes
//!     and append a checkpoint.
//!
//! Graph and state are only touched here, between batches.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::{
    Checkpoint, CheckpointLog, ExecutionState, NodeId, NodeStatus, Settled, StateManager,
    TaskGraph,
};
use crate::engine::adapt::apply_operations;
use crate::engine::{
    EngineEvent, EngineOptions, FailureKind, NodeOutcome, RunReport, StepReport,
    NO_OUTPUT_MESSAGE,
};
use crate::errors::{EngineError, Result};
use crate::exec::backend::{NodeInput, NodeRunner, NodeValidator, PassThroughValidator, PlanAdapter};
use crate::exec::executor_loop::run_batch;
use crate::router::{ResourceRouter, RouterHandle};
use crate::types::EdgeKind;

pub struct StepScheduler<R: NodeRunner + 'static> {
    graph: TaskGraph,
    state: ExecutionState,
    checkpoints: CheckpointLog,
    options: EngineOptions,
    runner: Arc<R>,
    validator: Arc<dyn NodeValidator>,
    adapter: Option<Arc<dyn PlanAdapter>>,
    router: RouterHandle,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
    /// Conditional edges already decided, as (source, target).
    evaluated_conditions: HashSet<(NodeId, NodeId)>,
    adaptations: Vec<String>,
    step: usize,
}

impl<R: NodeRunner + 'static> StepScheduler<R> {
    pub fn new(graph: TaskGraph, state: ExecutionState, options: EngineOptions, runner: R) -> Self {
        let router = Arc::new(ResourceRouter::new(options.failure_threshold));
        Self {
            graph,
            state,
            checkpoints: CheckpointLog::new(),
            options,
            runner: Arc::new(runner),
            validator: Arc::new(PassThroughValidator),
            adapter: None,
            router,
            events: None,
            evaluated_conditions: HashSet::new(),
            adaptations: Vec::new(),
            step: 0,
        }
    }

    pub fn with_validator(mut self, validator: impl NodeValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_adapter(mut self, adapter: impl PlanAdapter + 'static) -> Self {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Replace the default router (e.g. to register available resources).
    pub fn with_router(mut self, router: RouterHandle) -> Self {
        self.router = router;
        self
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn checkpoints(&self) -> &CheckpointLog {
        &self.checkpoints
    }

    pub fn router(&self) -> &RouterHandle {
        &self.router
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Number of super-steps executed so far.
    pub fn steps(&self) -> usize {
        self.step
    }

    /// Run super-steps until every node is terminal.
    ///
    /// Aborts on deadlock or on a structural violation raised while
    /// adapting; the checkpoints taken so far stay available.
    pub async fn run(&mut self) -> Result<RunReport> {
        info!(
            nodes = self.graph.len(),
            max_parallel = self.options.max_parallel,
            "run started"
        );

        while let Some(report) = self.step().await? {
            debug!(
                step = report.step,
                completed = report.completed.len(),
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                "super-step finished"
            );
        }

        let report = self.report();
        info!(steps = report.steps, summary = %self.graph.summary(), "run finished");
        Ok(report)
    }

    /// Run exactly one super-step.
    ///
    /// Returns `Ok(None)` without executing anything once the graph is
    /// complete.
    pub async fn step(&mut self) -> Result<Option<StepReport>> {
        // Normally a no-op: the previous step settled before its checkpoint.
        // Covers graphs handed over with work already decided.
        let settled = self.settle_all()?;

        if self.graph.is_complete() {
            return Ok(None);
        }

        let mut admitted: Vec<NodeId> = self
            .graph
            .ready_nodes()
            .into_iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.id.clone())
            .collect();

        if admitted.is_empty() {
            let pending = self.graph.non_terminal_ids();
            warn!(
                step = self.step + 1,
                summary = %self.graph.summary(),
                "no ready nodes but the run is not complete"
            );
            return Err(EngineError::Deadlock {
                step: self.step + 1,
                pending,
            });
        }

        self.step += 1;
        let step = self.step;
        let deferred = admitted.split_off(admitted.len().min(self.options.max_parallel.max(1)));

        let mut report = StepReport {
            step,
            completed: settled.completed,
            skipped: settled.skipped,
            deferred,
            ..StepReport::default()
        };

        info!(
            step,
            admitted = ?admitted,
            deferred = report.deferred.len(),
            "super-step started"
        );
        self.emit(EngineEvent::StepStarted {
            step,
            admitted: admitted.clone(),
        });
        self.state.begin_step();

        // Execute and merge (barrier inside run_batch).
        let outcomes = self.execute(&admitted, &[]).await?;
        self.merge(&outcomes)?;

        // Validate.
        let mut failures: Vec<(NodeId, FailureKind)> = Vec::new();
        for (id, outcome) in outcomes.iter() {
            match self.judge(id, outcome).await {
                None => {
                    self.graph.transition(id, NodeStatus::Completed)?;
                    info!(node = %id, "node completed");
                    self.emit(EngineEvent::NodeCompleted { node: id.clone() });
                    report.completed.push(id.clone());
                }
                Some(kind) => {
                    self.graph.transition(id, NodeStatus::Failed)?;
                    warn!(node = %id, ?kind, "node failed");
                    self.emit(EngineEvent::NodeFailed {
                        node: id.clone(),
                        kind,
                    });
                    failures.push((id.clone(), kind));
                }
            }
        }
        report.admitted = admitted;

        // Failures: rollback, then cascade.
        for (id, _) in failures {
            self.handle_failure(&id, &mut report).await?;
            report.failed.push(id);
        }

        report.skipped.extend(self.resolve_conditionals()?);

        report.adaptations = self.maybe_adapt(step).await?;

        let settled = self.settle_all()?;
        report.completed.extend(settled.completed);
        report.skipped.extend(settled.skipped);
        StateManager::new(&mut self.graph).refresh_ready_states()?;

        self.checkpoints
            .push(Checkpoint::capture(step, &self.graph, &self.state));
        self.emit(EngineEvent::CheckpointSaved { step });

        report.run_finished = self.graph.is_complete();
        info!(step, summary = %self.graph.summary(), "super-step done");
        Ok(Some(report))
    }

    /// Final report for the current state of the run.
    pub fn report(&self) -> RunReport {
        RunReport {
            steps: self.step,
            output: self.compile_output(),
            statuses: self.graph.statuses(),
            adaptations: self.adaptations.clone(),
        }
    }

    /// Transition `ids` to RUNNING and run them as one batch.
    ///
    /// `extra_context` names additional nodes whose results are included in
    /// every input's context (the failed node, for rollbacks).
    async fn execute(
        &mut self,
        ids: &[NodeId],
        extra_context: &[NodeId],
    ) -> Result<Vec<(NodeId, NodeOutcome)>> {
        let mut inputs = Vec::with_capacity(ids.len());

        for id in ids {
            if self.graph.status_of(id) == Some(NodeStatus::Pending) {
                self.graph.transition(id, NodeStatus::Ready)?;
            }
            self.graph.transition(id, NodeStatus::Running)?;
            self.emit(EngineEvent::NodeStarted { node: id.clone() });

            let node = self
                .graph
                .node(id)
                .cloned()
                .ok_or_else(|| EngineError::NodeNotFound(id.clone()))?;
            let mut deps = self.graph.dependency_ids(id);
            deps.extend(extra_context.iter().cloned());

            inputs.push(NodeInput {
                node,
                context: self.state.context_for(&deps),
                hint: self.router.hint(id),
                router: Arc::clone(&self.router),
            });
        }

        Ok(run_batch(Arc::clone(&self.runner), inputs, self.options.max_parallel).await)
    }

    /// Write every output into the state. Failed outputs are stored too.
    ///
    /// Resource calls were already recorded by the runner through the live
    /// router; the outcome's call list is only logged here.
    fn merge(&mut self, outcomes: &[(NodeId, NodeOutcome)]) -> Result<()> {
        for (id, outcome) in outcomes {
            self.state.merge_result(id, outcome.output.clone())?;
            if !outcome.resource_calls.is_empty() {
                let failed = outcome
                    .resource_calls
                    .iter()
                    .filter(|c| !c.succeeded)
                    .count();
                debug!(
                    node = %id,
                    calls = outcome.resource_calls.len(),
                    failed,
                    "resource calls reported"
                );
            }
        }
        Ok(())
    }

    /// `None` when the node completes, otherwise why it failed.
    async fn judge(&self, id: &str, outcome: &NodeOutcome) -> Option<FailureKind> {
        if !outcome.success {
            return Some(outcome.failure.unwrap_or(FailureKind::Execution));
        }

        let Some(node) = self.graph.node(id) else {
            return Some(FailureKind::Execution);
        };
        if !node.criteria.required {
            return None;
        }

        let verdict = self.validator.validate(node, outcome).await;
        if verdict.pass {
            None
        } else {
            debug!(node = %id, feedback = %verdict.feedback, "validation rejected result");
            Some(FailureKind::Validation)
        }
    }

    /// FAILED node: run its dormant rollback units, settle it as
    /// ROLLED_BACK (some rollback ran) or SKIPPED, then skip its downstream.
    async fn handle_failure(&mut self, id: &str, report: &mut StepReport) -> Result<()> {
        let targets: Vec<NodeId> = self
            .graph
            .rollback_targets(id)
            .into_iter()
            .filter(|t| {
                self.graph.status_of(t).is_some_and(NodeStatus::is_mutable)
                    && self.graph.node(t).is_some_and(|n| n.is_leaf())
            })
            .collect();

        if targets.is_empty() {
            self.graph.transition(id, NodeStatus::Skipped)?;
            debug!(node = %id, "no rollback available; node skipped");
        } else {
            info!(node = %id, rollbacks = ?targets, "executing rollback");
            let outcomes = self.execute(&targets, &[id.to_string()]).await?;
            self.merge(&outcomes)?;

            for (rb, outcome) in outcomes.iter() {
                if outcome.success {
                    self.graph.transition(rb, NodeStatus::Completed)?;
                    report.completed.push(rb.clone());
                } else {
                    // Rollbacks do not roll back.
                    self.graph.transition(rb, NodeStatus::Failed)?;
                    self.graph.transition(rb, NodeStatus::Skipped)?;
                    warn!(node = %rb, failed = %id, "rollback failed");
                    let cascade = self.graph.mark_subtree_skipped(rb)?;
                    report.skipped.push(rb.clone());
                    report.skipped.extend(cascade);
                }
                report.rollbacks_executed.push(rb.clone());
                self.emit(EngineEvent::RollbackExecuted {
                    failed: id.to_string(),
                    rollback: rb.clone(),
                    success: outcome.success,
                });
            }

            self.graph.transition(id, NodeStatus::RolledBack)?;
            info!(node = %id, "node rolled back");
            report.rolled_back.push(id.to_string());
        }

        let skipped = self.graph.mark_subtree_skipped(id)?;
        if !skipped.is_empty() {
            info!(node = %id, skipped = ?skipped, "downstream skipped after failure");
            self.emit(EngineEvent::NodesSkipped {
                cause: id.to_string(),
                nodes: skipped.clone(),
            });
            report.skipped.extend(skipped);
        }

        Ok(())
    }

    /// Structural passes and conditional resolution, repeated until neither
    /// changes anything. A group completed here may be the source of a
    /// conditional edge, and a skipped target may complete a group.
    fn settle_all(&mut self) -> Result<Settled> {
        let mut total = Settled::default();
        loop {
            let settled = StateManager::new(&mut self.graph).settle()?;
            let skipped = self.resolve_conditionals()?;
            if settled.is_empty() && skipped.is_empty() {
                break;
            }
            total.completed.extend(settled.completed);
            total.skipped.extend(settled.skipped);
            total.skipped.extend(skipped);
        }
        Ok(total)
    }

    /// Evaluate every undecided conditional edge out of a COMPLETED node
    /// whose target is still waiting. A false predicate skips the target
    /// and its downstream.
    fn resolve_conditionals(&mut self) -> Result<Vec<NodeId>> {
        let mut decisions: Vec<(NodeId, NodeId, bool)> = Vec::new();

        for edge in self.graph.edges() {
            if edge.kind != EdgeKind::Conditional {
                continue;
            }
            if self.graph.status_of(&edge.source) != Some(NodeStatus::Completed) {
                continue;
            }
            if !self
                .graph
                .status_of(&edge.target)
                .is_some_and(NodeStatus::is_mutable)
            {
                continue;
            }
            let key = (edge.source.clone(), edge.target.clone());
            if self.evaluated_conditions.contains(&key) {
                continue;
            }
            let result = self.state.result(&edge.source).unwrap_or_default();
            decisions.push((key.0, key.1, edge.evaluate(result)));
        }

        let mut skipped = Vec::new();
        for (source, target, passed) in decisions {
            self.evaluated_conditions
                .insert((source.clone(), target.clone()));
            info!(source = %source, target = %target, passed, "condition evaluated");
            self.emit(EngineEvent::ConditionEvaluated {
                source: source.clone(),
                target: target.clone(),
                passed,
            });

            if passed {
                continue;
            }
            // An earlier false condition may have skipped it already.
            if !self
                .graph
                .status_of(&target)
                .is_some_and(NodeStatus::is_mutable)
            {
                continue;
            }
            self.graph.transition(&target, NodeStatus::Skipped)?;
            let mut nodes = vec![target.clone()];
            nodes.extend(self.graph.mark_subtree_skipped(&target)?);
            self.emit(EngineEvent::NodesSkipped {
                cause: source,
                nodes: nodes.clone(),
            });
            skipped.extend(nodes);
        }

        Ok(skipped)
    }

    /// Consult the adapter if one is configured and the policy says so.
    ///
    /// Adapter errors are logged and ignored; a cycle is fatal.
    async fn maybe_adapt(&mut self, step: usize) -> Result<Vec<String>> {
        let Some(adapter) = self.adapter.clone() else {
            return Ok(Vec::new());
        };
        if !self
            .options
            .adaptation
            .is_due(step, self.graph.completed_leaf_count())
        {
            return Ok(Vec::new());
        }
        if self.graph.pending_leaf_nodes().is_empty() {
            debug!(step, "nothing left to adapt");
            return Ok(Vec::new());
        }

        let plan = match adapter.adapt(&self.graph, &self.state).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!(step, error = %err, "adapter failed; continuing without changes");
                return Ok(Vec::new());
            }
        };
        if !plan.should_adapt || plan.operations.is_empty() {
            debug!(step, reasoning = %plan.reasoning, "adapter proposed no changes");
            return Ok(Vec::new());
        }

        let applied = apply_operations(&mut self.graph, plan.operations)?;
        if !applied.changes.is_empty() {
            self.emit(EngineEvent::PlanAdapted {
                step,
                changes: applied.changes.clone(),
            });
            self.adaptations.extend(applied.changes.iter().cloned());
        }
        Ok(applied.changes)
    }

    fn compile_output(&self) -> String {
        let parts: Vec<&str> = self
            .graph
            .nodes()
            .filter(|n| n.is_leaf() && n.status() == NodeStatus::Completed)
            .filter_map(|n| self.state.result(&n.id))
            .filter(|r| !r.is_empty())
            .collect();

        if parts.is_empty() {
            NO_OUTPUT_MESSAGE.to_string()
        } else {
            parts.join("\n\n")
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }
}

impl<R: NodeRunner + 'static> fmt::Debug for StepScheduler<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepScheduler")
            .field("step", &self.step)
            .field("options", &self.options)
            .field("graph", &self.graph.summary())
            .field("checkpoints", &self.checkpoints.len())
            .field("adapter", &self.adapter.is_some())
            .finish()
    }
}
