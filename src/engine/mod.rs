// src/engine/mod.rs

//! Super-step execution engine.
//!
//! This module ties together:
//! - the [`scheduler`] control loop (discover, admit, execute, merge,
//!   validate, handle failures, resolve conditionals, adapt, checkpoint),
//! - plan [`adapt`]ation applied between steps,
//! - the per-step report type in [`step`].
//!
//! The types below are what flows between the scheduler and its injected
//! collaborators.

use std::collections::BTreeMap;

use crate::config::EngineSection;
use crate::dag::{NodeId, NodeStatus};

/// Text of the run output when no leaf node completed.
pub const NO_OUTPUT_MESSAGE: &str = "No action nodes completed successfully.";

/// Why a node did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The runner reported an unsuccessful outcome.
    Execution,
    /// The runner succeeded but the validator rejected the result.
    Validation,
    /// The runner panicked; caught at the batch join point.
    Panicked,
}

/// One resource invocation made by a runner while working on a node.
///
/// Returned in [`NodeOutcome::resource_calls`] as a log. Statistics are
/// kept by the router, which the runner updates directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCall {
    pub resource: String,
    pub succeeded: bool,
    pub detail: String,
}

impl ResourceCall {
    pub fn ok(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            succeeded: true,
            detail: String::new(),
        }
    }

    pub fn failed(resource: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            succeeded: false,
            detail: detail.into(),
        }
    }
}

/// What a runner returns for one node. Node failures travel here, never
/// as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutcome {
    pub success: bool,
    pub output: String,
    pub resource_calls: Vec<ResourceCall>,
    pub failure: Option<FailureKind>,
}

impl NodeOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            resource_calls: Vec::new(),
            failure: None,
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            resource_calls: Vec::new(),
            failure: Some(FailureKind::Execution),
        }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            resource_calls: Vec::new(),
            failure: Some(FailureKind::Panicked),
        }
    }

    pub fn with_calls(mut self, calls: Vec<ResourceCall>) -> Self {
        self.resource_calls = calls;
        self
    }
}

/// Validator decision for a successful outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub pass: bool,
    pub feedback: String,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            pass: true,
            feedback: String::new(),
        }
    }

    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            pass: false,
            feedback: feedback.into(),
        }
    }
}

/// Runtime knobs for a [`StepScheduler`].
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Maximum number of nodes admitted per super-step.
    pub max_parallel: usize,
    /// Consecutive failures before the resource router emits a hint.
    pub failure_threshold: u32,
    pub adaptation: AdaptationPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            failure_threshold: 2,
            adaptation: AdaptationPolicy::default(),
        }
    }
}

impl EngineOptions {
    pub fn from_config(cfg: &EngineSection) -> Self {
        Self {
            max_parallel: cfg.max_parallel,
            failure_threshold: cfg.failure_threshold,
            adaptation: AdaptationPolicy {
                enabled: cfg.adaptation.enabled,
                every_n_steps: cfg.adaptation.every_n_steps,
                min_completed: cfg.adaptation.min_completed,
            },
        }
    }
}

/// Progress notifications sent on the optional event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StepStarted { step: usize, admitted: Vec<NodeId> },
    NodeStarted { node: NodeId },
    NodeCompleted { node: NodeId },
    NodeFailed { node: NodeId, kind: FailureKind },
    RollbackExecuted { failed: NodeId, rollback: NodeId, success: bool },
    NodesSkipped { cause: NodeId, nodes: Vec<NodeId> },
    ConditionEvaluated { source: NodeId, target: NodeId, passed: bool },
    PlanAdapted { step: usize, changes: Vec<String> },
    CheckpointSaved { step: usize },
}

/// Final result of [`StepScheduler::run`].
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Number of super-steps executed (equals the checkpoint count).
    pub steps: usize,
    /// Results of COMPLETED leaf nodes in insertion order, separated by a
    /// blank line, or [`NO_OUTPUT_MESSAGE`].
    pub output: String,
    pub statuses: BTreeMap<NodeId, NodeStatus>,
    /// Descriptions of every applied adaptation change.
    pub adaptations: Vec<String>,
}

pub mod adapt;
pub mod scheduler;
pub mod step;

pub use adapt::{
    apply_operations, AdaptationPlan, AdaptationPolicy, AppliedAdaptations, PlanOperation,
};
pub use scheduler::StepScheduler;
pub use step::StepReport;
