// src/dag/state.rs

//! Execution results and the checkpoint history of a run.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::dag::graph::TaskGraph;
use crate::dag::lifecycle::NodeStatus;
use crate::dag::node::NodeId;
use crate::errors::{EngineError, Result};

/// Owned store of per-node results plus the task context.
///
/// Only the scheduler writes to it, and only after a batch has fully
/// returned.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionState {
    pub task: String,
    context: String,
    results: BTreeMap<NodeId, String>,
    /// Keys written since the last [`begin_step`](Self::begin_step).
    #[serde(skip)]
    written_this_step: HashSet<NodeId>,
}

impl ExecutionState {
    pub fn new(task: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            context: context.into(),
            results: BTreeMap::new(),
            written_this_step: HashSet::new(),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn result(&self, id: &str) -> Option<&str> {
        self.results.get(id).map(String::as_str)
    }

    pub fn results(&self) -> &BTreeMap<NodeId, String> {
        &self.results
    }

    /// Open a new write window; each key may be written once per window.
    pub fn begin_step(&mut self) {
        self.written_this_step.clear();
    }

    /// Store `result` under `id`.
    ///
    /// A second write to the same key within one super-step is a
    /// [`EngineError::ResultConflict`]; the first value is kept.
    pub fn merge_result(&mut self, id: &str, result: impl Into<String>) -> Result<()> {
        if !self.written_this_step.insert(id.to_string()) {
            return Err(EngineError::ResultConflict(id.to_string()));
        }
        self.results.insert(id.to_string(), result.into());
        Ok(())
    }

    /// Drop a stored result; returns the removed value.
    pub fn remove_result(&mut self, id: &str) -> Option<String> {
        self.results.remove(id)
    }

    /// Append a paragraph to the shared context text.
    pub fn append_context(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if !self.context.is_empty() {
            self.context.push_str("\n\n");
        }
        self.context.push_str(text);
    }

    /// Context handed to a runner: the shared context followed by the
    /// stored results of the given dependencies.
    pub fn context_for(&self, deps: &[NodeId]) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.context.is_empty() {
            parts.push(self.context.clone());
        }
        for dep in deps {
            if let Some(result) = self.results.get(dep) {
                parts.push(format!("[Result of {dep}]:\n{result}"));
            }
        }
        parts.join("\n\n")
    }
}

/// Immutable snapshot taken after a super-step.
#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub step: usize,
    pub statuses: BTreeMap<NodeId, NodeStatus>,
    pub state: ExecutionState,
}

impl Checkpoint {
    pub fn capture(step: usize, graph: &TaskGraph, state: &ExecutionState) -> Self {
        Self {
            step,
            statuses: graph.statuses(),
            state: state.clone(),
        }
    }
}

/// Append-only checkpoint history.
#[derive(Debug, Clone, Default)]
pub struct CheckpointLog {
    entries: Vec<Checkpoint>,
}

impl CheckpointLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, checkpoint: Checkpoint) {
        self.entries.push(checkpoint);
    }

    pub fn latest(&self) -> Option<&Checkpoint> {
        self.entries.last()
    }

    pub fn get(&self, index: usize) -> Option<&Checkpoint> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.entries.iter()
    }
}
