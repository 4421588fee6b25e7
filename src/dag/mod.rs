// src/dag/mod.rs

//! Task graph model.
//!
//! - [`graph`] holds nodes and edges and answers structural queries.
//! - [`lifecycle`] is the node status state machine.
//! - [`node`] and [`edge`] define the graph's elements.
//! - [`state`] stores results and checkpoints.
//! - [`state_manager`] runs the between-step status passes.

pub mod edge;
pub mod graph;
pub mod lifecycle;
pub mod node;
pub mod state;
pub mod state_manager;

pub use edge::{Condition, ConditionPredicate, Edge};
pub use graph::{NodePatch, TaskGraph};
pub use lifecycle::{NodeLifecycle, NodeStatus};
pub use node::{CompletionCriteria, Node, NodeId};
pub use state::{Checkpoint, CheckpointLog, ExecutionState};
pub use state_manager::{Settled, StateManager};
