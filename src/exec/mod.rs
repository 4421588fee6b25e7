// src/exec/mod.rs

//! Node execution layer.
//!
//! - [`backend`] defines the runner, validator and adapter traits the
//!   scheduler is generic over.
//! - [`task_runner`] runs and logs a single node.
//! - [`executor_loop`] fans a batch out under a semaphore and joins it.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{
    BoxFuture, NodeInput, NodeRunner, NodeValidator, PassThroughValidator, PlanAdapter,
};
pub use executor_loop::run_batch;
