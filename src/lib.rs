// src/lib.rs

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod router;
pub mod types;

use std::path::Path;

use tracing::{debug, info};

use crate::config::loader::load_and_validate;
use crate::dag::{ExecutionState, TaskGraph};
use crate::engine::{EngineOptions, RunReport, StepScheduler};
use crate::errors::Result;
use crate::exec::NodeRunner;

pub use crate::errors::EngineError;

/// High-level entry point: run the plan stored at `path` with `runner`.
///
/// This wires together:
/// - plan loading and validation
/// - graph construction
/// - engine options from `[engine]`
/// - the super-step scheduler, run to completion
///
/// A set `[engine].log_level` installs a stderr subscriber at that level.
/// If the process already has a subscriber it is kept and the level is
/// ignored.
pub async fn run_plan<R>(path: impl AsRef<Path>, runner: R) -> Result<RunReport>
where
    R: NodeRunner + 'static,
{
    let path = path.as_ref();
    let plan = load_and_validate(path)?;
    if let Some(level) = plan.engine.log_level {
        if let Err(e) = logging::init_logging(Some(level)) {
            debug!(error = %e, "keeping existing logging subscriber");
        }
    }
    info!(path = %path.display(), nodes = plan.node.len(), "plan loaded");

    let graph = TaskGraph::from_plan(&plan)?;
    let state = ExecutionState::new(plan.plan.task.clone(), plan.plan.context.clone());
    let options = EngineOptions::from_config(&plan.engine);
    debug!(?options, "engine options");

    let mut scheduler = StepScheduler::new(graph, state, options, runner);
    scheduler.run().await
}
