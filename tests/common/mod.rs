#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

pub use taskdag_test_utils::builders;
pub use taskdag_test_utils::fake_runner;
pub use taskdag_test_utils::{init_tracing, with_timeout};

use taskdag::dag::{ExecutionState, TaskGraph};
use taskdag::engine::{AdaptationPolicy, EngineOptions, StepScheduler};
use taskdag_test_utils::fake_runner::ScriptedRunner;

/// Write `contents` to `Taskdag.toml` inside a fresh temp dir.
///
/// Keep the returned `TempDir` alive for as long as the path is used.
pub fn write_plan(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("Taskdag.toml");
    fs::write(&path, contents).expect("write plan file");
    (dir, path)
}

/// Options with the given batch cap and adaptation switched off.
pub fn options(max_parallel: usize) -> EngineOptions {
    EngineOptions {
        max_parallel,
        adaptation: AdaptationPolicy::disabled(),
        ..EngineOptions::default()
    }
}

pub fn scheduler(
    graph: TaskGraph,
    runner: ScriptedRunner,
    max_parallel: usize,
) -> StepScheduler<ScriptedRunner> {
    StepScheduler::new(
        graph,
        ExecutionState::new("test task", ""),
        options(max_parallel),
        runner,
    )
}
