// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::logging::LogLevel;
use crate::types::{EdgeKind, NodeKind, RiskLevel};

/// Plan file as read from TOML, before validation.
///
/// ```toml
/// [engine]
/// max_parallel = 2
///
/// [plan]
/// task = "Summarise the quarterly report"
///
/// [node.fetch]
/// description = "Fetch the report"
///
/// [node.summarise]
/// description = "Write the summary"
/// after = ["fetch"]
///
/// [[edge]]
/// source = "fetch"
/// target = "deep_dive"
/// kind = "conditional"
/// condition = "anomaly"
/// ```
///
/// All sections are optional at parse time; [`PlanFile`]'s `TryFrom`
/// enforces the rest.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlanFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub plan: PlanSection,

    /// Keys are node ids.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,

    #[serde(default)]
    pub edge: Vec<EdgeConfig>,
}

/// A validated plan file. Only obtainable through
/// `PlanFile::try_from(RawPlanFile)`.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub engine: EngineSection,
    pub plan: PlanSection,
    pub node: BTreeMap<String, NodeConfig>,
    pub edge: Vec<EdgeConfig>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(raw: RawPlanFile) -> Self {
        Self {
            engine: raw.engine,
            plan: raw.plan,
            node: raw.node,
            edge: raw.edge,
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Consecutive resource failures before the router emits a hint.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default)]
    pub log_level: Option<LogLevel>,

    #[serde(default)]
    pub adaptation: AdaptationSection,
}

fn default_max_parallel() -> usize {
    3
}

fn default_failure_threshold() -> u32 {
    2
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            failure_threshold: default_failure_threshold(),
            log_level: None,
            adaptation: AdaptationSection::default(),
        }
    }
}

/// `[engine.adaptation]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AdaptationSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_every_n_steps")]
    pub every_n_steps: usize,

    #[serde(default = "default_min_completed")]
    pub min_completed: usize,
}

fn default_true() -> bool {
    true
}

fn default_every_n_steps() -> usize {
    1
}

fn default_min_completed() -> usize {
    1
}

impl Default for AdaptationSection {
    fn default() -> Self {
        Self {
            enabled: true,
            every_n_steps: default_every_n_steps(),
            min_completed: default_min_completed(),
        }
    }
}

/// `[plan]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanSection {
    #[serde(default)]
    pub task: String,

    /// Seed context handed to every node.
    #[serde(default)]
    pub context: String,
}

/// `[node.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub kind: NodeKind,

    #[serde(default)]
    pub description: String,

    /// Completion criteria handed to the validator.
    #[serde(default)]
    pub criteria: String,

    /// When false the validator is skipped for this node.
    #[serde(default = "default_true")]
    pub validate: bool,

    /// Enclosing group.
    #[serde(default)]
    pub parent: Option<String>,

    /// Dependency list: this node waits for every node listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub confidence: Option<f64>,

    #[serde(default)]
    pub risk: RiskLevel,

    #[serde(default)]
    pub rollback_action: Option<String>,
}

/// `[[edge]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    pub source: String,
    pub target: String,

    #[serde(default)]
    pub kind: EdgeKind,

    /// Case-insensitive keyword; conditional edges only.
    #[serde(default)]
    pub condition: Option<String>,

    /// Regular expression; conditional edges only.
    #[serde(default)]
    pub condition_regex: Option<String>,
}
