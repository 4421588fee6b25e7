// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::{EngineError, Result, StructuralViolation};
use crate::types::{EdgeKind, NodeKind};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = EngineError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_plan(&raw)?;
        Ok(PlanFile::new_unchecked(raw))
    }
}

fn validate_raw_plan(cfg: &RawPlanFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_engine_section(cfg)?;
    validate_nodes(cfg)?;
    validate_edges(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn config_error(msg: String) -> EngineError {
    EngineError::ConfigError(msg)
}

fn ensure_has_nodes(cfg: &RawPlanFile) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(config_error(
            "plan must contain at least one [node.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_section(cfg: &RawPlanFile) -> Result<()> {
    let engine = &cfg.engine;
    if engine.max_parallel == 0 {
        return Err(config_error(
            "[engine].max_parallel must be >= 1 (got 0)".to_string(),
        ));
    }
    if engine.failure_threshold == 0 {
        return Err(config_error(
            "[engine].failure_threshold must be >= 1 (got 0)".to_string(),
        ));
    }
    if engine.adaptation.every_n_steps == 0 {
        return Err(config_error(
            "[engine.adaptation].every_n_steps must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_nodes(cfg: &RawPlanFile) -> Result<()> {
    for (id, node) in cfg.node.iter() {
        if id.trim().is_empty() {
            return Err(config_error("node ids must not be empty".to_string()));
        }

        for dep in node.after.iter() {
            if !cfg.node.contains_key(dep) {
                return Err(config_error(format!(
                    "node '{id}' has unknown dependency '{dep}' in `after`"
                )));
            }
            if dep == id {
                return Err(config_error(format!(
                    "node '{id}' cannot depend on itself in `after`"
                )));
            }
        }

        if let Some(parent) = &node.parent {
            match cfg.node.get(parent) {
                None => {
                    return Err(StructuralViolation::MissingParent {
                        node: id.clone(),
                        parent: parent.clone(),
                    }
                    .into());
                }
                Some(p) if p.kind != NodeKind::Group => {
                    return Err(config_error(format!(
                        "node '{id}' has parent '{parent}', which is not a group"
                    )));
                }
                Some(_) if parent == id => {
                    return Err(config_error(format!("node '{id}' cannot be its own parent")));
                }
                Some(_) => {}
            }
        }

        if let Some(confidence) = node.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(config_error(format!(
                    "node '{id}' has confidence {confidence} outside 0..=1"
                )));
            }
        }
    }

    ensure_parent_chains_terminate(cfg)
}

fn ensure_parent_chains_terminate(cfg: &RawPlanFile) -> Result<()> {
    for id in cfg.node.keys() {
        let mut current = cfg.node.get(id).and_then(|n| n.parent.as_deref());
        let mut hops = 0usize;
        while let Some(parent) = current {
            hops += 1;
            if hops > cfg.node.len() {
                return Err(config_error(format!(
                    "parent chain of node '{id}' loops back on itself"
                )));
            }
            current = cfg.node.get(parent).and_then(|n| n.parent.as_deref());
        }
    }
    Ok(())
}

fn validate_edges(cfg: &RawPlanFile) -> Result<()> {
    for edge in cfg.edge.iter() {
        let label = format!("edge {} -> {}", edge.source, edge.target);

        for endpoint in [&edge.source, &edge.target] {
            if !cfg.node.contains_key(endpoint) {
                return Err(StructuralViolation::MissingEndpoint {
                    from: edge.source.clone(),
                    to: edge.target.clone(),
                    missing: endpoint.clone(),
                }
                .into());
            }
        }
        if edge.source == edge.target {
            return Err(config_error(format!("{label} is a self-loop")));
        }

        let has_condition = edge.condition.is_some() || edge.condition_regex.is_some();
        match edge.kind {
            EdgeKind::Conditional if !has_condition => {
                return Err(config_error(format!(
                    "{label} is conditional but has no `condition` or `condition_regex`"
                )));
            }
            EdgeKind::Conditional
                if edge.condition.is_some() && edge.condition_regex.is_some() =>
            {
                return Err(config_error(format!(
                    "{label} sets both `condition` and `condition_regex`"
                )));
            }
            EdgeKind::Dependency | EdgeKind::Rollback if has_condition => {
                return Err(config_error(format!(
                    "{label} is a {} edge and cannot carry a condition",
                    edge.kind
                )));
            }
            _ => {}
        }

        if let Some(pattern) = &edge.condition_regex {
            Regex::new(pattern).map_err(|e| {
                config_error(format!("{label} has invalid condition_regex: {e}"))
            })?;
        }

        if edge.kind == EdgeKind::Rollback {
            let target_is_group = cfg
                .node
                .get(&edge.target)
                .is_some_and(|n| n.kind == NodeKind::Group);
            if target_is_group {
                return Err(config_error(format!(
                    "{label}: rollback targets must be leaf nodes"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawPlanFile) -> Result<()> {
    // Edge direction follows execution order: for
    //   [node.b]
    //   after = ["a"]
    // we add a -> b. Explicit [[edge]] entries of every kind count.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in cfg.node.keys() {
        graph.add_node(id.as_str());
    }
    for (id, node) in cfg.node.iter() {
        for dep in node.after.iter() {
            graph.add_edge(dep.as_str(), id.as_str(), ());
        }
    }
    for edge in cfg.edge.iter() {
        graph.add_edge(edge.source.as_str(), edge.target.as_str(), ());
    }

    // Children inherit the gates of every ancestor, and a group only
    // finishes after its children. A group that waits on its own
    // descendant becomes a cycle here instead of a stuck run.
    for (id, node) in cfg.node.iter() {
        if let Some(parent) = node.parent.as_deref() {
            graph.add_edge(id.as_str(), parent, ());
        }
        let mut ancestor = node.parent.as_deref();
        while let Some(group) = ancestor {
            for source in gating_sources(cfg, group) {
                graph.add_edge(source, id.as_str(), ());
            }
            ancestor = cfg.node.get(group).and_then(|n| n.parent.as_deref());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(StructuralViolation::CycleDetected(format!(
            "plan graph has a cycle involving node '{}'",
            cycle.node_id()
        ))
        .into()),
    }
}

fn gating_sources<'a>(cfg: &'a RawPlanFile, id: &str) -> Vec<&'a str> {
    let mut sources: Vec<&str> = cfg
        .node
        .get(id)
        .map(|n| n.after.iter().map(String::as_str).collect())
        .unwrap_or_default();
    sources.extend(
        cfg.edge
            .iter()
            .filter(|e| e.target == id && e.kind != EdgeKind::Rollback)
            .map(|e| e.source.as_str()),
    );
    sources
}
