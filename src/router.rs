// src/router.rs

//! Failure-tracking circuit breaker for resource selection.
//!
//! Runners report every resource call they make for a node. Once a
//! resource fails `threshold` times in a row for that node, [`hint`]
//! produces text steering the runner towards something else. Statistics
//! are kept per node; one node's failures never affect another's hint.
//!
//! [`hint`]: ResourceRouter::hint

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::dag::NodeId;

/// Shared handle passed to runners.
pub type RouterHandle = Arc<ResourceRouter>;

/// Call statistics for one (node, resource) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolStats {
    pub calls: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
}

impl ToolStats {
    /// Fraction of calls that succeeded; 1.0 before the first call.
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            return 1.0;
        }
        (self.calls - self.failures) as f64 / self.calls as f64
    }
}

type StatsTable = HashMap<NodeId, BTreeMap<String, ToolStats>>;

#[derive(Debug)]
pub struct ResourceRouter {
    threshold: u32,
    /// Registered resources, offered as alternatives.
    available: Vec<String>,
    stats: Mutex<StatsTable>,
}

impl Default for ResourceRouter {
    fn default() -> Self {
        Self::new(2)
    }
}

impl ResourceRouter {
    /// `threshold` is clamped to at least 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            available: Vec::new(),
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    // Counters stay consistent across a panic mid-update; poisoning is ignored.
    fn table(&self) -> MutexGuard<'_, StatsTable> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_success(&self, node: &str, resource: &str) {
        let mut table = self.table();
        let entry = table
            .entry(node.to_string())
            .or_default()
            .entry(resource.to_string())
            .or_default();
        entry.calls += 1;
        entry.consecutive_failures = 0;
        debug!(node = %node, resource = %resource, "resource call succeeded");
    }

    pub fn record_failure(&self, node: &str, resource: &str) {
        let mut table = self.table();
        let entry = table
            .entry(node.to_string())
            .or_default()
            .entry(resource.to_string())
            .or_default();
        entry.calls += 1;
        entry.failures += 1;
        entry.consecutive_failures += 1;

        if entry.consecutive_failures == self.threshold {
            warn!(
                node = %node,
                resource = %resource,
                consecutive = entry.consecutive_failures,
                "resource reached failure threshold"
            );
        } else {
            debug!(
                node = %node,
                resource = %resource,
                consecutive = entry.consecutive_failures,
                "resource call failed"
            );
        }
    }

    pub fn stats(&self, node: &str, resource: &str) -> Option<ToolStats> {
        self.table()
            .get(node)
            .and_then(|per_node| per_node.get(resource))
            .copied()
    }

    /// Resources of `node` at or past the threshold, sorted by name.
    pub fn failing_resources(&self, node: &str) -> Vec<String> {
        self.table()
            .get(node)
            .map(|per_node| {
                per_node
                    .iter()
                    .filter(|(_, s)| s.consecutive_failures >= self.threshold)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Candidate replacements for `node`'s failing resources: registered
    /// resources plus anything that has succeeded for any node, minus the
    /// resources currently failing for `node`.
    pub fn alternatives(&self, node: &str) -> Vec<String> {
        let table = self.table();
        let failing: BTreeSet<&str> = table
            .get(node)
            .map(|per_node| {
                per_node
                    .iter()
                    .filter(|(_, s)| s.consecutive_failures >= self.threshold)
                    .map(|(name, _)| name.as_str())
                    .collect()
            })
            .unwrap_or_default();

        let mut out: BTreeSet<&str> = self.available.iter().map(String::as_str).collect();
        for per_node in table.values() {
            for (name, stats) in per_node {
                if stats.calls > stats.failures {
                    out.insert(name.as_str());
                }
            }
        }

        out.into_iter()
            .filter(|name| !failing.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// Substitution hint for `node`, or `None` while no resource of it has
    /// reached the threshold.
    pub fn hint(&self, node: &str) -> Option<String> {
        let failing = self.failing_resources(node);
        if failing.is_empty() {
            return None;
        }
        let alternatives = self.alternatives(node);

        let lines: Vec<String> = failing
            .iter()
            .map(|resource| {
                let count = self
                    .stats(node, resource)
                    .map(|s| s.consecutive_failures)
                    .unwrap_or_default();
                let mut line = format!(
                    "Resource '{resource}' has failed {count} times consecutively. \
                     Try an alternative approach."
                );
                if !alternatives.is_empty() {
                    line.push_str(&format!(
                        " Available alternatives: {}.",
                        alternatives.join(", ")
                    ));
                }
                line
            })
            .collect();

        Some(lines.join("\n"))
    }

    /// Human-readable stats for one node, one resource per line.
    pub fn node_summary(&self, node: &str) -> String {
        let table = self.table();
        let Some(per_node) = table.get(node) else {
            return format!("{node}: no resource calls");
        };

        let mut lines = vec![format!("{node}:")];
        for (name, s) in per_node {
            lines.push(format!(
                "  {name}: {} calls, {} failures ({} consecutive), {:.0}% success",
                s.calls,
                s.failures,
                s.consecutive_failures,
                s.success_rate() * 100.0
            ));
        }
        lines.join("\n")
    }

    /// Forget all statistics of `node`.
    pub fn reset_node(&self, node: &str) {
        if self.table().remove(node).is_some() {
            debug!(node = %node, "resource stats reset");
        }
    }
}
