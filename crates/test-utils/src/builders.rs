#![allow(dead_code)]

use std::collections::BTreeMap;

use taskdag::config::{
    EdgeConfig, EngineSection, NodeConfig, PlanFile, PlanSection, RawPlanFile,
};
use taskdag::dag::{Condition, Edge, Node, TaskGraph};
use taskdag::types::{EdgeKind, NodeKind, RiskLevel};

/// Builder for `TaskGraph` to simplify test setup.
///
/// Nodes are inserted in the order they are declared.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaf(mut self, id: &str) -> Self {
        self.nodes.push(Node::leaf(id, format!("do {id}")));
        self
    }

    pub fn leaves(mut self, ids: &[&str]) -> Self {
        for id in ids {
            self.nodes.push(Node::leaf(*id, format!("do {id}")));
        }
        self
    }

    pub fn group(mut self, id: &str) -> Self {
        self.nodes.push(Node::group(id, format!("group {id}")));
        self
    }

    /// Leaf node inside `parent`.
    pub fn child(mut self, id: &str, parent: &str) -> Self {
        self.nodes
            .push(Node::leaf(id, format!("do {id}")).with_parent(parent));
        self
    }

    /// Group node inside `parent`.
    pub fn child_group(mut self, id: &str, parent: &str) -> Self {
        self.nodes
            .push(Node::group(id, format!("group {id}")).with_parent(parent));
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn dep(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge::dependency(source, target));
        self
    }

    pub fn conditional(mut self, source: &str, target: &str, condition: Condition) -> Self {
        self.edges.push(Edge::conditional(source, target, condition));
        self
    }

    pub fn rollback(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge::rollback(source, target));
        self
    }

    pub fn build(self) -> TaskGraph {
        TaskGraph::with_nodes(self.nodes, self.edges).expect("Failed to build valid graph from builder")
    }
}

/// Builder for `RawPlanFile` / `PlanFile`.
pub struct PlanFileBuilder {
    plan: RawPlanFile,
}

impl PlanFileBuilder {
    pub fn new() -> Self {
        Self {
            plan: RawPlanFile {
                engine: EngineSection::default(),
                plan: PlanSection::default(),
                node: BTreeMap::new(),
                edge: Vec::new(),
            },
        }
    }

    pub fn task(mut self, task: &str) -> Self {
        self.plan.plan.task = task.to_string();
        self
    }

    pub fn context(mut self, context: &str) -> Self {
        self.plan.plan.context = context.to_string();
        self
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.plan.engine.max_parallel = n;
        self
    }

    pub fn with_node(mut self, id: &str, node: NodeConfig) -> Self {
        self.plan.node.insert(id.to_string(), node);
        self
    }

    pub fn with_edge(mut self, source: &str, target: &str, kind: EdgeKind) -> Self {
        self.plan.edge.push(EdgeConfig {
            source: source.to_string(),
            target: target.to_string(),
            kind,
            condition: None,
            condition_regex: None,
        });
        self
    }

    pub fn with_conditional(mut self, source: &str, target: &str, keyword: &str) -> Self {
        self.plan.edge.push(EdgeConfig {
            source: source.to_string(),
            target: target.to_string(),
            kind: EdgeKind::Conditional,
            condition: Some(keyword.to_string()),
            condition_regex: None,
        });
        self
    }

    pub fn raw(self) -> RawPlanFile {
        self.plan
    }

    pub fn build(self) -> PlanFile {
        PlanFile::try_from(self.plan).expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(description: &str) -> Self {
        Self {
            node: NodeConfig {
                kind: NodeKind::Leaf,
                description: description.to_string(),
                criteria: String::new(),
                validate: true,
                parent: None,
                after: vec![],
                confidence: None,
                risk: RiskLevel::Low,
                rollback_action: None,
            },
        }
    }

    pub fn group(mut self) -> Self {
        self.node.kind = NodeKind::Group;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.node.after.push(dep.to_string());
        self
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.node.parent = Some(parent.to_string());
        self
    }

    pub fn criteria(mut self, criteria: &str) -> Self {
        self.node.criteria = criteria.to_string();
        self
    }

    pub fn validate(mut self, val: bool) -> Self {
        self.node.validate = val;
        self
    }

    pub fn confidence(mut self, val: f64) -> Self {
        self.node.confidence = Some(val);
        self
    }

    pub fn risk(mut self, risk: RiskLevel) -> Self {
        self.node.risk = risk;
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}
