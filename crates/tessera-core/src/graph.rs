//! Resource graph builder
//!
//! Turns declarations into a DAG. Edges come from explicit `depends_on`
//! entries and from references scanned out of attribute values; an edge
//! `from -> to` means `from` is applied after `to`.

use crate::error::{ConfigError, Result};
use crate::model::{Attributes, Declaration, Reference};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// "from must be applied after to"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
}

impl DependencyEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A resource in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub address: String,
    pub resource_type: String,
    /// Desired attributes, references still unresolved
    pub attributes: Attributes,
    /// References found in `attributes`
    pub references: Vec<Reference>,
    /// Explicit `depends_on` entries
    pub depends_on: Vec<String>,
}

/// Dependency graph of all declared resources
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: BTreeMap<String, ResourceNode>,
    /// Declaration order, for stable listing
    order: Vec<String>,
    edges: BTreeSet<DependencyEdge>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl ResourceGraph {
    /// Build and validate the graph
    ///
    /// Fails with `DuplicateAddress`, `UnresolvedReference` or `Cycle`.
    pub fn build(declarations: impl IntoIterator<Item = Declaration>) -> Result<Self> {
        let mut graph = ResourceGraph::default();

        for decl in declarations {
            if decl.address.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "resource of type '{}' has an empty address",
                    decl.resource_type
                )));
            }
            if graph.nodes.contains_key(&decl.address) {
                return Err(ConfigError::DuplicateAddress(decl.address));
            }

            let references = decl.references();
            let node = ResourceNode {
                address: decl.address.clone(),
                resource_type: decl.resource_type,
                attributes: decl.attributes,
                references,
                depends_on: decl.depends_on,
            };
            graph.order.push(decl.address.clone());
            graph.nodes.insert(decl.address, node);
        }

        for node in graph.nodes.values() {
            let targets = node
                .references
                .iter()
                .map(|r| r.address.as_str())
                .chain(node.depends_on.iter().map(String::as_str));

            for target in targets {
                if !graph.nodes.contains_key(target) {
                    return Err(ConfigError::UnresolvedReference {
                        from: node.address.clone(),
                        address: target.to_string(),
                    });
                }
                graph
                    .edges
                    .insert(DependencyEdge::new(node.address.as_str(), target));
            }
        }

        for edge in &graph.edges {
            graph
                .dependencies
                .entry(edge.from.clone())
                .or_default()
                .insert(edge.to.clone());
            graph
                .dependents
                .entry(edge.to.clone())
                .or_default()
                .insert(edge.from.clone());
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(ConfigError::Cycle(cycle));
        }

        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Built resource graph"
        );
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.nodes.contains_key(address)
    }

    pub fn node(&self, address: &str) -> Option<&ResourceNode> {
        self.nodes.get(address)
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.order.iter().filter_map(|a| self.nodes.get(a))
    }

    pub fn edges(&self) -> &BTreeSet<DependencyEdge> {
        &self.edges
    }

    /// Addresses `address` depends on, sorted
    pub fn dependencies(&self, address: &str) -> Vec<&str> {
        self.dependencies
            .get(address)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Addresses depending on `address`, sorted
    pub fn dependents(&self, address: &str) -> Vec<&str> {
        self.dependents
            .get(address)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Dependencies before dependents; ties broken by address
    pub fn topological_order(&self) -> Vec<&str> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for address in self.nodes.keys() {
            self.visit_post_order(address, &mut visited, &mut order);
        }
        order
    }

    fn visit_post_order<'a>(
        &'a self,
        address: &'a str,
        visited: &mut BTreeSet<&'a str>,
        order: &mut Vec<&'a str>,
    ) {
        if !visited.insert(address) {
            return;
        }
        if let Some(deps) = self.dependencies.get(address) {
            for dep in deps {
                self.visit_post_order(dep, visited, order);
            }
        }
        order.push(address);
    }

    /// Depth-first search for a cycle; returns its members with the first repeated at the end
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        fn visit<'a>(
            graph: &'a ResourceGraph,
            address: &'a str,
            marks: &mut BTreeMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(address) {
                Some(Mark::Done) => return None,
                Some(Mark::InProgress) => {
                    let start = path.iter().position(|a| *a == address).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|a| a.to_string()).collect();
                    cycle.push(address.to_string());
                    return Some(cycle);
                }
                None => {}
            }

            marks.insert(address, Mark::InProgress);
            path.push(address);
            if let Some(deps) = graph.dependencies.get(address) {
                for dep in deps {
                    if let Some(cycle) = visit(graph, dep, marks, path) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            marks.insert(address, Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        let mut path = Vec::new();
        for address in self.nodes.keys() {
            if let Some(cycle) = visit(self, address, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }
}
