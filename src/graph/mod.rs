//! Dependency graph of a resolution model.
//!
//! Nodes are the true package variables of a model. There is an edge
//! `u -> v` ("u depends on v") whenever one of `u`'s required capabilities
//! is among `v`'s interfaces. The graph must be acyclic; it is processed in
//! *generations*, each containing the nodes whose dependencies all live in
//! earlier generations.

use crate::core::{PpError, scoped};
use crate::models::PackageDetail;
use crate::repository::Repository;
use anyhow::Result;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

const DOT_COLORS: &[&str] = &["lightblue", "lightgreen", "lightsalmon", "khaki", "plum", "lightgray"];

/// One package of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Package variable
    pub package: String,
    /// Index of the repository the package comes from
    pub repository: usize,
    /// Detail published by that repository
    pub detail: PackageDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// An acyclic package dependency graph.
#[derive(Debug, Clone, Default)]
pub struct PackageGraph {
    graph: DiGraph<GraphNode, ()>,
    index: BTreeMap<String, NodeIndex>,
    repository_names: Vec<String>,
}

impl PackageGraph {
    /// Looks up every package of `model` and links them by capability.
    ///
    /// # Errors
    ///
    /// [`PpError::InvariantViolation`] if no repository knows a package,
    /// [`PpError::CircularDependency`] if the packages depend on each other
    /// in a cycle.
    pub async fn build(
        repositories: &[Repository],
        translated_options: &[serde_json::Value],
        model: &BTreeSet<String>,
    ) -> Result<Self> {
        let nodes = scoped(model.iter().map(|package| async move {
            let details = scoped(repositories.iter().enumerate().map(|(index, repository)| {
                let options = translated_options.get(index).unwrap_or(&serde_json::Value::Null);
                repository.get_package_detail(options, package)
            }))
            .await?;

            let (repository, detail) = details
                .into_iter()
                .enumerate()
                .find_map(|(index, detail)| detail.map(|detail| (index, detail)))
                .ok_or_else(|| PpError::InvariantViolation {
                    message: format!("no repository has details for selected package '{package}'"),
                })?;

            Ok(GraphNode {
                package: package.clone(),
                repository,
                detail,
            })
        }))
        .await?;

        let names = repositories.iter().map(|r| r.name().to_string()).collect();
        let graph = Self::from_nodes(nodes, names)?;
        tracing::debug!(
            target: "graph",
            "Built graph with {} packages and {} edges",
            graph.len(),
            graph.graph.edge_count()
        );
        Ok(graph)
    }

    /// Links `nodes` by capability and rejects cycles.
    pub fn from_nodes(nodes: Vec<GraphNode>, repository_names: Vec<String>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = BTreeMap::new();
        let mut providers: HashMap<String, Vec<NodeIndex>> = HashMap::new();

        for node in nodes {
            let package = node.package.clone();
            let interfaces = node.detail.interfaces.clone();
            let idx = graph.add_node(node);
            index.insert(package, idx);
            for interface in interfaces {
                providers.entry(interface).or_default().push(idx);
            }
        }

        for from in graph.node_indices().collect::<Vec<_>>() {
            let mut targets: BTreeSet<NodeIndex> = BTreeSet::new();
            for dependency in &graph[from].detail.dependencies {
                if let Some(providers) = providers.get(dependency) {
                    targets.extend(providers.iter().copied().filter(|to| *to != from));
                }
            }
            for to in targets {
                graph.add_edge(from, to, ());
            }
        }

        let graph = Self {
            graph,
            index,
            repository_names,
        };
        graph.detect_cycles()?;
        Ok(graph)
    }

    fn detect_cycles(&self) -> Result<()> {
        let mut colors = vec![Color::White; self.graph.node_count()];
        let mut path = Vec::new();

        for start in self.index.values().copied() {
            if colors[start.index()] == Color::White
                && let Some(cycle) = self.visit(start, &mut colors, &mut path)
            {
                return Err(PpError::CircularDependency {
                    chain: cycle.join(" -> "),
                }
                .into());
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        node: NodeIndex,
        colors: &mut [Color],
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        colors[node.index()] = Color::Gray;
        path.push(node);

        for next in self.dependencies(node) {
            match colors[next.index()] {
                Color::Gray => {
                    let start = path.iter().position(|n| *n == next).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|n| self.graph[*n].package.clone()).collect();
                    cycle.push(self.graph[next].package.clone());
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = self.visit(next, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        path.pop();
        colors[node.index()] = Color::Black;
        None
    }

    /// Number of packages.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no packages.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// The node at `idx`.
    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    /// Index of `package`.
    pub fn find(&self, package: &str) -> Option<NodeIndex> {
        self.index.get(package).copied()
    }

    /// All nodes in package order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &GraphNode)> {
        self.index.values().map(|idx| (*idx, &self.graph[*idx]))
    }

    /// Direct dependencies of `idx`, in package order.
    pub fn dependencies(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut dependencies: Vec<_> = self.graph.neighbors_directed(idx, Direction::Outgoing).collect();
        dependencies.sort_by(|a, b| self.graph[*a].package.cmp(&self.graph[*b].package));
        dependencies.dedup();
        dependencies
    }

    /// Nodes grouped into dependency-first generations.
    ///
    /// Every dependency of a node is in a strictly earlier generation.
    /// Generations are sorted by package name.
    pub fn generations(&self) -> Vec<Vec<NodeIndex>> {
        let mut remaining: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.dependencies(idx).len()))
            .collect();

        let mut current: Vec<NodeIndex> =
            remaining.iter().filter(|(_, count)| **count == 0).map(|(idx, _)| *idx).collect();
        let mut generations = Vec::new();

        while !current.is_empty() {
            current.sort_by(|a, b| self.graph[*a].package.cmp(&self.graph[*b].package));
            let mut next = BTreeSet::new();
            for idx in &current {
                remaining.remove(idx);
                for dependent in self.graph.neighbors_directed(*idx, Direction::Incoming) {
                    if let Some(count) = remaining.get_mut(&dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.insert(dependent);
                        }
                    }
                }
            }
            generations.push(std::mem::take(&mut current));
            current = next.into_iter().collect();
        }
        generations
    }

    /// Graphviz rendering, one fill colour per repository.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph {\n    node [style=filled];\n");
        for (idx, node) in self.nodes() {
            let color = DOT_COLORS[node.repository % DOT_COLORS.len()];
            let repository =
                self.repository_names.get(node.repository).map(String::as_str).unwrap_or_default();
            let _ = writeln!(
                dot,
                "    n{} [label=\"{}\", tooltip=\"{}\", fillcolor={}];",
                idx.index(),
                escape(&node.package),
                escape(repository),
                color
            );
        }
        for (idx, _) in self.nodes() {
            for dependency in self.dependencies(idx) {
                let _ = writeln!(dot, "    n{} -> n{};", idx.index(), dependency.index());
            }
        }
        dot.push_str("}\n");
        dot
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
