// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use tracing::debug;

use crate::errors::{PipelineError, Result};
use crate::types::TaskName;

/// In-memory DAG of task names.
///
/// Edge direction is prerequisite -> dependent: for a task `B` declaring
/// `after = ["A"]` the graph holds `A -> B`.
///
/// Node indices double as insertion order. Nodes are only ever removed when
/// rolling back the node that was added last, so indices never get
/// compacted and ordering stays stable.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<TaskName, ()>,
    index: HashMap<TaskName, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; no-op if it already exists.
    pub fn add_node(&mut self, name: &str) {
        self.ensure_node(name);
    }

    /// Add a single edge `from -> to` and verify the graph stays acyclic.
    ///
    /// Both nodes must already exist. A cycle-creating edge is removed again
    /// before returning `CycleDetected`.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        let edge = self.insert_edge(from, to)?;

        if !self.is_acyclic() {
            if let Some(edge) = edge {
                self.graph.remove_edge(edge);
            }
            return Err(PipelineError::CycleDetected(format!(
                "edge '{from}' -> '{to}' would close a cycle"
            )));
        }

        Ok(())
    }

    /// Add `name` plus one edge per prerequisite, all or nothing.
    ///
    /// On `UnknownDependency` or `CycleDetected` every edge added by this
    /// call is removed, and the node too if this call created it.
    pub fn add_task_with_dependencies(&mut self, name: &str, deps: &[TaskName]) -> Result<()> {
        let (node, created) = self.ensure_node(name);
        let mut added: Vec<EdgeIndex> = Vec::new();

        for dep in deps {
            match self.insert_edge(dep, name) {
                Ok(Some(edge)) => added.push(edge),
                Ok(None) => {}
                Err(err) => {
                    self.rollback(node, created, added);
                    return Err(match err {
                        PipelineError::UnknownDependency { dependency, .. } => {
                            PipelineError::UnknownDependency {
                                task: name.to_string(),
                                dependency,
                            }
                        }
                        other => other,
                    });
                }
            }
        }

        if let Err(cycle) = toposort(&self.graph, None) {
            let culprit = self.graph[cycle.node_id()].clone();
            self.rollback(node, created, added);
            return Err(PipelineError::CycleDetected(format!(
                "adding task '{name}' would create a cycle involving task '{culprit}'"
            )));
        }

        debug!(task = %name, deps = ?deps, "task added to dependency graph");
        Ok(())
    }

    /// Deterministic topological order.
    ///
    /// Kahn's algorithm; among nodes that are ready at the same time, the one
    /// inserted first comes first.
    pub fn topological_order(&self) -> Result<Vec<TaskName>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.edges_directed(n, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(Reverse(idx)) = ready.pop() {
            let node = NodeIndex::new(idx);
            order.push(self.graph[node].clone());

            for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = &mut in_degree[dependent.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependent.index()));
                }
            }
        }

        if order.len() != self.graph.node_count() {
            let stuck: Vec<&str> = self
                .graph
                .node_indices()
                .filter(|n| in_degree[n.index()] > 0)
                .map(|n| self.graph[n].as_str())
                .collect();
            return Err(PipelineError::CycleDetected(format!(
                "tasks never became ready: {}",
                stuck.join(", ")
            )));
        }

        Ok(order)
    }

    /// DFS-based check (`petgraph::algo::toposort`), O(nodes + edges).
    /// Self loops count as cycles.
    pub fn is_acyclic(&self) -> bool {
        toposort(&self.graph, None).is_ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All task names in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|n| self.graph[n].as_str())
    }

    /// Tasks without prerequisites, in insertion order.
    pub fn roots(&self) -> Vec<TaskName> {
        self.graph
            .node_indices()
            .filter(|n| {
                self.graph
                    .neighbors_directed(*n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Immediate prerequisites of a task, in insertion order.
    pub fn dependencies_of(&self, name: &str) -> Vec<TaskName> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Immediate dependents of a task, in insertion order.
    pub fn dependents_of(&self, name: &str) -> Vec<TaskName> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<TaskName> {
        let Some(&node) = self.index.get(name) else {
            return Vec::new();
        };

        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(node, direction).collect();
        found.sort();
        found.dedup();
        found.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    fn ensure_node(&mut self, name: &str) -> (NodeIndex, bool) {
        if let Some(&node) = self.index.get(name) {
            return (node, false);
        }
        let node = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), node);
        (node, true)
    }

    /// Add `from -> to` without the acyclicity check.
    ///
    /// Returns `None` when the edge already existed.
    fn insert_edge(&mut self, from: &str, to: &str) -> Result<Option<EdgeIndex>> {
        let from_node = *self
            .index
            .get(from)
            .ok_or_else(|| PipelineError::UnknownDependency {
                task: to.to_string(),
                dependency: from.to_string(),
            })?;
        let to_node = *self
            .index
            .get(to)
            .ok_or_else(|| PipelineError::UnknownDependency {
                task: from.to_string(),
                dependency: to.to_string(),
            })?;

        if self.graph.find_edge(from_node, to_node).is_some() {
            return Ok(None);
        }
        Ok(Some(self.graph.add_edge(from_node, to_node, ())))
    }

    /// Undo a partial `add_task_with_dependencies`.
    ///
    /// Edges are removed newest first so each removal hits the last edge slot
    /// and no surviving edge index moves.
    fn rollback(&mut self, node: NodeIndex, created: bool, added: Vec<EdgeIndex>) {
        for edge in added.into_iter().rev() {
            self.graph.remove_edge(edge);
        }
        if created {
            if let Some(name) = self.graph.remove_node(node) {
                self.index.remove(&name);
            }
        }
        debug!(
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "rolled back rejected task"
        );
    }
}
