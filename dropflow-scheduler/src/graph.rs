//! Task DAG.

use dropflow_core::error::{DropflowError, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, VecDeque};

/// A directed graph of tasks; an edge `a -> b` means `b` needs `a`'s output.
///
/// Node indices follow insertion order, which is also the tie-break used
/// by [`toposort`](Self::toposort).
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a successor map, `{task: [tasks that follow it]}`.
    ///
    /// Tasks are inserted in key order, then successors in list order.
    pub fn from_successors<'a, I, S>(succ: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, S)>,
        S: IntoIterator<Item = &'a str>,
    {
        let mut graph = Self::new();
        for (task, next) in succ {
            graph.add_task(task);
            for n in next {
                graph.add_dependency(task, n);
            }
        }
        graph
    }

    /// Add a task. Adding it again is a no-op.
    pub fn add_task(&mut self, task: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(task) {
            return idx;
        }
        let idx = self.graph.add_node(task.to_string());
        self.index.insert(task.to_string(), idx);
        idx
    }

    /// Add `from -> to`, adding either task if needed.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let f = self.add_task(from);
        let t = self.add_task(to);
        if self.graph.find_edge(f, t).is_none() {
            self.graph.add_edge(f, t, ());
        }
    }

    /// Number of tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Whether `task` is in the graph.
    #[must_use]
    pub fn contains(&self, task: &str) -> bool {
        self.index.contains_key(task)
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|i| self.graph[i].as_str())
    }

    /// Tasks that `task` depends on, in insertion order.
    #[must_use]
    pub fn predecessors(&self, task: &str) -> Vec<&str> {
        self.neighbors(task, Direction::Incoming)
    }

    /// Tasks that depend on `task`, in insertion order.
    #[must_use]
    pub fn successors(&self, task: &str) -> Vec<&str> {
        self.neighbors(task, Direction::Outgoing)
    }

    fn neighbors(&self, task: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(task) else {
            return Vec::new();
        };
        let mut n: Vec<NodeIndex> = self.graph.neighbors_directed(idx, dir).collect();
        n.sort_unstable();
        n.into_iter().map(|i| self.graph[i].as_str()).collect()
    }

    /// Kahn's algorithm, ready tasks taken in insertion order.
    ///
    /// # Errors
    ///
    /// [`DropflowError::CyclicGraph`] naming the first task on a cycle.
    pub fn toposort(&self) -> Result<Vec<&str>> {
        let count = self.graph.node_count();
        let mut in_degree = vec![0usize; count];
        for edge in self.graph.edge_references() {
            in_degree[edge.target().index()] += 1;
        }

        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|i| in_degree[i.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(count);

        while let Some(idx) = queue.pop_front() {
            order.push(self.graph[idx].as_str());
            let mut next: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(idx, Direction::Outgoing)
                .collect();
            next.sort_unstable();
            for n in next {
                in_degree[n.index()] -= 1;
                if in_degree[n.index()] == 0 {
                    queue.push_back(n);
                }
            }
        }

        if order.len() != count {
            let task = self
                .graph
                .node_indices()
                .find(|i| in_degree[i.index()] > 0)
                .map_or_else(|| "unknown".to_string(), |i| self.graph[i].clone());
            return Err(DropflowError::CyclicGraph { task });
        }
        Ok(order)
    }
}
