//! Upward ranks and the priority list.

use crate::cost::{Agent, CostModel, mean_comm_cost, mean_compute_cost};
use crate::graph::TaskGraph;
use dropflow_core::error::Result;
use std::collections::HashMap;

/// Upward rank of every task.
///
/// `rank(t) = wbar(t) + max over successors s of (cbar(t, s) + rank(s))`,
/// evaluated in reverse topological order so deep graphs never recurse.
///
/// # Errors
///
/// [`CyclicGraph`](dropflow_core::DropflowError::CyclicGraph) when the
/// graph has a cycle.
pub fn upward_ranks(
    graph: &TaskGraph,
    agents: &[Agent],
    costs: &dyn CostModel,
) -> Result<HashMap<String, f64>> {
    let order = graph.toposort()?;
    let mut ranks: HashMap<String, f64> = HashMap::with_capacity(order.len());
    for &task in order.iter().rev() {
        let tail = graph
            .successors(task)
            .into_iter()
            .map(|s| mean_comm_cost(costs, task, s, agents) + ranks.get(s).copied().unwrap_or(0.0))
            .fold(0.0_f64, f64::max);
        ranks.insert(task.to_string(), mean_compute_cost(costs, task, agents) + tail);
    }
    Ok(ranks)
}

/// Tasks by descending rank; ties keep topological order.
///
/// Because every predecessor outranks its successors whenever costs are
/// non-negative, and ties fall back to topological position, each task
/// appears after all of its predecessors.
pub fn priority_list(graph: &TaskGraph, ranks: &HashMap<String, f64>) -> Result<Vec<String>> {
    let order = graph.toposort()?;
    let mut keyed: Vec<(usize, f64, &str)> = order
        .iter()
        .enumerate()
        .map(|(i, &t)| (i, ranks.get(t).copied().unwrap_or(0.0), t))
        .collect();
    keyed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(keyed.into_iter().map(|(_, _, t)| t.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uniform;

    impl CostModel for Uniform {
        fn compute_cost(&self, task: &str, _agent: &str) -> u64 {
            match task {
                "a" => 3,
                "b" => 2,
                "c" => 4,
                _ => 1,
            }
        }

        fn comm_cost(&self, _: &str, _: &str, x: &str, y: &str) -> u64 {
            if x == y { 0 } else { 10 }
        }
    }

    #[test]
    fn ranks_accumulate_along_longest_path() {
        // a -> b -> d, a -> c -> d
        let graph = TaskGraph::from_successors([
            ("a", vec!["b", "c"]),
            ("b", vec!["d"]),
            ("c", vec!["d"]),
            ("d", vec![]),
        ]);
        let agents = [Agent::new("x", 1), Agent::new("y", 1)];
        let ranks = upward_ranks(&graph, &agents, &Uniform).unwrap();
        assert_eq!(ranks["d"], 1.0);
        assert_eq!(ranks["b"], 2.0 + 10.0 + 1.0);
        assert_eq!(ranks["c"], 4.0 + 10.0 + 1.0);
        assert_eq!(ranks["a"], 3.0 + 10.0 + 15.0);

        let list = priority_list(&graph, &ranks).unwrap();
        assert_eq!(list, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn single_agent_ignores_communication() {
        let graph = TaskGraph::from_successors([("a", vec!["b"]), ("b", vec![])]);
        let ranks = upward_ranks(&graph, &[Agent::new("x", 1)], &Uniform).unwrap();
        assert_eq!(ranks["a"], 5.0);
    }

    #[test]
    fn equal_ranks_keep_insertion_order() {
        let graph = TaskGraph::from_successors([("p", vec![]), ("q", vec![]), ("r", vec![])]);
        let ranks = upward_ranks(&graph, &[Agent::new("x", 1)], &Uniform).unwrap();
        assert_eq!(priority_list(&graph, &ranks).unwrap(), vec!["p", "q", "r"]);
    }
}
