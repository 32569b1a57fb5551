//! Self-contained scheduling problems read from JSON.

use crate::cost::{Agent, CostModel};
use crate::graph::TaskGraph;
use crate::heft::HeftScheduler;
use crate::schedule::Schedule;
use crate::timeline::SlotPolicy;
use dropflow_core::error::{DropflowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Compute cost of a task, either the same everywhere or per agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskCost {
    /// Same on every agent.
    Uniform(u64),
    /// Keyed by agent id; agents not listed cost nothing.
    PerAgent(BTreeMap<String, u64>),
}

impl Default for TaskCost {
    fn default() -> Self {
        Self::Uniform(0)
    }
}

/// A task of a [`SchedulingProblem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDef {
    /// Task id.
    pub id: String,
    /// Compute cost.
    #[serde(default)]
    pub cost: TaskCost,
    /// Supply units occupied while running.
    #[serde(default = "default_demand")]
    pub demand: u32,
}

fn default_demand() -> u32 {
    1
}

/// A dependency of a [`SchedulingProblem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
    /// Upstream task.
    pub from: String,
    /// Downstream task.
    pub to: String,
    /// Transfer time when the tasks land on different agents.
    #[serde(default)]
    pub comm: u64,
}

/// Agents, tasks and dependencies in one document.
///
/// ```json
/// {
///   "agents": [{"id": "n0", "capacity": 2}, {"id": "n1", "capacity": [1, 1, 0, 2]}],
///   "tasks": [{"id": "a", "cost": 3}, {"id": "b", "cost": {"n0": 2, "n1": 5}, "demand": 2}],
///   "edges": [{"from": "a", "to": "b", "comm": 4}],
///   "policy": "deferred"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingProblem {
    /// Agents in preference order.
    pub agents: Vec<Agent>,
    /// Tasks in submission order.
    pub tasks: Vec<TaskDef>,
    /// Dependencies.
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
    /// Slot policy; the scheduler default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<SlotPolicy>,
}

impl SchedulingProblem {
    /// Parse a problem from JSON text and check its references.
    pub fn from_json(text: &str) -> Result<Self> {
        let problem: Self = serde_json::from_str(text)?;
        problem.validate()?;
        Ok(problem)
    }

    /// Reject duplicate ids and edges naming unknown tasks.
    pub fn validate(&self) -> Result<()> {
        let invalid = |cause: String| DropflowError::InvalidProblem { cause };
        let mut agents = HashSet::new();
        for agent in &self.agents {
            if !agents.insert(agent.id.as_str()) {
                return Err(invalid(format!("duplicate agent '{}'", agent.id)));
            }
        }
        let mut tasks = HashSet::new();
        for task in &self.tasks {
            if !tasks.insert(task.id.as_str()) {
                return Err(invalid(format!("duplicate task '{}'", task.id)));
            }
            if let TaskCost::PerAgent(costs) = &task.cost
                && let Some(agent) = costs.keys().find(|a| !agents.contains(a.as_str()))
            {
                return Err(invalid(format!(
                    "task '{}' has a cost for unknown agent '{agent}'",
                    task.id
                )));
            }
        }
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !tasks.contains(end.as_str()) {
                    return Err(invalid(format!(
                        "edge {} -> {} names unknown task '{end}'",
                        edge.from, edge.to
                    )));
                }
            }
        }
        Ok(())
    }

    /// Task graph in submission order.
    #[must_use]
    pub fn graph(&self) -> TaskGraph {
        let mut graph = TaskGraph::new();
        for task in &self.tasks {
            graph.add_task(&task.id);
        }
        for edge in &self.edges {
            graph.add_dependency(&edge.from, &edge.to);
        }
        graph
    }

    /// Schedule with the problem's policy, or `policy` when given.
    pub fn solve(&self, policy: Option<SlotPolicy>) -> Result<Schedule> {
        let policy = policy.or(self.policy).unwrap_or_default();
        let costs = ProblemCosts::new(self);
        HeftScheduler::new()
            .with_policy(policy)
            .schedule(&self.graph(), &self.agents, &costs)
    }
}

/// Lookup tables built once per solve.
struct ProblemCosts<'a> {
    tasks: HashMap<&'a str, &'a TaskDef>,
    comm: HashMap<&'a str, HashMap<&'a str, u64>>,
}

impl<'a> ProblemCosts<'a> {
    fn new(problem: &'a SchedulingProblem) -> Self {
        let mut comm: HashMap<&str, HashMap<&str, u64>> = HashMap::new();
        for e in &problem.edges {
            comm.entry(e.from.as_str())
                .or_default()
                .insert(e.to.as_str(), e.comm);
        }
        Self {
            tasks: problem.tasks.iter().map(|t| (t.id.as_str(), t)).collect(),
            comm,
        }
    }
}

impl CostModel for ProblemCosts<'_> {
    fn compute_cost(&self, task: &str, agent: &str) -> u64 {
        match self.tasks.get(task).map(|t| &t.cost) {
            Some(TaskCost::Uniform(c)) => *c,
            Some(TaskCost::PerAgent(costs)) => costs.get(agent).copied().unwrap_or(0),
            None => 0,
        }
    }

    fn comm_cost(&self, from: &str, to: &str, from_agent: &str, to_agent: &str) -> u64 {
        if from_agent == to_agent {
            return 0;
        }
        self.comm
            .get(from)
            .and_then(|m| m.get(to))
            .copied()
            .unwrap_or(0)
    }

    fn demand(&self, task: &str) -> u32 {
        self.tasks.get(task).map_or(1, |t| t.demand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_cost_forms() {
        let problem = SchedulingProblem::from_json(
            r#"{
                "agents": [{"id": "n0", "capacity": 2}, {"id": "n1", "capacity": [1, 0, 1]}],
                "tasks": [
                    {"id": "a", "cost": 3},
                    {"id": "b", "cost": {"n0": 2, "n1": 5}, "demand": 2}
                ],
                "edges": [{"from": "a", "to": "b", "comm": 4}],
                "policy": "deferred"
            }"#,
        )
        .unwrap();
        assert_eq!(problem.policy, Some(SlotPolicy::Deferred));
        assert_eq!(problem.tasks[0].demand, 1);
        let costs = ProblemCosts::new(&problem);
        assert_eq!(costs.compute_cost("b", "n1"), 5);
        assert_eq!(costs.comm_cost("a", "b", "n0", "n1"), 4);
        assert_eq!(costs.comm_cost("a", "b", "n0", "n0"), 0);
        assert_eq!(costs.demand("b"), 2);
    }

    #[test]
    fn unknown_edge_endpoint_is_rejected() {
        let err = SchedulingProblem::from_json(
            r#"{"agents": [{"id": "n0"}], "tasks": [{"id": "a"}], "edges": [{"from": "a", "to": "z"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DropflowError::InvalidProblem { .. }));
    }

    #[test]
    fn duplicate_tasks_are_rejected() {
        let err = SchedulingProblem::from_json(
            r#"{"agents": [{"id": "n0"}], "tasks": [{"id": "a"}, {"id": "a"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate task"));
    }

    #[test]
    fn solve_uses_override_policy() {
        let problem = SchedulingProblem::from_json(
            r#"{"agents": [{"id": "n0", "capacity": 1}],
                "tasks": [{"id": "a", "cost": 2}, {"id": "b", "cost": 3}]}"#,
        )
        .unwrap();
        assert!(problem.solve(None).is_err());
        let schedule = problem.solve(Some(SlotPolicy::Deferred)).unwrap();
        assert_eq!(schedule.makespan(), 5);
    }
}
