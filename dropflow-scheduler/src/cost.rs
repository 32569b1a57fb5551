//! Agents, capacities and the cost model.

use dropflow_core::error::{DropflowError, Result};
use serde::{Deserialize, Serialize};

/// Units of supply an agent offers over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Capacity {
    /// The same supply at every timestep.
    Constant(u32),
    /// Supply per timestep; the last value holds from then on.
    Profile(Vec<u32>),
}

impl Capacity {
    /// Supply at timestep `t`.
    #[must_use]
    pub fn at(&self, t: u64) -> u32 {
        match self {
            Self::Constant(c) => *c,
            Self::Profile(p) => {
                let i = usize::try_from(t).unwrap_or(usize::MAX).min(p.len().saturating_sub(1));
                p.get(i).copied().unwrap_or(0)
            }
        }
    }

    /// Timesteps in `(from, to)` where the supply changes.
    pub(crate) fn change_points(&self, from: u64, to: u64) -> Vec<u64> {
        let Self::Profile(p) = self else {
            return Vec::new();
        };
        (1..p.len())
            .filter(|&i| p[i] != p[i - 1])
            .map(|i| i as u64)
            .filter(|&t| t > from && t < to)
            .collect()
    }

    /// Largest supply the agent ever offers.
    #[must_use]
    pub fn peak(&self) -> u32 {
        match self {
            Self::Constant(c) => *c,
            Self::Profile(p) => p.iter().copied().max().unwrap_or(0),
        }
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self::Constant(1)
    }
}

/// A resource unit tasks are placed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Identifier, unique among agents.
    pub id: String,
    /// Supply over time.
    #[serde(default)]
    pub capacity: Capacity,
}

impl Agent {
    /// An agent with constant supply.
    pub fn new(id: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            capacity: Capacity::Constant(capacity),
        }
    }

    /// An agent whose supply varies per timestep.
    pub fn with_profile(id: impl Into<String>, profile: Vec<u32>) -> Self {
        Self {
            id: id.into(),
            capacity: Capacity::Profile(profile),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Capacity::Profile(p) = &self.capacity
            && p.is_empty()
        {
            return Err(DropflowError::InvalidProblem {
                cause: format!("agent '{}' has an empty capacity profile", self.id),
            });
        }
        Ok(())
    }
}

/// Costs the scheduler optimizes against.
pub trait CostModel {
    /// Time `task` takes on `agent`.
    fn compute_cost(&self, task: &str, agent: &str) -> u64;

    /// Time to move `from`'s output to `to` when they run on the given agents.
    fn comm_cost(&self, from: &str, to: &str, from_agent: &str, to_agent: &str) -> u64;

    /// Supply units `task` occupies while running.
    fn demand(&self, _task: &str) -> u32 {
        1
    }
}

/// Mean compute cost of `task` over every agent.
pub(crate) fn mean_compute_cost(costs: &dyn CostModel, task: &str, agents: &[Agent]) -> f64 {
    if agents.is_empty() {
        return 0.0;
    }
    let total: f64 = agents
        .iter()
        .map(|a| costs.compute_cost(task, &a.id) as f64)
        .sum();
    total / agents.len() as f64
}

/// Mean cost of the `from -> to` transfer over every ordered pair of
/// distinct agents; zero with a single agent.
pub(crate) fn mean_comm_cost(costs: &dyn CostModel, from: &str, to: &str, agents: &[Agent]) -> f64 {
    let n = agents.len();
    if n < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for a in agents {
        for b in agents {
            if a.id != b.id {
                total += costs.comm_cost(from, to, &a.id, &b.id) as f64;
            }
        }
    }
    total / (n * (n - 1)) as f64
}
