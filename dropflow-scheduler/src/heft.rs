//! The list scheduler.

use crate::cost::{Agent, CostModel};
use crate::graph::TaskGraph;
use crate::rank::{priority_list, upward_ranks};
use crate::schedule::{Event, Schedule};
use crate::timeline::{SlotPolicy, Timeline};
use dropflow_core::error::{DropflowError, Result};
use std::collections::HashMap;
use tracing::{debug, info};

/// Heterogeneous-earliest-finish-time scheduler over capacity-bounded agents.
///
/// Tasks are taken by descending upward rank and each goes to the agent
/// where it finishes first. Under [`SlotPolicy::DagPreserving`] a task
/// starts exactly when its inputs arrive; an agent without enough free
/// supply at that instant is not a candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeftScheduler {
    policy: SlotPolicy,
}

struct Placement<'a> {
    agent: &'a str,
    start: u64,
    end: u64,
}

impl HeftScheduler {
    /// A scheduler with the default slot policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the slot policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SlotPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Configured slot policy.
    #[must_use]
    pub fn policy(&self) -> SlotPolicy {
        self.policy
    }

    /// Place every task of `graph` on one of `agents`.
    ///
    /// # Errors
    ///
    /// - [`DropflowError::NoAgents`] with an empty agent set
    /// - [`DropflowError::InvalidProblem`] for malformed agents
    /// - [`DropflowError::CyclicGraph`] when the graph has a cycle
    /// - [`DropflowError::CapacityOverflow`] when no agent can host a task
    pub fn schedule(
        &self,
        graph: &TaskGraph,
        agents: &[Agent],
        costs: &dyn CostModel,
    ) -> Result<Schedule> {
        if agents.is_empty() {
            return Err(DropflowError::NoAgents);
        }
        for agent in agents {
            agent.validate()?;
        }

        let ranks = upward_ranks(graph, agents, costs)?;
        let tasks = priority_list(graph, &ranks)?;
        debug!(
            tasks = tasks.len(),
            agents = agents.len(),
            policy = %self.policy,
            "Ranked tasks"
        );

        let mut timelines: Vec<Timeline> = agents
            .iter()
            .map(|a| Timeline::new(a.capacity.clone()))
            .collect();
        let mut schedule = Schedule::default();
        for agent in agents {
            schedule.orders.entry(agent.id.clone()).or_default();
        }
        let mut finished: HashMap<String, (usize, u64)> = HashMap::with_capacity(tasks.len());

        for task in &tasks {
            let preds = graph.predecessors(task);
            let demand = costs.demand(task);
            let mut best: Option<(usize, Placement<'_>)> = None;
            let mut earliest_ready = u64::MAX;

            for (i, agent) in agents.iter().enumerate() {
                let ready = preds
                    .iter()
                    .filter_map(|p| finished.get(*p).map(|&(on, end)| (p, on, end)))
                    .map(|(p, on, end)| {
                        end.saturating_add(costs.comm_cost(p, task, &agents[on].id, &agent.id))
                    })
                    .max()
                    .unwrap_or(0);
                earliest_ready = earliest_ready.min(ready);

                let duration = costs.compute_cost(task, &agent.id);
                let Some(start) = timelines[i].find_slot(ready, duration, demand, self.policy)
                else {
                    continue;
                };
                let end = start.saturating_add(duration);
                if best.as_ref().is_none_or(|(_, b)| end < b.end) {
                    best = Some((
                        i,
                        Placement {
                            agent: &agent.id,
                            start,
                            end,
                        },
                    ));
                }
            }

            let Some((i, placement)) = best else {
                return Err(DropflowError::CapacityOverflow {
                    task: task.clone(),
                    demand,
                    ready: earliest_ready,
                });
            };
            debug!(
                task = %task,
                agent = placement.agent,
                start = placement.start,
                end = placement.end,
                "Placed task"
            );
            timelines[i].reserve(placement.start, placement.end, demand);
            finished.insert(task.clone(), (i, placement.end));
            schedule.record(
                placement.agent,
                Event {
                    task: task.clone(),
                    start: placement.start,
                    end: placement.end,
                },
            );
        }

        info!(
            tasks = tasks.len(),
            makespan = schedule.makespan(),
            "Schedule computed"
        );
        Ok(schedule)
    }
}
