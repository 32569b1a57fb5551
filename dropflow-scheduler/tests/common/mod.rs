//! Shared fixtures for scheduler tests.

#![allow(dead_code)]

use dropflow_scheduler::{CostModel, Schedule, TaskGraph};
use std::collections::HashMap;

/// Costs from plain tables.
#[derive(Default)]
pub struct TableCosts {
    pub compute: HashMap<(String, String), u64>,
    pub default_compute: u64,
    pub comm: HashMap<(String, String), u64>,
    pub demand: HashMap<String, u32>,
}

impl TableCosts {
    pub fn uniform(compute: u64) -> Self {
        Self {
            default_compute: compute,
            ..Self::default()
        }
    }

    pub fn compute(mut self, task: &str, agent: &str, cost: u64) -> Self {
        self.compute.insert((task.into(), agent.into()), cost);
        self
    }

    pub fn comm(mut self, from: &str, to: &str, cost: u64) -> Self {
        self.comm.insert((from.into(), to.into()), cost);
        self
    }

    pub fn demand(mut self, task: &str, demand: u32) -> Self {
        self.demand.insert(task.into(), demand);
        self
    }
}

impl CostModel for TableCosts {
    fn compute_cost(&self, task: &str, agent: &str) -> u64 {
        self.compute
            .get(&(task.to_string(), agent.to_string()))
            .copied()
            .unwrap_or(self.default_compute)
    }

    fn comm_cost(&self, from: &str, to: &str, from_agent: &str, to_agent: &str) -> u64 {
        if from_agent == to_agent {
            return 0;
        }
        self.comm
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn demand(&self, task: &str) -> u32 {
        self.demand.get(task).copied().unwrap_or(1)
    }
}

/// Panics unless every edge is honoured: a successor starts no earlier
/// than its predecessor's end plus the transfer cost between their agents.
pub fn assert_precedence(graph: &TaskGraph, schedule: &Schedule, costs: &dyn CostModel) {
    for task in graph.tasks() {
        let ev = schedule.event(task).expect("task scheduled");
        for pred in graph.predecessors(task) {
            let pe = schedule.event(pred).expect("predecessor scheduled");
            let comm = costs.comm_cost(
                pred,
                task,
                schedule.agent_of(pred).unwrap(),
                schedule.agent_of(task).unwrap(),
            );
            assert!(
                ev.start >= pe.end + comm,
                "{task} starts at {} before {pred} ends at {} (+{comm})",
                ev.start,
                pe.end
            );
        }
    }
}

/// Panics if any agent's running demand exceeds `capacity` at any instant.
pub fn assert_capacity(schedule: &Schedule, costs: &dyn CostModel, capacity: u32) {
    for (agent, events) in &schedule.orders {
        for probe in events {
            let used: u32 = events
                .iter()
                .filter(|e| e.start <= probe.start && probe.start < e.end)
                .map(|e| costs.demand(&e.task))
                .sum();
            assert!(
                used <= capacity,
                "agent {agent} uses {used} > {capacity} at t={}",
                probe.start
            );
        }
    }
}
