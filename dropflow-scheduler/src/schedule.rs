//! Scheduler output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One task placed on an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Task id.
    pub task: String,
    /// Start time.
    pub start: u64,
    /// End time.
    pub end: u64,
}

impl Event {
    /// Time the task occupies its agent.
    #[must_use]
    pub fn duration(&self) -> u64 {
        self.end - self.start
    }
}

/// A static allocation of tasks to agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Events per agent, sorted by start time. Every agent has an entry.
    pub orders: BTreeMap<String, Vec<Event>>,
    /// Agent chosen for every task.
    pub taskson: BTreeMap<String, String>,
}

impl Schedule {
    /// Latest end time over every agent with at least one event.
    #[must_use]
    pub fn makespan(&self) -> u64 {
        self.orders
            .values()
            .filter_map(|events| events.iter().map(|e| e.end).max())
            .max()
            .unwrap_or(0)
    }

    /// The event for `task`, if scheduled.
    #[must_use]
    pub fn event(&self, task: &str) -> Option<&Event> {
        let agent = self.taskson.get(task)?;
        self.orders.get(agent)?.iter().find(|e| e.task == task)
    }

    /// Agent `task` runs on.
    #[must_use]
    pub fn agent_of(&self, task: &str) -> Option<&str> {
        self.taskson.get(task).map(String::as_str)
    }

    pub(crate) fn record(&mut self, agent: &str, event: Event) {
        self.taskson.insert(event.task.clone(), agent.to_string());
        let order = self.orders.entry(agent.to_string()).or_default();
        let at = order.partition_point(|e| e.start <= event.start);
        order.insert(at, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(task: &str, start: u64, end: u64) -> Event {
        Event {
            task: task.into(),
            start,
            end,
        }
    }

    #[test]
    fn record_keeps_orders_sorted() {
        let mut s = Schedule::default();
        s.record("a", ev("t2", 5, 9));
        s.record("a", ev("t1", 0, 5));
        s.record("b", ev("t3", 1, 2));
        let starts: Vec<u64> = s.orders["a"].iter().map(|e| e.start).collect();
        assert_eq!(starts, vec![0, 5]);
        assert_eq!(s.agent_of("t3"), Some("b"));
        assert_eq!(s.event("t2").unwrap().duration(), 4);
        assert_eq!(s.makespan(), 9);
    }

    #[test]
    fn empty_schedule_has_zero_makespan() {
        let mut s = Schedule::default();
        s.orders.insert("idle".into(), Vec::new());
        assert_eq!(s.makespan(), 0);
    }
}
