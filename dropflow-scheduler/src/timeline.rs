//! Per-agent occupancy and slot search.

use crate::cost::Capacity;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where a task may start relative to the time its inputs are ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPolicy {
    /// Start exactly when inputs are ready or not at all on that agent.
    #[default]
    DagPreserving,
    /// Start at the first time at or after readiness with enough supply.
    Deferred,
}

impl FromStr for SlotPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "dag_preserving" | "strict" => Ok(Self::DagPreserving),
            "deferred" | "first_fit" => Ok(Self::Deferred),
            _ => Err(format!(
                "Invalid slot policy '{s}', expected dag-preserving or deferred"
            )),
        }
    }
}

impl std::fmt::Display for SlotPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DagPreserving => write!(f, "dag-preserving"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    start: u64,
    end: u64,
    demand: u32,
}

/// Supply already committed on one agent.
#[derive(Debug, Clone)]
pub(crate) struct Timeline {
    capacity: Capacity,
    slots: Vec<Slot>,
}

impl Timeline {
    pub(crate) fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            slots: Vec::new(),
        }
    }

    fn used_at(&self, t: u64) -> u64 {
        self.slots
            .iter()
            .filter(|s| s.start <= t && t < s.end)
            .map(|s| u64::from(s.demand))
            .sum()
    }

    /// Whether `demand` units are free over `[start, start + duration)`.
    ///
    /// Usage only rises at slot starts and supply only changes at profile
    /// steps, so those are the only points to check.
    pub(crate) fn fits(&self, start: u64, duration: u64, demand: u32) -> bool {
        if duration == 0 {
            return true;
        }
        let end = start.saturating_add(duration);
        let mut points = vec![start];
        points.extend(
            self.slots
                .iter()
                .map(|s| s.start)
                .filter(|&t| t > start && t < end),
        );
        points.extend(self.capacity.change_points(start, end));
        points
            .into_iter()
            .all(|t| self.used_at(t) + u64::from(demand) <= u64::from(self.capacity.at(t)))
    }

    /// Earliest start at or after `ready` allowed by `policy`.
    pub(crate) fn find_slot(
        &self,
        ready: u64,
        duration: u64,
        demand: u32,
        policy: SlotPolicy,
    ) -> Option<u64> {
        match policy {
            SlotPolicy::DagPreserving => self.fits(ready, duration, demand).then_some(ready),
            SlotPolicy::Deferred => {
                let mut candidates = vec![ready];
                candidates.extend(self.slots.iter().map(|s| s.end).filter(|&t| t > ready));
                candidates.extend(self.capacity.change_points(ready, u64::MAX));
                candidates.sort_unstable();
                candidates.dedup();
                candidates
                    .into_iter()
                    .find(|&t| self.fits(t, duration, demand))
            }
        }
    }

    pub(crate) fn reserve(&mut self, start: u64, end: u64, demand: u32) {
        self.slots.push(Slot { start, end, demand });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policies() {
        assert_eq!("deferred".parse::<SlotPolicy>().unwrap(), SlotPolicy::Deferred);
        assert_eq!(
            "dag-preserving".parse::<SlotPolicy>().unwrap(),
            SlotPolicy::DagPreserving
        );
        assert!("later".parse::<SlotPolicy>().is_err());
    }

    #[test]
    fn strict_policy_never_delays() {
        let mut line = Timeline::new(Capacity::Constant(1));
        line.reserve(0, 5, 1);
        assert_eq!(line.find_slot(0, 3, 1, SlotPolicy::DagPreserving), None);
        assert_eq!(line.find_slot(5, 3, 1, SlotPolicy::DagPreserving), Some(5));
    }

    #[test]
    fn deferred_policy_takes_first_gap() {
        let mut line = Timeline::new(Capacity::Constant(1));
        line.reserve(0, 5, 1);
        line.reserve(7, 10, 1);
        assert_eq!(line.find_slot(0, 2, 1, SlotPolicy::Deferred), Some(5));
        assert_eq!(line.find_slot(0, 3, 1, SlotPolicy::Deferred), Some(10));
    }

    #[test]
    fn capacity_is_shared_by_overlapping_slots() {
        let mut line = Timeline::new(Capacity::Constant(2));
        line.reserve(0, 4, 1);
        assert!(line.fits(0, 4, 1));
        line.reserve(0, 4, 1);
        assert!(!line.fits(2, 4, 1));
        assert!(line.fits(4, 4, 2));
    }

    #[test]
    fn profile_limits_later_timesteps() {
        // Supply drops to zero at t=3 and returns at t=6.
        let line = Timeline::new(Capacity::Profile(vec![1, 1, 1, 0, 0, 0, 1]));
        assert!(line.fits(0, 3, 1));
        assert!(!line.fits(1, 3, 1));
        assert_eq!(line.find_slot(1, 3, 1, SlotPolicy::Deferred), Some(6));
    }

    #[test]
    fn demand_above_supply_never_fits() {
        let line = Timeline::new(Capacity::Constant(1));
        assert_eq!(line.find_slot(0, 1, 2, SlotPolicy::Deferred), None);
        assert!(line.fits(0, 0, 2));
    }
}
