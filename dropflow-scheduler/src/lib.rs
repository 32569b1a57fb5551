//! Dropflow Scheduler
//!
//! A HEFT-style list scheduler that maps a task DAG onto agents with
//! bounded, possibly time-varying, capacity.
//!
//! # Overview
//!
//! Tasks are ranked by their upward rank (mean compute cost plus the
//! costliest path to an exit task) and placed one by one on the agent that
//! finishes them earliest. Execution downstream is trigger-driven, so by
//! default a task must start the moment its inputs are ready; an agent
//! lacking free supply at that instant cannot host it.
//!
//! # Key Components
//!
//! - **TaskGraph**: the DAG with deterministic topological order
//! - **CostModel**: compute cost, transfer cost and demand
//! - **HeftScheduler**: ranking and allocation under a [`SlotPolicy`]
//! - **SchedulingProblem**: a JSON document bundling all of the above
//!
//! # Example
//!
//! ```ignore
//! use dropflow_scheduler::{Agent, HeftScheduler, SlotPolicy, TaskGraph};
//!
//! let graph = TaskGraph::from_successors([("a", vec!["b"]), ("b", vec![])]);
//! let agents = [Agent::new("n0", 1), Agent::new("n1", 1)];
//! let schedule = HeftScheduler::new()
//!     .with_policy(SlotPolicy::Deferred)
//!     .schedule(&graph, &agents, &costs)?;
//! println!("makespan = {}", schedule.makespan());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cost;
pub mod graph;
pub mod heft;
pub mod problem;
pub mod rank;
pub mod schedule;
pub mod timeline;

// Re-export key types at crate root for convenience
pub use cost::{Agent, Capacity, CostModel};
pub use graph::TaskGraph;
pub use heft::HeftScheduler;
pub use problem::{EdgeDef, SchedulingProblem, TaskCost, TaskDef};
pub use schedule::{Event, Schedule};
pub use timeline::SlotPolicy;
