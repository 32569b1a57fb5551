//! Schedule command - run the scheduler on a JSON problem.

use anyhow::{Context, Result};
use dropflow_scheduler::{SchedulingProblem, SlotPolicy};
use std::fs;

/// Run the schedule command.
pub fn run(file: &str, policy: Option<SlotPolicy>) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("Failed to read problem file: {file}"))?;
    let problem = SchedulingProblem::from_json(&text).with_context(|| format!("Invalid problem in {file}"))?;

    tracing::info!(
        tasks = problem.tasks.len(),
        agents = problem.agents.len(),
        policy = ?policy.or(problem.policy).unwrap_or_default(),
        "Scheduling"
    );

    let schedule = problem.solve(policy).context("Scheduling failed")?;

    println!("{}", serde_json::to_string_pretty(&schedule)?);
    println!();
    println!("Makespan: {}", schedule.makespan());
    Ok(())
}
