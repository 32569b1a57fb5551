//! Status command - show a session's status.

use super::client;
use anyhow::{Context, Result};
use dropflow_core::types::SessionId;
use dropflow_manager::DropManager;

/// Run the status command.
pub async fn run(session: &str, manager: &str, drops: bool) -> Result<()> {
    let client = client(manager)?;
    let session_id = SessionId::new(session);

    let report = client
        .get_session_status(session_id.clone())
        .await
        .with_context(|| format!("Failed to get status of session {session}"))?;

    match report.overall() {
        Some(status) => println!("Session {session}: {status}"),
        None => println!("Session {session}: unknown (a subordinate did not report)"),
    }
    if !report.is_leaf() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if drops {
        let status = client
            .get_graph_status(session_id)
            .await
            .context("Failed to get drop statuses")?;
        println!();
        for (oid, entry) in &status {
            match entry.exec_status {
                Some(exec) => println!("  {:<24} {} ({exec})", oid.as_str(), entry.status),
                None => println!("  {:<24} {}", oid.as_str(), entry.status),
            }
        }
    }
    Ok(())
}
