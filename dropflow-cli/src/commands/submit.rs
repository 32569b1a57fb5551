//! Submit command - create a session from a graph file and deploy it.

use super::client;
use anyhow::{Context, Result};
use dropflow_core::spec::GraphSpec;
use dropflow_core::types::{Oid, SessionId};
use dropflow_manager::DropManager;
use std::fs;
use std::path::Path;

/// Run the submit command.
pub async fn run(
    file: &str,
    manager: &str,
    session: Option<String>,
    completed: Option<Vec<String>>,
) -> Result<()> {
    let path = Path::new(file);
    if !path.exists() {
        anyhow::bail!("Graph file not found: {}", file);
    }

    let text = fs::read_to_string(path).with_context(|| format!("Failed to read graph file: {file}"))?;
    let graph = GraphSpec::from_json(&text).with_context(|| format!("Invalid graph in {file}"))?;

    let completed: Vec<Oid> = match completed {
        Some(oids) => oids.into_iter().map(Oid::from).collect(),
        None => graph.roots(),
    };
    let session_id = SessionId::new(session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()));

    tracing::info!(
        file = %file,
        manager = %manager,
        session_id = %session_id,
        drops = graph.len(),
        "Submitting graph"
    );

    let client = client(manager)?;
    client
        .create_session(session_id.clone())
        .await
        .context("Failed to create session")?;
    client
        .add_graph_spec(session_id.clone(), graph)
        .await
        .context("Failed to append graph")?;
    client
        .deploy_session(session_id.clone(), completed.clone())
        .await
        .context("Failed to deploy session")?;

    println!("Session: {session_id}");
    println!(
        "Completed at deploy: {}",
        if completed.is_empty() {
            "-".to_string()
        } else {
            completed
                .iter()
                .map(Oid::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    Ok(())
}
