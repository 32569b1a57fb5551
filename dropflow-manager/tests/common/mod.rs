//! Shared fixtures for manager tests.

#![allow(dead_code)]

use dropflow_core::dispatch::InlineDispatcher;
use dropflow_core::spec::{DropSpec, GraphSpec};
use dropflow_core::types::{SessionId, SessionStatus};
use dropflow_manager::{CompositeManager, DropManager, ManagerConfig, NodeManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// A node manager that runs applications inline.
pub fn node(name: &str) -> Arc<NodeManager> {
    Arc::new(NodeManager::new(name, ManagerConfig::default()).with_dispatcher(Arc::new(InlineDispatcher)))
}

/// Node managers that know each other as peers.
pub fn connected_nodes(names: &[&str]) -> Vec<Arc<NodeManager>> {
    let nodes: Vec<Arc<NodeManager>> = names.iter().map(|n| node(n)).collect();
    for a in &nodes {
        for b in &nodes {
            if a.name() != b.name() {
                a.register_peer(Arc::clone(b) as Arc<dyn DropManager>);
            }
        }
    }
    nodes
}

/// A data island manager over `nodes`.
pub fn island(name: &str, nodes: &[Arc<NodeManager>]) -> Arc<CompositeManager> {
    Arc::new(nodes.iter().fold(
        CompositeManager::island(name, ManagerConfig::default()),
        |dim, nm| dim.with_subordinate(Arc::clone(nm) as Arc<dyn DropManager>),
    ))
}

/// A master manager over `islands`.
pub fn master(name: &str, islands: &[Arc<CompositeManager>]) -> Arc<CompositeManager> {
    Arc::new(islands.iter().fold(
        CompositeManager::master(name, ManagerConfig::default()),
        |mm, dim| mm.with_subordinate(Arc::clone(dim) as Arc<dyn DropManager>),
    ))
}

/// `A -> B(copy) -> C`, every drop on `node`.
pub fn pipeline(node: &str) -> GraphSpec {
    GraphSpec::new(vec![
        DropSpec::data("A", "memory")
            .with_node(node)
            .with_consumers(["B"]),
        DropSpec::app("B", "copy").with_node(node).with_outputs(["C"]),
        DropSpec::data("C", "memory").with_node(node),
    ])
}

/// Create `session_id`, append `graph` and deploy it with `completed`.
pub async fn run_graph(
    manager: &dyn DropManager,
    session_id: &str,
    graph: GraphSpec,
    completed: &[&str],
) {
    let sid = SessionId::new(session_id);
    manager.create_session(sid.clone()).await.unwrap();
    manager.add_graph_spec(sid.clone(), graph).await.unwrap();
    manager
        .deploy_session(sid, completed.iter().map(|o| (*o).into()).collect())
        .await
        .unwrap();
}

/// Poll until the session's rolled-up status is `expected`.
///
/// Cross-node events are delivered on spawned tasks, so a deployed graph
/// can still be moving when `deploy_session` returns.
pub async fn wait_for_status(
    manager: &dyn DropManager,
    session_id: &str,
    expected: SessionStatus,
) -> SessionStatus {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let report = manager
            .get_session_status(SessionId::new(session_id))
            .await
            .unwrap();
        let overall = report.overall();
        if overall == Some(expected) || Instant::now() >= deadline {
            return overall.unwrap_or(SessionStatus::Error);
        }
        sleep(Duration::from_millis(10)).await;
    }
}
