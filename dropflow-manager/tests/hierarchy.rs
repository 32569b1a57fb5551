//! Sessions driven through node, island and master managers.

mod common;

use common::{connected_nodes, island, master, node, pipeline, run_graph, wait_for_status};
use dropflow_core::drop::all_drop_contents;
use dropflow_core::spec::{DropSpec, GraphSpec};
use dropflow_core::types::{AppRunState, DropStatus, Oid, SessionId, SessionStatus};
use dropflow_core::{DropflowError, ErrorKind};
use dropflow_manager::{DropManager, SessionStatusReport, SubordinateStatus};
use serde_json::json;

fn sid(id: &str) -> SessionId {
    SessionId::new(id)
}

#[tokio::test]
async fn unknown_node_rejects_the_whole_batch() {
    let nodes = connected_nodes(&["nm-1"]);
    let dim = island("island-1", &nodes);
    dim.create_session(sid("s1")).await.unwrap();

    let graph = GraphSpec::new(vec![
        DropSpec::data("A", "memory").with_node("nm-1"),
        DropSpec::data("B", "memory").with_node("unknown_host"),
    ]);
    let err = dim.add_graph_spec(sid("s1"), graph).await.unwrap_err();
    assert!(matches!(err, DropflowError::UnknownTarget { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(dim.get_graph(sid("s1")).await.unwrap().is_empty());
    assert!(nodes[0].get_graph(sid("s1")).await.unwrap().is_empty());
}

#[tokio::test]
async fn completed_root_needs_no_write() {
    let nm = node("nm-1");
    let graph = GraphSpec::new(vec![DropSpec::data("A", "memory").with_node("nm-1")]);
    run_graph(nm.as_ref(), "s1", graph, &["A"]).await;

    let status = nm.get_graph_status(sid("s1")).await.unwrap();
    assert_eq!(status[&Oid::new("A")].status, DropStatus::Completed);
    let a = dropflow_manager::Session::drop(&nm.session("s1").unwrap(), "A").unwrap();
    assert!(all_drop_contents(&a).unwrap().is_empty());
}

#[tokio::test]
async fn island_reports_each_node_apart() {
    let nodes = connected_nodes(&["nm-1", "nm-2"]);
    let dim = island("island-1", &nodes);

    // A is completed at deploy; X never is, so nm-2 stays RUNNING.
    let graph = GraphSpec::new(vec![
        DropSpec::data("A", "memory").with_node("nm-1"),
        DropSpec::data("X", "memory").with_node("nm-2"),
    ]);
    run_graph(dim.as_ref(), "s1", graph, &["A"]).await;

    let report = dim.get_session_status(sid("s1")).await.unwrap();
    assert_eq!(
        report.get("nm-1"),
        Some(&SubordinateStatus::Reported(SessionStatusReport::Leaf(
            SessionStatus::Finished
        )))
    );
    assert_eq!(
        report.get("nm-2"),
        Some(&SubordinateStatus::Reported(SessionStatusReport::Leaf(
            SessionStatus::Running
        )))
    );
    assert_eq!(report.overall(), Some(SessionStatus::Running));

    dim.trigger_drops(sid("s1"), vec![Oid::new("X")])
        .await
        .unwrap();
    let report = dim.get_session_status(sid("s1")).await.unwrap();
    assert_eq!(report.overall(), Some(SessionStatus::Finished));
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        json!({"nm-1": "FINISHED", "nm-2": "FINISHED"})
    );
}

#[tokio::test]
async fn graph_round_trips_through_every_level() {
    let nodes = connected_nodes(&["nm-1"]);
    let dim = island("island-1", &nodes);
    let mm = master("master", &[dim]);

    let graph = GraphSpec::new(
        pipeline("nm-1")
            .into_parts()
            .0
            .into_iter()
            .map(|s| s.with_island("island-1").with_param("note", "kept"))
            .collect(),
    );
    let submitted = graph.clone();
    mm.create_session(sid("s1")).await.unwrap();
    mm.add_graph_spec(sid("s1"), graph).await.unwrap();

    let view = mm.get_graph(sid("s1")).await.unwrap();
    assert_eq!(view.len(), 3);
    for spec in submitted.drops() {
        assert_eq!(&view[spec.oid()], spec);
    }
    assert_eq!(view[&Oid::new("B")].param("note"), Some(&json!("kept")));
}

#[tokio::test]
async fn every_level_finishes_the_same_graph() {
    let nm = node("nm-1");
    run_graph(nm.as_ref(), "s1", pipeline("nm-1"), &["A"]).await;

    let dim = island("island-1", &connected_nodes(&["nm-1"]));
    run_graph(dim.as_ref(), "s1", pipeline("nm-1"), &["A"]).await;

    let mm = master(
        "master",
        &[island("island-1", &connected_nodes(&["nm-1"]))],
    );
    let graph = GraphSpec::new(
        pipeline("nm-1")
            .into_parts()
            .0
            .into_iter()
            .map(|s| s.with_island("island-1"))
            .collect(),
    );
    run_graph(mm.as_ref(), "s1", graph, &["A"]).await;

    let managers: [&dyn DropManager; 3] = [nm.as_ref(), dim.as_ref(), mm.as_ref()];
    let mut statuses = Vec::new();
    for m in managers {
        assert_eq!(
            wait_for_status(m, "s1", SessionStatus::Finished).await,
            SessionStatus::Finished
        );
        statuses.push(m.get_graph_status(sid("s1")).await.unwrap());
    }
    assert_eq!(statuses[0], statuses[1]);
    assert_eq!(statuses[1], statuses[2]);
    assert_eq!(
        statuses[2][&Oid::new("B")].exec_status,
        Some(AppRunState::Finished)
    );
}

#[tokio::test]
async fn edges_across_nodes_propagate_completion() {
    let nodes = connected_nodes(&["nm-1", "nm-2"]);
    let dim = island("island-1", &nodes);

    let graph = GraphSpec::new(vec![
        DropSpec::data("A", "memory")
            .with_node("nm-1")
            .with_consumers(["B"]),
        DropSpec::app("B", "barrier")
            .with_node("nm-2")
            .with_outputs(["C"]),
        DropSpec::data("C", "memory").with_node("nm-2"),
    ]);
    run_graph(dim.as_ref(), "s1", graph, &["A"]).await;

    assert_eq!(
        wait_for_status(dim.as_ref(), "s1", SessionStatus::Finished).await,
        SessionStatus::Finished
    );
    let status = dim.get_graph_status(sid("s1")).await.unwrap();
    assert_eq!(status[&Oid::new("C")].status, DropStatus::Completed);

    let links = nodes[1].session("s1").unwrap().links();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].from_node, "nm-1");
    assert_eq!(links[0].to_node, "nm-2");
}

#[tokio::test]
async fn edges_across_islands_propagate_completion() {
    let nodes = connected_nodes(&["nm-1", "nm-2"]);
    let dim1 = island("island-1", &nodes[..1]);
    let dim2 = island("island-2", &nodes[1..]);
    let mm = master("master", &[dim1, dim2]);

    let graph = GraphSpec::new(vec![
        DropSpec::data("A", "memory")
            .with_node("nm-1")
            .with_island("island-1")
            .with_consumers(["B"]),
        DropSpec::app("B", "barrier")
            .with_node("nm-2")
            .with_island("island-2")
            .with_outputs(["C"]),
        DropSpec::data("C", "memory")
            .with_node("nm-2")
            .with_island("island-2"),
    ]);
    run_graph(mm.as_ref(), "s1", graph, &["A"]).await;

    assert_eq!(
        wait_for_status(mm.as_ref(), "s1", SessionStatus::Finished).await,
        SessionStatus::Finished
    );
    let report = mm.get_session_status(sid("s1")).await.unwrap();
    assert!(report.get("island-1").is_some());
    assert!(report.get("island-2").is_some());
}

#[tokio::test]
async fn cancel_reaches_every_node() {
    let nodes = connected_nodes(&["nm-1", "nm-2"]);
    let dim = island("island-1", &nodes);

    let graph = GraphSpec::new(vec![
        DropSpec::data("A", "memory")
            .with_node("nm-1")
            .with_consumers(["B"]),
        DropSpec::app("B", "barrier").with_node("nm-2"),
    ]);
    run_graph(dim.as_ref(), "s1", graph, &[]).await;

    dim.cancel_session(sid("s1")).await.unwrap();
    let status = dim.get_graph_status(sid("s1")).await.unwrap();
    assert_eq!(status[&Oid::new("A")].status, DropStatus::Cancelled);
    assert_eq!(status[&Oid::new("B")].status, DropStatus::Cancelled);
    let report = dim.get_session_status(sid("s1")).await.unwrap();
    assert_eq!(report.overall(), Some(SessionStatus::Cancelled));
}

#[tokio::test]
async fn deploy_twice_is_a_state_error() {
    let nodes = connected_nodes(&["nm-1"]);
    let dim = island("island-1", &nodes);
    run_graph(dim.as_ref(), "s1", pipeline("nm-1"), &["A"]).await;

    let err = dim
        .deploy_session(sid("s1"), Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    let err = dim
        .add_graph_spec(
            sid("s1"),
            GraphSpec::new(vec![DropSpec::data("D", "memory").with_node("nm-1")]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DropflowError::InvalidSessionState { .. }));
}

#[tokio::test]
async fn destroy_reaches_every_node() {
    let nodes = connected_nodes(&["nm-1", "nm-2"]);
    let dim = island("island-1", &nodes);
    run_graph(dim.as_ref(), "s1", pipeline("nm-1"), &["A"]).await;

    assert_eq!(nodes[1].get_session_ids().await.unwrap(), vec![sid("s1")]);
    dim.destroy_session(sid("s1")).await.unwrap();
    assert!(dim.get_session_ids().await.unwrap().is_empty());
    for nm in &nodes {
        assert!(nm.get_session_ids().await.unwrap().is_empty());
    }

    let info = dim.info().await.unwrap();
    assert_eq!(info.level, "island");
    assert_eq!(info.hosts, vec!["nm-1".to_string(), "nm-2".to_string()]);
}

#[tokio::test]
async fn file_drops_live_under_the_data_dir() {
    use dropflow_core::dispatch::InlineDispatcher;
    use dropflow_manager::{ManagerConfig, NodeManager};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let config = ManagerConfig::builder()
        .data_dir(dir.path())
        .build()
        .unwrap();
    let nm = NodeManager::new("nm-1", config).with_dispatcher(Arc::new(InlineDispatcher));

    let graph = GraphSpec::new(vec![
        DropSpec::data("A", "file")
            .with_node("nm-1")
            .with_consumers(["B"]),
        DropSpec::app("B", "copy").with_node("nm-1").with_outputs(["C"]),
        DropSpec::data("C", "file").with_node("nm-1"),
    ]);
    run_graph(&nm, "s1", graph, &[]).await;

    let a = dropflow_manager::Session::drop(&nm.session("s1").unwrap(), "A").unwrap();
    a.write(b"0123456789").unwrap();
    a.set_completed().unwrap();

    assert_eq!(
        nm.get_session_status(sid("s1")).await.unwrap().overall(),
        Some(SessionStatus::Finished)
    );
    let c_path = dir.path().join("s1").join("C");
    assert_eq!(std::fs::read(&c_path).unwrap(), b"0123456789");

    nm.destroy_session(sid("s1")).await.unwrap();
    assert!(!c_path.exists());
}
