//! Graphs built from JSON specs, executed end to end.

mod common;

use common::{instantiate, test_bytes};
use dropflow_core::drop::{DropEnv, DropWaiter, all_drop_contents};
use dropflow_core::spec::GraphSpec;
use dropflow_core::{DropStatus, InlineDispatcher, Oid, TokioDispatcher};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn copy_chain() -> GraphSpec {
    GraphSpec::from_value(json!([
        {"oid": "A", "categoryType": "Data",
         "dropclass": "dlg.data.drops.memory.InMemoryDROP", "consumers": ["B"]},
        {"oid": "B", "categoryType": "Application",
         "dropclass": "dlg.apps.simple.CopyApp", "outputs": ["C"]},
        {"oid": "C", "categoryType": "Data",
         "dropclass": "dlg.data.drops.memory.InMemoryDROP"}
    ]))
    .unwrap()
}

#[test]
fn copy_chain_runs_inline() {
    let env = DropEnv::new("s1").with_dispatcher(Arc::new(InlineDispatcher));
    let drops = instantiate(&copy_chain(), &env);
    let a = &drops[&Oid::new("A")];
    let c = &drops[&Oid::new("C")];

    a.write(&test_bytes(10, 7)).unwrap();
    a.set_completed().unwrap();

    assert_eq!(c.status(), DropStatus::Completed);
    assert_eq!(all_drop_contents(c).unwrap(), all_drop_contents(a).unwrap());
}

#[tokio::test]
async fn copy_chain_runs_on_blocking_pool() {
    let env = DropEnv::new("s2")
        .with_dispatcher(Arc::new(TokioDispatcher::current().unwrap()));
    let drops = instantiate(&copy_chain(), &env);
    let a = &drops[&Oid::new("A")];
    let c = &drops[&Oid::new("C")];

    let waiter = DropWaiter::new([c]).with_timeout(Duration::from_secs(5));
    a.write(&test_bytes(4096, 1)).unwrap();
    a.set_completed().unwrap();
    waiter.wait().await.unwrap();

    assert_eq!(&all_drop_contents(c).unwrap()[..], &test_bytes(4096, 1)[..]);
}

#[test]
fn fan_in_joins_before_running() {
    let graph = GraphSpec::from_value(json!([
        {"oid": "A1", "categoryType": "Data", "dropclass": "memory"},
        {"oid": "A2", "categoryType": "Data", "dropclass": "memory"},
        {"oid": "B", "categoryType": "Application", "dropclass": "copy",
         "inputs": ["A1", "A2"], "outputs": ["C"]},
        {"oid": "C", "categoryType": "Data", "dropclass": "memory"}
    ]))
    .unwrap();
    assert_eq!(graph.roots(), vec![Oid::new("A1"), Oid::new("A2")]);

    let env = DropEnv::new("s3").with_dispatcher(Arc::new(InlineDispatcher));
    let drops = instantiate(&graph, &env);
    drops[&Oid::new("A1")].write(b"left-").unwrap();
    drops[&Oid::new("A2")].write(b"right").unwrap();
    drops[&Oid::new("A1")].set_completed().unwrap();
    assert_eq!(drops[&Oid::new("C")].status(), DropStatus::Initialized);
    drops[&Oid::new("A2")].set_completed().unwrap();

    let c = &drops[&Oid::new("C")];
    assert_eq!(c.status(), DropStatus::Completed);
    assert_eq!(&all_drop_contents(c).unwrap()[..], b"left-right");
}

#[test]
fn file_drops_flow_through_copy() {
    let dir = tempfile::tempdir().unwrap();
    let graph = GraphSpec::from_value(json!([
        {"oid": "A", "categoryType": "Data", "dropclass": "file", "consumers": ["B"]},
        {"oid": "B", "categoryType": "Application", "dropclass": "copy", "outputs": ["C"]},
        {"oid": "C", "categoryType": "Data", "dropclass": "file"}
    ]))
    .unwrap();
    let env = DropEnv::new("s4")
        .with_dispatcher(Arc::new(InlineDispatcher))
        .with_data_dir(dir.path());
    let drops = instantiate(&graph, &env);
    drops[&Oid::new("A")].write(b"persisted").unwrap();
    drops[&Oid::new("A")].set_completed().unwrap();

    let on_disk = std::fs::read(dir.path().join("s4").join("C")).unwrap();
    assert_eq!(on_disk, b"persisted");
}
