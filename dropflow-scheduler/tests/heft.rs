//! End-to-end scheduling behaviour.

mod common;

use common::{TableCosts, assert_capacity, assert_precedence};
use dropflow_core::DropflowError;
use dropflow_scheduler::{Agent, HeftScheduler, SchedulingProblem, SlotPolicy, TaskGraph};

#[test]
fn independent_tasks_on_single_slot_agent_run_back_to_back() {
    let graph = TaskGraph::from_successors([("t1", vec![]), ("t2", vec![])]);
    let agents = [Agent::new("only", 1)];
    let costs = TableCosts::uniform(1).compute("t1", "only", 4).compute("t2", "only", 3);

    let schedule = HeftScheduler::new()
        .with_policy(SlotPolicy::Deferred)
        .schedule(&graph, &agents, &costs)
        .unwrap();

    let events = &schedule.orders["only"];
    assert_eq!(events.len(), 2);
    assert!(events[0].end <= events[1].start);
    assert_eq!(schedule.makespan(), 7);
}

#[test]
fn strict_policy_reports_overflow_instead_of_delaying() {
    let graph = TaskGraph::from_successors([("t1", vec![]), ("t2", vec![])]);
    let agents = [Agent::new("only", 1)];
    let costs = TableCosts::uniform(2);

    let err = HeftScheduler::new()
        .schedule(&graph, &agents, &costs)
        .unwrap_err();
    match err {
        DropflowError::CapacityOverflow {
            task,
            demand,
            ready,
        } => {
            assert_eq!(task, "t2");
            assert_eq!(demand, 1);
            assert_eq!(ready, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn schedules_are_deterministic() {
    let graph = TaskGraph::from_successors([
        ("src", vec!["m1", "m2", "m3"]),
        ("m1", vec!["sink"]),
        ("m2", vec!["sink"]),
        ("m3", vec!["sink"]),
        ("sink", vec![]),
    ]);
    let agents = [Agent::new("a", 2), Agent::new("b", 1), Agent::new("c", 1)];
    let costs = TableCosts::uniform(3)
        .compute("m2", "b", 1)
        .comm("src", "m1", 2)
        .comm("m3", "sink", 5);

    let first = HeftScheduler::new()
        .with_policy(SlotPolicy::Deferred)
        .schedule(&graph, &agents, &costs)
        .unwrap();
    for _ in 0..10 {
        let again = HeftScheduler::new()
            .with_policy(SlotPolicy::Deferred)
            .schedule(&graph, &agents, &costs)
            .unwrap();
        assert_eq!(again, first);
    }
    assert_eq!(first.taskson.len(), 5);
    assert_precedence(&graph, &first, &costs);
}

#[test]
fn cyclic_graphs_are_rejected() {
    let mut graph = TaskGraph::new();
    graph.add_dependency("a", "b");
    graph.add_dependency("b", "a");
    let err = HeftScheduler::new()
        .schedule(&graph, &[Agent::new("x", 1)], &TableCosts::uniform(1))
        .unwrap_err();
    assert!(matches!(err, DropflowError::CyclicGraph { .. }));
}

#[test]
fn empty_agent_set_is_rejected() {
    let graph = TaskGraph::from_successors([("a", vec![])]);
    let err = HeftScheduler::new()
        .schedule(&graph, &[], &TableCosts::uniform(1))
        .unwrap_err();
    assert!(matches!(err, DropflowError::NoAgents));
}

#[test]
fn wide_graph_respects_precedence_and_capacity() {
    // Two layers of eight tasks, fully connected between layers.
    let mut graph = TaskGraph::new();
    for i in 0..8 {
        for j in 0..8 {
            graph.add_dependency(&format!("l0_{i}"), &format!("l1_{j}"));
        }
    }
    let agents = [Agent::new("a", 2), Agent::new("b", 2)];
    let mut costs = TableCosts::uniform(2);
    for i in 0..8 {
        costs = costs.compute(&format!("l0_{i}"), "b", 3);
        for j in 0..8 {
            costs = costs.comm(&format!("l0_{i}"), &format!("l1_{j}"), 1);
        }
    }

    let schedule = HeftScheduler::new()
        .with_policy(SlotPolicy::Deferred)
        .schedule(&graph, &agents, &costs)
        .unwrap();

    assert_eq!(schedule.taskson.len(), 16);
    assert_precedence(&graph, &schedule, &costs);
    assert_capacity(&schedule, &costs, 2);
    for events in schedule.orders.values() {
        assert!(events.windows(2).all(|w| w[0].start <= w[1].start));
    }
}

#[test]
fn chain_starts_exactly_when_inputs_arrive() {
    let graph = TaskGraph::from_successors([("a", vec!["b"]), ("b", vec![])]);
    let agents = [Agent::new("x", 1), Agent::new("y", 1)];
    let costs = TableCosts::uniform(5)
        .compute("b", "x", 50)
        .compute("b", "y", 1)
        .comm("a", "b", 3);

    let schedule = HeftScheduler::new()
        .schedule(&graph, &agents, &costs)
        .unwrap();
    assert_eq!(schedule.agent_of("a"), Some("x"));
    assert_eq!(schedule.agent_of("b"), Some("y"));
    assert_eq!(schedule.event("b").unwrap().start, 8);
    assert_eq!(schedule.makespan(), 9);
}

#[test]
fn demand_above_every_agent_overflows_even_when_deferred() {
    let graph = TaskGraph::from_successors([("big", vec![])]);
    let costs = TableCosts::uniform(1).demand("big", 3);
    let err = HeftScheduler::new()
        .with_policy(SlotPolicy::Deferred)
        .schedule(&graph, &[Agent::new("x", 2)], &costs)
        .unwrap_err();
    assert!(matches!(err, DropflowError::CapacityOverflow { demand: 3, .. }));
}

#[test]
fn problem_documents_round_trip_through_the_scheduler() {
    let problem = SchedulingProblem::from_json(
        r#"{
            "agents": [{"id": "n0", "capacity": 1}, {"id": "n1", "capacity": [0, 0, 1]}],
            "tasks": [{"id": "a", "cost": 2}, {"id": "b", "cost": 2}],
            "edges": [{"from": "a", "to": "b", "comm": 10}]
        }"#,
    )
    .unwrap();
    let schedule = problem.solve(None).unwrap();
    assert_eq!(schedule.agent_of("a"), Some("n0"));
    assert_eq!(schedule.agent_of("b"), Some("n0"));
    assert_eq!(schedule.makespan(), 4);
    assert!(schedule.orders["n1"].is_empty());
}
