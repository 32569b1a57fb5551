//! Common test utilities for integration tests.

#![allow(dead_code)]

use dropflow_core::drop::{DropClassRegistry, DropEnv, DropObject, DropRef};
use dropflow_core::spec::GraphSpec;
use dropflow_core::types::Oid;
use std::collections::HashMap;

/// Build and wire every drop of a graph the way a session does.
pub fn instantiate(graph: &GraphSpec, env: &DropEnv) -> HashMap<Oid, DropRef> {
    let registry = DropClassRegistry::with_builtins();
    let drops: HashMap<Oid, DropRef> = graph
        .drops()
        .iter()
        .map(|spec| (spec.oid().clone(), registry.build(spec, env).unwrap()))
        .collect();
    for edge in graph.edges() {
        DropObject::link(&drops[&edge.from], &drops[&edge.to], edge.kind).unwrap();
    }
    drops
}

/// Deterministic pseudo-random bytes.
pub fn test_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
