//! Physical graph specs: ordered lists of drop specs.

use super::drop_spec::DropSpec;
use super::relation::{DropRel, Edge, EdgeKind};
use crate::error::{DropflowError, Result};
use crate::types::Oid;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// An ordered list of drop specs plus the optional graph-level
/// reproducibility record.
///
/// On the wire this is a JSON list; a trailing object without an `oid` is
/// taken as the graph-level `reprodata` record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSpec {
    drops: Vec<DropSpec>,
    reprodata: Option<Value>,
}

impl GraphSpec {
    /// Create a graph spec from drop specs.
    pub fn new(drops: Vec<DropSpec>) -> Self {
        Self {
            drops,
            reprodata: None,
        }
    }

    /// Attach a graph-level reproducibility record.
    pub fn with_reprodata(mut self, reprodata: Value) -> Self {
        self.reprodata = Some(reprodata);
        self
    }

    /// Parse the wire form.
    pub fn from_value(value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            _ => {
                return Err(DropflowError::InvalidDropSpec {
                    index: 0,
                    cause: "graph spec must be a list of drop specs".to_string(),
                });
            }
        };
        let count = items.len();
        let mut drops = Vec::with_capacity(count);
        let mut reprodata = None;
        for (index, item) in items.into_iter().enumerate() {
            let is_graph_record = index + 1 == count
                && item.as_object().is_some_and(|m| !m.contains_key("oid"));
            if is_graph_record {
                reprodata = Some(item);
                continue;
            }
            drops.push(DropSpec::from_value(index, item)?);
        }
        Ok(Self { drops, reprodata })
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// The wire form.
    pub fn to_value(&self) -> Value {
        let mut items: Vec<Value> = self
            .drops
            .iter()
            .map(|d| Value::Object(d.raw().clone()))
            .collect();
        if let Some(r) = &self.reprodata {
            items.push(r.clone());
        }
        Value::Array(items)
    }

    /// Drop specs in submission order.
    pub fn drops(&self) -> &[DropSpec] {
        &self.drops
    }

    /// Consume into the drop specs and graph record.
    pub fn into_parts(self) -> (Vec<DropSpec>, Option<Value>) {
        (self.drops, self.reprodata)
    }

    /// Graph-level reproducibility record.
    pub fn reprodata(&self) -> Option<&Value> {
        self.reprodata.as_ref()
    }

    /// Number of drop specs.
    pub fn len(&self) -> usize {
        self.drops.len()
    }

    /// Whether there are no drop specs.
    pub fn is_empty(&self) -> bool {
        self.drops.is_empty()
    }

    /// Find a drop spec by oid.
    pub fn get(&self, oid: &str) -> Option<&DropSpec> {
        self.drops.iter().find(|d| d.oid().as_str() == oid)
    }

    /// Every declared relation.
    pub fn relations(&self) -> Vec<DropRel> {
        self.drops.iter().flat_map(DropSpec::relations).collect()
    }

    /// Deduplicated directed edges, upstream first, in order of first
    /// declaration.
    ///
    /// An edge may be declared on either end (`consumers` on the data drop or
    /// `inputs` on the application); both forms collapse to one edge. If
    /// either side declares it streaming, the edge is streaming.
    pub fn edges(&self) -> Vec<Edge> {
        collect_edges(self.relations())
    }

    /// Oids of drops with no upstream edge.
    ///
    /// These are the drops a client lists as `completedDrops` when deploying.
    pub fn roots(&self) -> Vec<Oid> {
        let downstream: HashSet<Oid> = self.edges().into_iter().map(|e| e.to).collect();
        self.drops
            .iter()
            .map(|d| d.oid().clone())
            .filter(|oid| !downstream.contains(oid))
            .collect()
    }

    /// Oids in an order where every edge's upstream comes first.
    ///
    /// Edges touching drops outside this spec are ignored. Returns `None`
    /// if the edges form a cycle.
    pub fn topological_order(&self) -> Option<Vec<Oid>> {
        let oids: Vec<Oid> = self.drops.iter().map(|d| d.oid().clone()).collect();
        topological_order(&oids, &self.edges())
    }
}

/// Collapse relations into deduplicated edges.
pub fn collect_edges(relations: impl IntoIterator<Item = DropRel>) -> Vec<Edge> {
    let mut edges: Vec<Edge> = Vec::new();
    let mut seen: HashMap<(Oid, Oid), usize> = HashMap::new();
    for rel in relations {
        let edge = rel.edge();
        let key = (edge.from.clone(), edge.to.clone());
        match seen.get(&key) {
            Some(&i) => {
                if edge.kind == EdgeKind::Streaming && edges[i].kind == EdgeKind::Data {
                    edges[i].kind = EdgeKind::Streaming;
                }
            }
            None => {
                seen.insert(key, edges.len());
                edges.push(edge);
            }
        }
    }
    edges
}

/// Kahn's algorithm over `oids`, keeping submission order among ready drops.
pub fn topological_order(oids: &[Oid], edges: &[Edge]) -> Option<Vec<Oid>> {
    let index: HashMap<&Oid, usize> = oids.iter().enumerate().map(|(i, o)| (o, i)).collect();
    let mut in_degree = vec![0usize; oids.len()];
    let mut out: Vec<Vec<usize>> = vec![Vec::new(); oids.len()];
    for edge in edges {
        if let (Some(&f), Some(&t)) = (index.get(&edge.from), index.get(&edge.to)) {
            out[f].push(t);
            in_degree[t] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..oids.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(oids.len());
    while let Some(i) = queue.pop_front() {
        order.push(oids[i].clone());
        for &t in &out[i] {
            in_degree[t] -= 1;
            if in_degree[t] == 0 {
                queue.push_back(t);
            }
        }
    }

    (order.len() == oids.len()).then_some(order)
}

impl Serialize for GraphSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GraphSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl FromIterator<DropSpec> for GraphSpec {
    fn from_iter<I: IntoIterator<Item = DropSpec>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::LinkType;
    use serde_json::json;

    fn pipeline() -> GraphSpec {
        GraphSpec::from_value(json!([
            {"oid": "A", "categoryType": "Data", "dropclass": "memory", "consumers": ["B"]},
            {"oid": "B", "categoryType": "Application", "dropclass": "copy",
             "inputs": ["A"], "outputs": ["C"]},
            {"oid": "C", "categoryType": "Data", "dropclass": "memory", "producers": ["B"]},
            {"reprodata": {"rmode": "1"}}
        ]))
        .unwrap()
    }

    #[test]
    fn trailing_record_is_graph_reprodata() {
        let graph = pipeline();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.reprodata(), Some(&json!({"reprodata": {"rmode": "1"}})));
        let round = GraphSpec::from_value(graph.to_value()).unwrap();
        assert_eq!(round, graph);
    }

    #[test]
    fn edges_declared_on_both_sides_collapse() {
        let edges = pipeline().edges();
        assert_eq!(edges, vec![Edge::data("A", "B"), Edge::data("B", "C")]);
    }

    #[test]
    fn streaming_wins_over_plain_declaration() {
        let graph: GraphSpec = [
            DropSpec::data("A", "memory").with_consumers(["B"]),
            DropSpec::app("B", "copy").with_links(LinkType::StreamingInput, ["A"]),
        ]
        .into_iter()
        .collect();
        let edges = graph.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Streaming);
    }

    #[test]
    fn roots_have_no_upstream() {
        assert_eq!(pipeline().roots(), vec![Oid::new("A")]);
    }

    #[test]
    fn topological_order_follows_edges() {
        let graph: GraphSpec = [
            DropSpec::data("C", "memory").with_links(LinkType::Producer, ["B"]),
            DropSpec::app("B", "copy").with_links(LinkType::Input, ["A"]),
            DropSpec::data("A", "memory"),
        ]
        .into_iter()
        .collect();
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![Oid::new("A"), Oid::new("B"), Oid::new("C")]);
    }

    #[test]
    fn cycles_have_no_order() {
        let graph: GraphSpec = [
            DropSpec::data("A", "memory").with_consumers(["B"]),
            DropSpec::app("B", "copy").with_outputs(["A"]),
        ]
        .into_iter()
        .collect();
        assert!(graph.topological_order().is_none());
    }

    #[test]
    fn rejects_non_list() {
        assert!(GraphSpec::from_value(json!({"oid": "A"})).is_err());
    }
}
