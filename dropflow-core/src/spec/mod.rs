//! Physical graph specs.
//!
//! A physical graph arrives as a JSON list of drop specs. Each spec names its
//! implementation (`dropclass`), its target manager (`node`, `island`) and
//! its relations to other drops. Relations may be declared on either end of
//! an edge; [`GraphSpec::edges`] normalizes them.

mod drop_spec;
mod graph;
mod relation;

pub use drop_spec::{DropCategory, DropSpec};
pub use graph::{GraphSpec, collect_edges, topological_order};
pub use relation::{DropRel, Edge, EdgeKind, LinkType};
