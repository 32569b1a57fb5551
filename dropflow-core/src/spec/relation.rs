//! Relations between drops.

use crate::types::Oid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of relation one drop has to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkType {
    /// Application triggered when the data drop completes.
    Consumer,
    /// Application fed incrementally as data is written.
    StreamingConsumer,
    /// Application that writes the data drop.
    Producer,
    /// Container holding the drop.
    Parent,
    /// Drop held by a container.
    Child,
    /// Data drop read by an application.
    Input,
    /// Data drop streamed into an application.
    StreamingInput,
    /// Data drop written by an application.
    Output,
}

impl LinkType {
    /// Spec key under which this relation is declared.
    #[must_use]
    pub fn spec_key(self) -> &'static str {
        match self {
            Self::Consumer => "consumers",
            Self::StreamingConsumer => "streamingConsumers",
            Self::Producer => "producers",
            Self::Parent => "parent",
            Self::Child => "children",
            Self::Input => "inputs",
            Self::StreamingInput => "streamingInputs",
            Self::Output => "outputs",
        }
    }

    /// The relation seen from the other side.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Consumer => Self::Input,
            Self::StreamingConsumer => Self::StreamingInput,
            Self::Producer => Self::Output,
            Self::Parent => Self::Child,
            Self::Child => Self::Parent,
            Self::Input => Self::Consumer,
            Self::StreamingInput => Self::StreamingConsumer,
            Self::Output => Self::Producer,
        }
    }

    /// Whether `lhs` sits upstream of `rhs` in a relation of this type.
    ///
    /// Containers complete after their children, so a child is upstream of
    /// its parent.
    #[must_use]
    pub fn lhs_is_upstream(self) -> bool {
        matches!(
            self,
            Self::Producer | Self::Input | Self::StreamingInput | Self::Child
        )
    }

    /// Whether this relation delivers data incrementally.
    #[must_use]
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::StreamingConsumer | Self::StreamingInput)
    }

    /// Whether this relation is a container membership.
    #[must_use]
    pub fn is_containment(self) -> bool {
        matches!(self, Self::Parent | Self::Child)
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec_key())
    }
}

/// A relation between two drops, read as "`lhs` is `rel` of `rhs`".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropRel {
    /// Left-hand drop.
    pub lhs: Oid,
    /// Relation type.
    pub rel: LinkType,
    /// Right-hand drop.
    pub rhs: Oid,
}

impl DropRel {
    /// Create a relation.
    pub fn new(lhs: impl Into<Oid>, rel: LinkType, rhs: impl Into<Oid>) -> Self {
        Self {
            lhs: lhs.into(),
            rel,
            rhs: rhs.into(),
        }
    }

    /// The same relation stated from the other drop's side.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            lhs: self.rhs.clone(),
            rel: self.rel.inverse(),
            rhs: self.lhs.clone(),
        }
    }

    /// The directed edge this relation implies, upstream first.
    #[must_use]
    pub fn edge(&self) -> Edge {
        let (from, to) = if self.rel.lhs_is_upstream() {
            (self.lhs.clone(), self.rhs.clone())
        } else {
            (self.rhs.clone(), self.lhs.clone())
        };
        let kind = if self.rel.is_containment() {
            EdgeKind::Containment
        } else if self.rel.is_streaming() {
            EdgeKind::Streaming
        } else {
            EdgeKind::Data
        };
        Edge { from, to, kind }
    }
}

impl fmt::Display for DropRel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is {} of {}", self.lhs, self.rel, self.rhs)
    }
}

/// How a completion travels along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Downstream is notified when upstream completes.
    Data,
    /// Downstream additionally receives every write.
    Streaming,
    /// Upstream is a child of the downstream container.
    Containment,
}

/// A directed dependency between two drops.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Upstream drop.
    pub from: Oid,
    /// Downstream drop.
    pub to: Oid,
    /// Edge kind.
    pub kind: EdgeKind,
}

impl Edge {
    /// Create a plain data edge.
    pub fn data(from: impl Into<Oid>, to: impl Into<Oid>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: EdgeKind::Data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_relation_points_downstream() {
        // B is consumer of A
        let rel = DropRel::new("B", LinkType::Consumer, "A");
        assert_eq!(rel.edge(), Edge::data("A", "B"));
        assert_eq!(rel.inverse(), DropRel::new("A", LinkType::Input, "B"));
        assert_eq!(rel.inverse().edge(), rel.edge());
    }

    #[test]
    fn child_is_upstream_of_container() {
        let rel = DropRel::new("C", LinkType::Child, "P");
        let edge = rel.edge();
        assert_eq!(edge.from.as_str(), "C");
        assert_eq!(edge.to.as_str(), "P");
        assert_eq!(edge.kind, EdgeKind::Containment);
    }

    #[test]
    fn streaming_relations_keep_their_kind() {
        let edge = DropRel::new("A", LinkType::StreamingInput, "B").edge();
        assert_eq!(edge.kind, EdgeKind::Streaming);
        assert_eq!(edge.from.as_str(), "A");
    }
}
