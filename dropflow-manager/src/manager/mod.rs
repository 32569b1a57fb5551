//! The manager hierarchy.
//!
//! Node managers run sessions over local drops. Data island managers and
//! master managers own no drops; they route drop specs to subordinates by
//! the spec's `node` or `island` field and merge what the subordinates
//! report. Every level exposes the same [`DropManager`] surface, so a
//! master can drive islands or nodes, in process or over HTTP.

mod composite;
mod node;
mod report;

pub use composite::{CompositeManager, ManagerLevel};
pub use node::NodeManager;
pub use report::{SessionStatusReport, SubordinateStatus};

use dropflow_core::event::DropEvent;
use dropflow_core::spec::{DropSpec, GraphSpec};
use dropflow_core::types::{AppRunState, DropStatus, Oid, SessionId};
use dropflow_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by manager operations.
pub type ManagerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Drop specs of a session keyed by oid, as submitted.
pub type GraphView = BTreeMap<Oid, DropSpec>;

/// Status of every drop of a session keyed by oid.
pub type GraphStatus = BTreeMap<Oid, DropStatusEntry>;

/// One drop's entry in a [`GraphStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropStatusEntry {
    /// Drop status.
    pub status: DropStatus,
    /// Run-state, for application drops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_status: Option<AppRunState>,
}

/// An edge whose two ends live on different node managers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLink {
    /// Upstream drop.
    pub from: Oid,
    /// Downstream drop.
    pub to: Oid,
    /// Node hosting `from`.
    pub from_node: String,
    /// Node hosting `to`.
    pub to_node: String,
    /// Whether `to` consumes `from` as a stream.
    #[serde(default)]
    pub streaming: bool,
}

/// Who lists a manager as a subordinate, and what it currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerInfo {
    /// Manager identity.
    pub name: String,
    /// `node`, `island` or `master`.
    pub level: String,
    /// Subordinate identities, empty for node managers.
    pub hosts: Vec<String>,
    /// Sessions known to this manager.
    pub session_ids: Vec<SessionId>,
}

/// Operations shared by every manager level.
///
/// Composite managers implement each operation by fanning out to their
/// subordinates; [`ManagerClient`](crate::rpc::ManagerClient) implements it
/// over HTTP so any level can sit behind the RPC boundary.
pub trait DropManager: Send + Sync {
    /// Identity of this manager (a node or island name).
    fn name(&self) -> &str;

    /// Sessions this manager knows about, sorted.
    fn get_session_ids(&self) -> ManagerFuture<'_, Vec<SessionId>>;

    /// Create an empty session.
    ///
    /// # Errors
    ///
    /// [`SessionExists`](dropflow_core::DropflowError::SessionExists) if
    /// the id is taken.
    fn create_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()>;

    /// Tear a session down, deleting its drops.
    fn destroy_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()>;

    /// Append drop specs to a session that has not been deployed.
    ///
    /// The whole batch is validated first; a rejected batch changes
    /// nothing.
    fn add_graph_spec(&self, session_id: SessionId, graph: GraphSpec) -> ManagerFuture<'_, ()>;

    /// Instantiate the session's drops, then complete `completed`.
    fn deploy_session(&self, session_id: SessionId, completed: Vec<Oid>)
    -> ManagerFuture<'_, ()>;

    /// Cancel every drop that has not finished.
    fn cancel_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()>;

    /// Session status, per subordinate for composite managers.
    fn get_session_status(&self, session_id: SessionId)
    -> ManagerFuture<'_, SessionStatusReport>;

    /// Status of every deployed drop.
    fn get_graph_status(&self, session_id: SessionId) -> ManagerFuture<'_, GraphStatus>;

    /// Every drop spec submitted to the session.
    fn get_graph(&self, session_id: SessionId) -> ManagerFuture<'_, GraphView>;

    /// Register edges that cross to or from other node managers.
    fn add_node_subscriptions(
        &self,
        session_id: SessionId,
        links: Vec<RemoteLink>,
    ) -> ManagerFuture<'_, ()>;

    /// Complete data drops or start application drops by hand.
    fn trigger_drops(&self, session_id: SessionId, oids: Vec<Oid>) -> ManagerFuture<'_, ()>;

    /// Deliver an upstream drop's status from another node manager.
    fn deliver_event(&self, event: DropEvent) -> ManagerFuture<'_, ()>;

    /// Identity, subordinates and sessions of this manager.
    fn info(&self) -> ManagerFuture<'_, ManagerInfo>;
}
