//! Node manager: hosts sessions over local drops.

use super::{
    DropManager, GraphStatus, GraphView, ManagerFuture, ManagerInfo, RemoteLink,
    SessionStatusReport,
};
use crate::config::ManagerConfig;
use crate::manager_span;
use crate::rpc::ManagerClient;
use crate::session::Session;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dropflow_core::dispatch::Dispatcher;
use dropflow_core::drop::{DropClassRegistry, DropEnv};
use dropflow_core::error::{DropflowError, Result};
use dropflow_core::event::DropEvent;
use dropflow_core::spec::GraphSpec;
use dropflow_core::types::{Oid, SessionId};
use std::sync::Arc;
use tracing::{Instrument, debug, info};

/// Lowest level of the hierarchy. Owns drops and runs them.
pub struct NodeManager {
    name: String,
    config: ManagerConfig,
    registry: Arc<DropClassRegistry>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    sessions: DashMap<SessionId, Arc<Session>>,
    peers: DashMap<String, Arc<dyn DropManager>>,
}

impl NodeManager {
    /// A node manager with the built-in dropclasses.
    pub fn new(name: impl Into<String>, config: ManagerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            registry: Arc::new(DropClassRegistry::with_builtins()),
            dispatcher: None,
            sessions: DashMap::new(),
            peers: DashMap::new(),
        }
    }

    /// Use a custom dropclass registry.
    pub fn with_registry(mut self, registry: Arc<DropClassRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Run applications on `dispatcher` instead of the default one.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Make a peer node manager reachable for outbound remote links.
    pub fn register_peer(&self, peer: Arc<dyn DropManager>) {
        debug!(node = %self.name, peer = %peer.name(), "Peer registered");
        self.peers.insert(peer.name().to_string(), peer);
    }

    /// The session `session_id`.
    pub fn session(&self, session_id: &str) -> Result<Arc<Session>> {
        self.sessions
            .get(session_id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| DropflowError::SessionNotFound {
                session_id: SessionId::new(session_id),
            })
    }

    /// Configuration in use.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn resolve_peer(&self, node: &str) -> Result<Arc<dyn DropManager>> {
        if let Some(peer) = self.peers.get(node) {
            return Ok(Arc::clone(peer.value()));
        }
        if !self.config.peer_http {
            return Err(DropflowError::Unreachable {
                subordinate: node.to_string(),
                cause: "no handle registered for peer node".to_string(),
            });
        }
        let client: Arc<dyn DropManager> = Arc::new(ManagerClient::new(
            node,
            format!("http://{node}"),
            self.config.rpc_timeout(),
        )?);
        self.peers.insert(node.to_string(), Arc::clone(&client));
        Ok(client)
    }

    fn env(&self, session_id: &SessionId) -> DropEnv {
        let env = DropEnv::new(session_id.clone()).with_data_dir(&self.config.data_dir);
        match &self.dispatcher {
            Some(d) => env.with_dispatcher(Arc::clone(d)),
            None => env,
        }
    }
}

impl DropManager for NodeManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_session_ids(&self) -> ManagerFuture<'_, Vec<SessionId>> {
        Box::pin(async move {
            let mut ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
            ids.sort();
            Ok(ids)
        })
    }

    fn create_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()> {
        let span = manager_span!(self.name, "create_session", session_id);
        Box::pin(
            async move {
                match self.sessions.entry(session_id.clone()) {
                    Entry::Occupied(_) => {
                        Err(DropflowError::SessionExists { session_id })
                    }
                    Entry::Vacant(slot) => {
                        let env = self.env(&session_id);
                        slot.insert(Arc::new(Session::new(
                            session_id,
                            self.name.clone(),
                            Arc::clone(&self.registry),
                            env,
                        )));
                        info!("Session created");
                        Ok(())
                    }
                }
            }
            .instrument(span),
        )
    }

    fn destroy_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()> {
        let span = manager_span!(self.name, "destroy_session", session_id);
        Box::pin(
            async move {
                let (_, session) = self.sessions.remove(&session_id).ok_or(
                    DropflowError::SessionNotFound {
                        session_id: session_id.clone(),
                    },
                )?;
                session.destroy();
                Ok(())
            }
            .instrument(span),
        )
    }

    fn add_graph_spec(&self, session_id: SessionId, graph: GraphSpec) -> ManagerFuture<'_, ()> {
        Box::pin(async move { self.session(session_id.as_str())?.add_graph_spec(graph) })
    }

    fn deploy_session(
        &self,
        session_id: SessionId,
        completed: Vec<Oid>,
    ) -> ManagerFuture<'_, ()> {
        let span = manager_span!(self.name, "deploy_session", session_id);
        Box::pin(
            async move { self.session(session_id.as_str())?.deploy(&completed) }.instrument(span),
        )
    }

    fn cancel_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()> {
        Box::pin(async move { self.session(session_id.as_str())?.cancel() })
    }

    fn get_session_status(
        &self,
        session_id: SessionId,
    ) -> ManagerFuture<'_, SessionStatusReport> {
        Box::pin(async move {
            let status = self.session(session_id.as_str())?.status();
            Ok(SessionStatusReport::Leaf(status))
        })
    }

    fn get_graph_status(&self, session_id: SessionId) -> ManagerFuture<'_, GraphStatus> {
        Box::pin(async move { self.session(session_id.as_str())?.graph_status() })
    }

    fn get_graph(&self, session_id: SessionId) -> ManagerFuture<'_, GraphView> {
        Box::pin(async move { Ok(self.session(session_id.as_str())?.graph()) })
    }

    fn add_node_subscriptions(
        &self,
        session_id: SessionId,
        links: Vec<RemoteLink>,
    ) -> ManagerFuture<'_, ()> {
        Box::pin(async move {
            self.session(session_id.as_str())?
                .add_links(links, |node| self.resolve_peer(node))
        })
    }

    fn trigger_drops(&self, session_id: SessionId, oids: Vec<Oid>) -> ManagerFuture<'_, ()> {
        Box::pin(async move { self.session(session_id.as_str())?.trigger_drops(&oids) })
    }

    fn deliver_event(&self, event: DropEvent) -> ManagerFuture<'_, ()> {
        Box::pin(async move {
            self.session(event.session_id.as_str())?
                .deliver_event(&event);
            Ok(())
        })
    }

    fn info(&self) -> ManagerFuture<'_, ManagerInfo> {
        Box::pin(async move {
            Ok(ManagerInfo {
                name: self.name.clone(),
                level: "node".to_string(),
                hosts: Vec::new(),
                session_ids: self.get_session_ids().await?,
            })
        })
    }
}

impl std::fmt::Debug for NodeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeManager")
            .field("name", &self.name)
            .field("sessions", &self.sessions.len())
            .field("peers", &self.peers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropflow_core::dispatch::InlineDispatcher;
    use dropflow_core::spec::DropSpec;
    use dropflow_core::types::SessionStatus;

    fn node(name: &str) -> NodeManager {
        NodeManager::new(name, ManagerConfig::default()).with_dispatcher(Arc::new(InlineDispatcher))
    }

    #[tokio::test]
    async fn session_ids_are_unique() {
        let nm = node("nm-1");
        nm.create_session(SessionId::new("s1")).await.unwrap();
        let err = nm.create_session(SessionId::new("s1")).await.unwrap_err();
        assert!(matches!(err, DropflowError::SessionExists { .. }));
        assert_eq!(nm.get_session_ids().await.unwrap(), vec![SessionId::new("s1")]);
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let nm = node("nm-1");
        let err = nm
            .get_session_status(SessionId::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, DropflowError::SessionNotFound { .. }));
        assert!(nm.destroy_session(SessionId::new("nope")).await.is_err());
    }

    #[tokio::test]
    async fn status_is_a_leaf() {
        let nm = node("nm-1");
        let sid = SessionId::new("s1");
        nm.create_session(sid.clone()).await.unwrap();
        nm.add_graph_spec(
            sid.clone(),
            GraphSpec::new(vec![DropSpec::data("A", "memory").with_node("nm-1")]),
        )
        .await
        .unwrap();
        nm.deploy_session(sid.clone(), vec![Oid::new("A")])
            .await
            .unwrap();
        let report = nm.get_session_status(sid.clone()).await.unwrap();
        assert_eq!(report, SessionStatusReport::Leaf(SessionStatus::Finished));

        nm.destroy_session(sid.clone()).await.unwrap();
        assert!(nm.get_session_ids().await.unwrap().is_empty());
    }

    #[test]
    fn unknown_peer_is_unreachable_without_http() {
        let nm = node("nm-1");
        let err = nm.resolve_peer("nm-2").err().unwrap();
        assert!(err.is_unreachable());

        nm.register_peer(Arc::new(node("nm-2")));
        assert_eq!(nm.resolve_peer("nm-2").unwrap().name(), "nm-2");
    }
}
