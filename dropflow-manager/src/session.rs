//! Sessions: one graph fragment deployed on one node manager.

use crate::manager::{DropManager, DropStatusEntry, GraphStatus, GraphView, RemoteLink};
use dropflow_core::drop::{DropClassRegistry, DropEnv, DropObject, DropRef};
use dropflow_core::error::{DropflowError, Result};
use dropflow_core::event::DropEvent;
use dropflow_core::spec::{DropSpec, Edge, GraphSpec, collect_edges, topological_order};
use dropflow_core::types::{DropStatus, Oid, SessionId, SessionStatus};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// A session on a node manager.
///
/// Structural operations (append, deploy, cancel, destroy) serialize on
/// one lock. Drops run independently once deployed; the session status
/// rolls up from theirs when it is read.
pub struct Session {
    id: SessionId,
    node: String,
    registry: Arc<DropClassRegistry>,
    env: DropEnv,
    inner: Mutex<Inner>,
}

struct Inner {
    status: SessionStatus,
    specs: Vec<DropSpec>,
    reprodata: Option<Value>,
    drops: HashMap<Oid, DropRef>,
    links: Vec<RemoteLink>,
    /// Outbound links waiting for their drop to be instantiated.
    pending: Vec<(RemoteLink, Arc<dyn DropManager>)>,
    /// `(local oid, peer node)` pairs already forwarding events.
    forwarding: HashSet<(Oid, String)>,
    /// Remote upstream oid -> local drops waiting on it.
    inbound: HashMap<Oid, Vec<Oid>>,
    /// Set once the session is torn down; a deploy still in flight must
    /// not install its drops.
    destroyed: bool,
}

impl Inner {
    fn has_spec(&self, oid: &Oid) -> bool {
        self.specs.iter().any(|s| s.oid() == oid)
    }

    /// Move RUNNING to FINISHED or ERROR once every drop is terminal.
    fn refresh(&mut self) -> SessionStatus {
        if self.status == SessionStatus::Running
            && !self.drops.is_empty()
            && self.drops.values().all(|d| d.status().is_terminal())
        {
            let failed = self
                .drops
                .values()
                .any(|d| d.status() == DropStatus::Error);
            self.status = if failed {
                SessionStatus::Error
            } else {
                SessionStatus::Finished
            };
        }
        self.status
    }
}

impl Session {
    /// An empty session hosted by `node`.
    pub fn new(
        id: impl Into<SessionId>,
        node: impl Into<String>,
        registry: Arc<DropClassRegistry>,
        env: DropEnv,
    ) -> Self {
        Self {
            id: id.into(),
            node: node.into(),
            registry,
            env,
            inner: Mutex::new(Inner {
                status: SessionStatus::Pristine,
                specs: Vec::new(),
                reprodata: None,
                drops: HashMap::new(),
                links: Vec::new(),
                pending: Vec::new(),
                forwarding: HashSet::new(),
                inbound: HashMap::new(),
                destroyed: false,
            }),
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Name of the hosting node.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Environment shared by the session's drops.
    pub fn env(&self) -> &DropEnv {
        &self.env
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.inner.lock().refresh()
    }

    /// The deployed drop `oid`.
    pub fn drop(&self, oid: &str) -> Option<DropRef> {
        self.inner.lock().drops.get(oid).cloned()
    }

    /// Every deployed drop, in no particular order.
    pub fn drops(&self) -> Vec<DropRef> {
        self.inner.lock().drops.values().cloned().collect()
    }

    /// The graph-level reproducibility record, if one was submitted.
    pub fn reprodata(&self) -> Option<Value> {
        self.inner.lock().reprodata.clone()
    }

    /// Remote links registered so far.
    pub fn links(&self) -> Vec<RemoteLink> {
        self.inner.lock().links.clone()
    }

    /// Append drop specs.
    ///
    /// Specs without a `node` or naming another node, duplicate oids and
    /// unknown or mismatched dropclasses reject the whole batch. An empty
    /// batch changes nothing.
    pub fn add_graph_spec(&self, graph: GraphSpec) -> Result<()> {
        let (specs, reprodata) = graph.into_parts();
        let mut inner = self.inner.lock();
        match inner.status {
            SessionStatus::Pristine | SessionStatus::Building => {}
            status => {
                return Err(DropflowError::InvalidSessionState {
                    session_id: self.id.clone(),
                    operation: "addGraphSpec",
                    status,
                });
            }
        }

        {
            let mut seen: HashSet<&Oid> = inner.specs.iter().map(DropSpec::oid).collect();
            for spec in &specs {
                let Some(node) = spec.node() else {
                    return Err(DropflowError::MissingField {
                        oid: spec.oid().to_string(),
                        field: "node",
                    });
                };
                if node != self.node {
                    return Err(DropflowError::TargetMismatch {
                        oid: spec.oid().clone(),
                        field: "node",
                        target: node.to_string(),
                        manager: self.node.clone(),
                    });
                }
                if !seen.insert(spec.oid()) {
                    return Err(DropflowError::DuplicateOid {
                        oid: spec.oid().clone(),
                    });
                }
                self.registry.validate(spec)?;
            }
        }

        if specs.is_empty() {
            debug!(session_id = %self.id, "Empty graph spec ignored");
            return Ok(());
        }
        debug!(
            session_id = %self.id,
            added = specs.len(),
            total = inner.specs.len() + specs.len(),
            "Graph spec appended"
        );
        inner.specs.extend(specs);
        if reprodata.is_some() {
            inner.reprodata = reprodata;
        }
        inner.status = SessionStatus::Building;
        Ok(())
    }

    /// Submitted specs keyed by oid.
    pub fn graph(&self) -> GraphView {
        self.inner
            .lock()
            .specs
            .iter()
            .map(|s| (s.oid().clone(), s.clone()))
            .collect()
    }

    /// Status of every deployed drop.
    pub fn graph_status(&self) -> Result<GraphStatus> {
        let inner = self.inner.lock();
        if inner.drops.is_empty() && inner.status < SessionStatus::Running {
            return Err(DropflowError::InvalidSessionState {
                session_id: self.id.clone(),
                operation: "getGraphStatus",
                status: inner.status,
            });
        }
        Ok(inner
            .drops
            .iter()
            .map(|(oid, drop)| {
                let snap = drop.snapshot();
                (
                    oid.clone(),
                    DropStatusEntry {
                        status: snap.status,
                        exec_status: snap.exec_status,
                    },
                )
            })
            .collect())
    }

    /// Register edges crossing to or from other nodes.
    ///
    /// Inbound links make the local drop wait for the remote upstream.
    /// Outbound links forward the local drop's final status to `resolve`d
    /// peers. Before deployment they are kept and applied by
    /// [`deploy`](Self::deploy).
    pub fn add_links(
        &self,
        links: Vec<RemoteLink>,
        resolve: impl Fn(&str) -> Result<Arc<dyn DropManager>>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.status {
            SessionStatus::Pristine | SessionStatus::Building | SessionStatus::Running => {}
            status => {
                return Err(DropflowError::InvalidSessionState {
                    session_id: self.id.clone(),
                    operation: "addNodeSubscriptions",
                    status,
                });
            }
        }

        let mut outbound = Vec::new();
        for link in &links {
            let local_from = link.from_node == self.node;
            let local_to = link.to_node == self.node;
            let checked = match (local_from, local_to) {
                (true, true) => Err(DropflowError::InvalidLink {
                    from: link.from.clone(),
                    to: link.to.clone(),
                    cause: format!("both ends are on node '{}'", self.node),
                }),
                (false, false) => Err(DropflowError::TargetMismatch {
                    oid: link.from.clone(),
                    field: "node",
                    target: link.from_node.clone(),
                    manager: self.node.clone(),
                }),
                (true, false) => Ok(&link.from),
                (false, true) => Ok(&link.to),
            }?;
            if !inner.has_spec(checked) {
                return Err(DropflowError::UnknownOid {
                    session_id: self.id.clone(),
                    oid: checked.clone(),
                });
            }
            if local_from {
                outbound.push((link.clone(), resolve(&link.to_node)?));
            }
        }

        for link in &links {
            if link.to_node == self.node {
                inner
                    .inbound
                    .entry(link.from.clone())
                    .or_default()
                    .push(link.to.clone());
                if let Some(drop) = inner.drops.get(&link.to) {
                    drop.add_upstream(link.from.clone());
                }
            }
        }
        for (link, peer) in outbound {
            if inner.drops.contains_key(&link.from) {
                self.forward(&mut inner, &link, peer);
            } else {
                inner.pending.push((link, peer));
            }
        }
        debug!(session_id = %self.id, links = links.len(), "Remote links registered");
        inner.links.extend(links);
        Ok(())
    }

    /// Subscribe `link.from` so its final status reaches `peer`.
    fn forward(&self, inner: &mut Inner, link: &RemoteLink, peer: Arc<dyn DropManager>) {
        if !inner
            .forwarding
            .insert((link.from.clone(), link.to_node.clone()))
        {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(
                session_id = %self.id,
                oid = %link.from,
                peer = %link.to_node,
                "No async runtime; remote link will not forward events"
            );
            return;
        };
        let peer_name = link.to_node.clone();
        let listener = move |event: &DropEvent| {
            if !(event.status == DropStatus::Completed || event.status.is_failure()) {
                return;
            }
            let peer = Arc::clone(&peer);
            let peer_name = peer_name.clone();
            let event = event.clone();
            handle.spawn(async move {
                if let Err(e) = peer.deliver_event(event.clone()).await {
                    warn!(
                        session_id = %event.session_id,
                        oid = %event.oid,
                        peer = %peer_name,
                        error = %e,
                        "Failed to forward drop event"
                    );
                }
            });
        };
        self.env.bus.subscribe(link.from.clone(), Arc::new(listener));

        // The drop may have finished before the link arrived.
        if let Some(drop) = inner.drops.get(&link.from) {
            let status = drop.status();
            if status == DropStatus::Completed || status.is_failure() {
                drop.announce();
            }
        }
    }

    /// Instantiate every drop and wire up its relations, then complete
    /// `completed` in dependency order.
    ///
    /// Nothing is kept if any drop fails to build or link; the session
    /// returns to BUILDING. A session without specs cannot be deployed.
    pub fn deploy(&self, completed: &[Oid]) -> Result<()> {
        let (specs, links) = {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return Err(DropflowError::SessionNotFound {
                    session_id: self.id.clone(),
                });
            }
            if inner.status != SessionStatus::Building || inner.specs.is_empty() {
                return Err(DropflowError::InvalidSessionState {
                    session_id: self.id.clone(),
                    operation: "deploy",
                    status: inner.status,
                });
            }
            if let Some(oid) = completed.iter().find(|o| !inner.has_spec(o)) {
                return Err(DropflowError::UnknownOid {
                    session_id: self.id.clone(),
                    oid: oid.clone(),
                });
            }
            inner.status = SessionStatus::Deploying;
            (inner.specs.clone(), inner.links.clone())
        };
        info!(session_id = %self.id, node = %self.node, drops = specs.len(), "Deploying session");

        let edges = collect_edges(specs.iter().flat_map(DropSpec::relations));
        let drops = match self.instantiate(&specs, &edges, &links) {
            Ok(drops) => drops,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Deployment failed");
                let mut inner = self.inner.lock();
                if inner.status == SessionStatus::Deploying {
                    inner.status = SessionStatus::Building;
                }
                return Err(e);
            }
        };

        let installed = {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                Err(drops)
            } else {
                inner.drops = drops;
                for (link, peer) in std::mem::take(&mut inner.pending) {
                    self.forward(&mut inner, &link, peer);
                }
                if inner.status == SessionStatus::Cancelled {
                    Ok(true)
                } else {
                    inner.status = SessionStatus::Running;
                    Ok(false)
                }
            }
        };
        let cancelled = match installed {
            Ok(cancelled) => cancelled,
            Err(orphans) => {
                warn!(session_id = %self.id, "Session destroyed during deployment");
                self.delete_drops(orphans.values());
                return Err(DropflowError::SessionNotFound {
                    session_id: self.id.clone(),
                });
            }
        };
        if cancelled {
            self.cancel_drops();
            return Ok(());
        }
        info!(session_id = %self.id, "Session running");

        let oids: Vec<Oid> = specs.iter().map(|s| s.oid().clone()).collect();
        let order = topological_order(&oids, &edges).unwrap_or(oids);
        let completed: HashSet<&Oid> = completed.iter().collect();
        for oid in order.iter().filter(|o| completed.contains(o)) {
            let Some(drop) = self.drop(oid.as_str()) else {
                continue;
            };
            if drop.status().is_terminal() {
                continue;
            }
            if let Err(e) = drop.trigger() {
                warn!(session_id = %self.id, oid = %oid, error = %e, "Could not complete drop");
            }
        }
        Ok(())
    }

    fn instantiate(
        &self,
        specs: &[DropSpec],
        edges: &[Edge],
        links: &[RemoteLink],
    ) -> Result<HashMap<Oid, DropRef>> {
        let mut drops = HashMap::with_capacity(specs.len());
        for spec in specs {
            drops.insert(spec.oid().clone(), self.registry.build(spec, &self.env)?);
        }

        let linked = |edge: &Edge| {
            links
                .iter()
                .any(|l| l.from == edge.from && l.to == edge.to)
        };
        for edge in edges {
            match (drops.get(&edge.from), drops.get(&edge.to)) {
                (Some(up), Some(down)) => DropObject::link(up, down, edge.kind)?,
                (None, Some(_)) | (Some(_), None) if linked(edge) => {}
                (None, Some(_)) | (Some(_), None) => {
                    return Err(DropflowError::InvalidLink {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        cause: format!(
                            "one end is not in session {} and no remote link covers it",
                            self.id
                        ),
                    });
                }
                (None, None) => {}
            }
        }

        for link in links.iter().filter(|l| l.to_node == self.node) {
            if let Some(drop) = drops.get(&link.to) {
                drop.add_upstream(link.from.clone());
            }
        }
        Ok(drops)
    }

    /// Complete data drops or start application drops by hand.
    pub fn trigger_drops(&self, oids: &[Oid]) -> Result<()> {
        let drops = {
            let mut inner = self.inner.lock();
            let status = inner.refresh();
            if status != SessionStatus::Running {
                return Err(DropflowError::InvalidSessionState {
                    session_id: self.id.clone(),
                    operation: "triggerDrops",
                    status,
                });
            }
            oids.iter()
                .map(|oid| {
                    inner
                        .drops
                        .get(oid)
                        .cloned()
                        .ok_or_else(|| DropflowError::UnknownOid {
                            session_id: self.id.clone(),
                            oid: oid.clone(),
                        })
                })
                .collect::<Result<Vec<_>>>()?
        };

        let mut first_error = None;
        for drop in drops.iter().filter(|d| !d.status().is_terminal()) {
            if let Err(e) = drop.trigger() {
                warn!(session_id = %self.id, oid = %drop.oid(), error = %e, "Trigger failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Apply an upstream status reported by another node.
    pub fn deliver_event(&self, event: &DropEvent) {
        let targets: Vec<DropRef> = {
            let inner = self.inner.lock();
            inner
                .inbound
                .get(&event.oid)
                .map(|oids| {
                    oids.iter()
                        .filter_map(|o| inner.drops.get(o).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };
        if targets.is_empty() {
            debug!(session_id = %self.id, oid = %event.oid, "No local drop waits on remote event");
        }
        for drop in targets {
            drop.input_event(&event.oid, event.status);
        }
    }

    /// Cancel the session and every drop that has not finished.
    ///
    /// All drops are marked CANCELLED before any notification goes out, so
    /// dependents end up CANCELLED rather than SKIPPED.
    pub fn cancel(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            match inner.refresh() {
                SessionStatus::Cancelled => return Ok(()),
                status @ (SessionStatus::Finished | SessionStatus::Error) => {
                    return Err(DropflowError::InvalidSessionState {
                        session_id: self.id.clone(),
                        operation: "cancel",
                        status,
                    });
                }
                _ => inner.status = SessionStatus::Cancelled,
            }
        }
        info!(session_id = %self.id, "Session cancelled");
        self.cancel_drops();
        Ok(())
    }

    fn cancel_drops(&self) {
        let marked: Vec<DropRef> = self
            .drops()
            .into_iter()
            .filter(|d| d.mark_cancelled())
            .collect();
        for drop in &marked {
            drop.announce();
        }
    }

    /// Delete every drop and drop all listeners.
    ///
    /// A deployment still building its drops deletes them itself and fails.
    pub fn destroy(&self) {
        let drops = {
            let mut inner = self.inner.lock();
            inner.destroyed = true;
            inner.pending.clear();
            std::mem::take(&mut inner.drops)
        };
        self.env.bus.clear();
        self.delete_drops(drops.values());
        info!(session_id = %self.id, drops = drops.len(), "Session destroyed");
    }

    fn delete_drops<'a>(&self, drops: impl IntoIterator<Item = &'a DropRef>) {
        for drop in drops {
            if let Err(e) = drop.delete() {
                warn!(session_id = %self.id, oid = %drop.oid(), error = %e, "Failed to delete drop");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}
