//! Data island and master managers.
//!
//! A composite manager owns no drops. It keeps, per session, which
//! subordinate each oid was routed to, and turns every operation into
//! calls on the subordinates involved. Calls are bounded by the
//! configured RPC timeout and are not transactional: when some
//! subordinates fail, the error lists them alongside the ones that
//! succeeded.

use super::{
    DropManager, GraphStatus, GraphView, ManagerFuture, ManagerInfo, RemoteLink,
    SessionStatusReport, SubordinateStatus,
};
use crate::config::ManagerConfig;
use crate::manager_span;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dropflow_core::drop::DropClassRegistry;
use dropflow_core::error::{DropflowError, Result};
use dropflow_core::event::DropEvent;
use dropflow_core::spec::{DropSpec, EdgeKind, GraphSpec, collect_edges, topological_order};
use dropflow_core::types::{Oid, SessionId, SessionStatus};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, debug, info, warn};

/// Which level of the hierarchy a composite manager sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerLevel {
    /// Data island manager; subordinates are node managers.
    Island,
    /// Master manager; subordinates are data island managers.
    Master,
}

impl ManagerLevel {
    /// Drop spec field naming the subordinate a drop goes to.
    #[must_use]
    pub fn routing_field(self) -> &'static str {
        match self {
            Self::Island => "node",
            Self::Master => "island",
        }
    }

    /// Lowercase level name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Island => "island",
            Self::Master => "master",
        }
    }
}

impl fmt::Display for ManagerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a composite manager remembers about one session.
struct SessionRecord {
    status: SessionStatus,
    specs: Vec<DropSpec>,
    /// oid -> subordinate it was routed to.
    owners: HashMap<Oid, String>,
    /// Links received from the level above.
    links: Vec<RemoteLink>,
}

impl SessionRecord {
    fn new() -> Self {
        Self {
            status: SessionStatus::Pristine,
            specs: Vec::new(),
            owners: HashMap::new(),
            links: Vec::new(),
        }
    }

    /// Subordinates holding at least one drop.
    fn touched(&self) -> BTreeSet<String> {
        self.owners.values().cloned().collect()
    }

    /// Links for every edge whose ends were routed to different
    /// subordinates.
    ///
    /// An edge with an end outside the session is accepted only when a
    /// link from the level above covers it.
    fn remote_links(&self) -> Result<Vec<RemoteLink>> {
        let node_of: HashMap<&Oid, &str> = self
            .specs
            .iter()
            .filter_map(|s| s.node().map(|n| (s.oid(), n)))
            .collect();
        let edges = collect_edges(self.specs.iter().flat_map(DropSpec::relations));

        let mut links = Vec::new();
        for edge in edges {
            match (self.owners.get(&edge.from), self.owners.get(&edge.to)) {
                (Some(a), Some(b)) if a != b => links.push(RemoteLink {
                    from_node: node_of.get(&edge.from).copied().unwrap_or(a.as_str()).to_string(),
                    to_node: node_of.get(&edge.to).copied().unwrap_or(b.as_str()).to_string(),
                    streaming: edge.kind == EdgeKind::Streaming,
                    from: edge.from,
                    to: edge.to,
                }),
                (Some(_), Some(_)) => {}
                _ if self
                    .links
                    .iter()
                    .any(|l| l.from == edge.from && l.to == edge.to) => {}
                _ => {
                    return Err(DropflowError::InvalidLink {
                        from: edge.from,
                        to: edge.to,
                        cause: "one end is not part of the session".to_string(),
                    });
                }
            }
        }
        Ok(links)
    }
}

/// One subordinate call in a fan-out.
struct Target<A> {
    name: String,
    /// Drops involved, for error attribution.
    oids: Vec<Oid>,
    arg: A,
}

struct Outcome<T> {
    target: String,
    oids: Vec<Oid>,
    result: Result<T>,
}

/// Data island manager or master manager.
pub struct CompositeManager {
    name: String,
    level: ManagerLevel,
    config: ManagerConfig,
    registry: Arc<DropClassRegistry>,
    subordinates: BTreeMap<String, Arc<dyn DropManager>>,
    sessions: DashMap<SessionId, Arc<Mutex<SessionRecord>>>,
}

impl CompositeManager {
    /// A composite manager with no subordinates yet.
    pub fn new(name: impl Into<String>, level: ManagerLevel, config: ManagerConfig) -> Self {
        Self {
            name: name.into(),
            level,
            config,
            registry: Arc::new(DropClassRegistry::with_builtins()),
            subordinates: BTreeMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Data island manager over node managers.
    pub fn island(name: impl Into<String>, config: ManagerConfig) -> Self {
        Self::new(name, ManagerLevel::Island, config)
    }

    /// Master manager over data island managers.
    pub fn master(name: impl Into<String>, config: ManagerConfig) -> Self {
        Self::new(name, ManagerLevel::Master, config)
    }

    /// Add a subordinate, keyed by its name.
    pub fn with_subordinate(mut self, subordinate: Arc<dyn DropManager>) -> Self {
        self.subordinates
            .insert(subordinate.name().to_string(), subordinate);
        self
    }

    /// Validate dropclasses against `registry` instead of the built-ins.
    pub fn with_registry(mut self, registry: Arc<DropClassRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Level of this manager.
    pub fn level(&self) -> ManagerLevel {
        self.level
    }

    /// Names of the registered subordinates, sorted.
    pub fn subordinate_names(&self) -> Vec<String> {
        self.subordinates.keys().cloned().collect()
    }

    fn record(&self, session_id: &SessionId) -> Result<Arc<Mutex<SessionRecord>>> {
        self.sessions
            .get(session_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| DropflowError::SessionNotFound {
                session_id: session_id.clone(),
            })
    }

    /// The subordinate a spec routes to.
    fn route(&self, spec: &DropSpec) -> Result<String> {
        let field = self.level.routing_field();
        let missing = || DropflowError::MissingField {
            oid: spec.oid().to_string(),
            field,
        };
        let target = match self.level {
            ManagerLevel::Island => {
                if let Some(island) = spec.island()
                    && island != self.name
                {
                    return Err(DropflowError::TargetMismatch {
                        oid: spec.oid().clone(),
                        field: "island",
                        target: island.to_string(),
                        manager: self.name.clone(),
                    });
                }
                spec.node().ok_or_else(missing)?
            }
            ManagerLevel::Master => {
                // Islands route by node, so it has to be there already.
                if spec.node().is_none() {
                    return Err(DropflowError::MissingField {
                        oid: spec.oid().to_string(),
                        field: "node",
                    });
                }
                spec.island().ok_or_else(missing)?
            }
        };
        if !self.subordinates.contains_key(target) {
            return Err(DropflowError::UnknownTarget {
                oid: spec.oid().clone(),
                field,
                target: target.to_string(),
            });
        }
        Ok(target.to_string())
    }

    /// Subordinates a link has to reach.
    fn link_targets(&self, link: &RemoteLink, record: &SessionRecord) -> BTreeSet<String> {
        match self.level {
            ManagerLevel::Island => [&link.from_node, &link.to_node]
                .into_iter()
                .filter(|n| self.subordinates.contains_key(n.as_str()))
                .cloned()
                .collect(),
            ManagerLevel::Master => [&link.from, &link.to]
                .into_iter()
                .filter_map(|oid| record.owners.get(oid).cloned())
                .collect(),
        }
    }

    /// Group `oids` by owning subordinate.
    fn by_owner(
        &self,
        session_id: &SessionId,
        record: &SessionRecord,
        oids: &[Oid],
    ) -> Result<BTreeMap<String, Vec<Oid>>> {
        let mut groups: BTreeMap<String, Vec<Oid>> = BTreeMap::new();
        for oid in oids {
            let owner = record
                .owners
                .get(oid)
                .ok_or_else(|| DropflowError::UnknownOid {
                    session_id: session_id.clone(),
                    oid: oid.clone(),
                })?;
            groups.entry(owner.clone()).or_default().push(oid.clone());
        }
        Ok(groups)
    }

    /// Subordinates holding the session's drops, or every subordinate if
    /// no drops were appended yet.
    fn holders(&self, record: &SessionRecord) -> Vec<Target<()>> {
        let touched = record.touched();
        let names: Vec<String> = if touched.is_empty() {
            self.subordinate_names()
        } else {
            touched.into_iter().collect()
        };
        names.into_iter().map(|name| target(name, Vec::new(), ())).collect()
    }

    fn everyone(&self) -> Vec<Target<()>> {
        self.subordinate_names()
            .into_iter()
            .map(|name| target(name, Vec::new(), ()))
            .collect()
    }

    /// Run `call` on every target concurrently, each bounded by the RPC
    /// timeout.
    async fn gather<A, T, F>(&self, targets: Vec<Target<A>>, call: F) -> Vec<Outcome<T>>
    where
        A: Send,
        T: Send,
        F: for<'m> Fn(&'m dyn DropManager, A) -> ManagerFuture<'m, T> + Sync,
    {
        let timeout = self.config.rpc_timeout();
        let call = &call;
        let calls = targets.into_iter().map(|t| async move {
            let Target { name, oids, arg } = t;
            let result = match self.subordinates.get(&name) {
                Some(sub) => match tokio::time::timeout(timeout, call(sub.as_ref(), arg)).await {
                    Ok(result) => result,
                    Err(_) => Err(DropflowError::Unreachable {
                        subordinate: name.clone(),
                        cause: format!("no answer within {}ms", timeout.as_millis()),
                    }),
                },
                None => Err(DropflowError::Unreachable {
                    subordinate: name.clone(),
                    cause: "not a registered subordinate".to_string(),
                }),
            };
            Outcome {
                target: name,
                oids,
                result,
            }
        });
        join_all(calls).await
    }

    /// Fan out and fail with [`DropflowError::PartialFailure`] unless every
    /// subordinate succeeded.
    async fn fan_out<A, T, F>(
        &self,
        operation: &'static str,
        targets: Vec<Target<A>>,
        call: F,
    ) -> Result<Vec<(String, T)>>
    where
        A: Send,
        T: Send,
        F: for<'m> Fn(&'m dyn DropManager, A) -> ManagerFuture<'m, T> + Sync,
    {
        let outcomes = self.gather(targets, call).await;
        settle(operation, outcomes)
    }

    async fn deploy(&self, session_id: &SessionId, completed: &[Oid]) -> Result<()> {
        let record = self.record(session_id)?;
        let (links, link_targets, holders, triggers) = {
            let mut rec = record.lock();
            if rec.status != SessionStatus::Building {
                return Err(DropflowError::InvalidSessionState {
                    session_id: session_id.clone(),
                    operation: "deploy",
                    status: rec.status,
                });
            }
            if let Some(oid) = completed.iter().find(|o| !rec.owners.contains_key(*o)) {
                return Err(DropflowError::UnknownOid {
                    session_id: session_id.clone(),
                    oid: oid.clone(),
                });
            }
            let links = rec.remote_links()?;

            let oids: Vec<Oid> = rec.specs.iter().map(|s| s.oid().clone()).collect();
            let edges = collect_edges(rec.specs.iter().flat_map(DropSpec::relations));
            let wanted: HashSet<&Oid> = completed.iter().collect();
            let ordered: Vec<Oid> = match topological_order(&oids, &edges) {
                Some(order) => order.into_iter().filter(|o| wanted.contains(o)).collect(),
                None => completed.to_vec(),
            };
            let triggers = self.by_owner(session_id, &rec, &ordered)?;

            let mut link_targets: BTreeMap<String, Vec<RemoteLink>> = BTreeMap::new();
            for link in &links {
                for name in self.link_targets(link, &rec) {
                    link_targets.entry(name).or_default().push(link.clone());
                }
            }
            rec.status = SessionStatus::Deploying;
            (links, link_targets, self.holders(&rec), triggers)
        };
        debug!(remote_links = links.len(), "Remote links computed");

        let restore = |status| {
            let mut rec = record.lock();
            if rec.status == SessionStatus::Deploying {
                rec.status = status;
            }
        };

        if !link_targets.is_empty() {
            let targets = link_targets
                .into_iter()
                .map(|(name, links)| {
                    let oids = links.iter().map(|l| l.from.clone()).collect();
                    target(name, oids, links)
                })
                .collect();
            if let Err(e) = self
                .fan_out("addNodeSubscriptions", targets, |m, links| {
                    m.add_node_subscriptions(session_id.clone(), links)
                })
                .await
            {
                restore(SessionStatus::Building);
                return Err(e);
            }
        }

        // Every subordinate deploys before anything is triggered, so no
        // remote event can arrive at a drop that does not exist yet.
        let deployed = self
            .fan_out("deploySession", holders, |m, ()| {
                m.deploy_session(session_id.clone(), Vec::new())
            })
            .await;
        restore(SessionStatus::Running);
        deployed?;

        if !triggers.is_empty() {
            let targets = triggers
                .into_iter()
                .map(|(name, oids)| target(name, oids.clone(), oids))
                .collect();
            self.fan_out("triggerDrops", targets, |m, oids| {
                m.trigger_drops(session_id.clone(), oids)
            })
            .await?;
        }
        info!(subordinates = ?record.lock().touched(), "Session deployed");
        Ok(())
    }

    async fn append(&self, session_id: &SessionId, graph: GraphSpec) -> Result<()> {
        let record = self.record(session_id)?;
        let (specs, reprodata) = graph.into_parts();
        let groups = {
            let rec = record.lock();
            match rec.status {
                SessionStatus::Pristine | SessionStatus::Building => {}
                status => {
                    return Err(DropflowError::InvalidSessionState {
                        session_id: session_id.clone(),
                        operation: "addGraphSpec",
                        status,
                    });
                }
            }
            let mut seen: HashSet<&Oid> = rec.owners.keys().collect();
            let mut groups: BTreeMap<String, Vec<DropSpec>> = BTreeMap::new();
            for spec in &specs {
                let owner = self.route(spec)?;
                if !seen.insert(spec.oid()) {
                    return Err(DropflowError::DuplicateOid {
                        oid: spec.oid().clone(),
                    });
                }
                self.registry.validate(spec)?;
                groups.entry(owner).or_default().push(spec.clone());
            }
            groups
        };

        let targets: Vec<Target<GraphSpec>> = groups
            .into_iter()
            .map(|(name, specs)| {
                let oids = specs.iter().map(|s| s.oid().clone()).collect();
                let mut graph = GraphSpec::new(specs);
                if let Some(r) = &reprodata {
                    graph = graph.with_reprodata(r.clone());
                }
                target(name, oids, graph)
            })
            .collect();
        let mut batches: HashMap<String, Vec<Oid>> = targets
            .iter()
            .map(|t| (t.name.clone(), t.oids.clone()))
            .collect();

        let outcomes = self
            .gather(targets, |m, graph| m.add_graph_spec(session_id.clone(), graph))
            .await;

        {
            let mut rec = record.lock();
            for outcome in outcomes.iter().filter(|o| o.result.is_ok()) {
                let Some(oids) = batches.remove(&outcome.target) else {
                    continue;
                };
                let accepted: HashSet<&Oid> = oids.iter().collect();
                rec.specs
                    .extend(specs.iter().filter(|s| accepted.contains(s.oid())).cloned());
                for oid in oids {
                    rec.owners.insert(oid, outcome.target.clone());
                }
            }
            if !rec.owners.is_empty() {
                rec.status = SessionStatus::Building;
            }
        }
        settle("addGraphSpec", outcomes).map(|_| ())
    }

    async fn subscribe(&self, session_id: &SessionId, links: Vec<RemoteLink>) -> Result<()> {
        let record = self.record(session_id)?;
        let targets = {
            let mut rec = record.lock();
            match rec.status {
                SessionStatus::Pristine | SessionStatus::Building | SessionStatus::Running => {}
                status => {
                    return Err(DropflowError::InvalidSessionState {
                        session_id: session_id.clone(),
                        operation: "addNodeSubscriptions",
                        status,
                    });
                }
            }
            let mut groups: BTreeMap<String, Vec<RemoteLink>> = BTreeMap::new();
            for link in &links {
                let names = self.link_targets(link, &rec);
                if names.is_empty() {
                    return Err(DropflowError::TargetMismatch {
                        oid: link.from.clone(),
                        field: self.level.routing_field(),
                        target: link.from_node.clone(),
                        manager: self.name.clone(),
                    });
                }
                for name in names {
                    groups.entry(name).or_default().push(link.clone());
                }
            }
            rec.links.extend(links);
            groups
                .into_iter()
                .map(|(name, links)| {
                    let oids = links.iter().map(|l| l.from.clone()).collect();
                    target(name, oids, links)
                })
                .collect()
        };
        self.fan_out("addNodeSubscriptions", targets, |m, links| {
            m.add_node_subscriptions(session_id.clone(), links)
        })
        .await
        .map(|_| ())
    }

    async fn status(&self, session_id: &SessionId) -> Result<SessionStatusReport> {
        let record = self.record(session_id)?;
        let holders = self.holders(&record.lock());
        let outcomes = self
            .gather(holders, |m, ()| m.get_session_status(session_id.clone()))
            .await;
        let report = outcomes
            .into_iter()
            .map(|o| {
                let status = match o.result {
                    Ok(report) => SubordinateStatus::Reported(report),
                    Err(DropflowError::Unreachable { cause, .. }) => {
                        warn!(subordinate = %o.target, cause = %cause, "Subordinate unreachable");
                        SubordinateStatus::Unreachable { unreachable: cause }
                    }
                    Err(e) => SubordinateStatus::Failed {
                        error: e.into_subordinate_failure(o.target.clone(), o.oids),
                    },
                };
                (o.target, status)
            })
            .collect();
        Ok(SessionStatusReport::Composite(report))
    }

    async fn graph_status(&self, session_id: &SessionId) -> Result<GraphStatus> {
        let record = self.record(session_id)?;
        let holders = {
            let rec = record.lock();
            if rec.status < SessionStatus::Running {
                return Err(DropflowError::InvalidSessionState {
                    session_id: session_id.clone(),
                    operation: "getGraphStatus",
                    status: rec.status,
                });
            }
            self.holders(&rec)
        };
        let parts = self
            .fan_out("getGraphStatus", holders, |m, ()| {
                m.get_graph_status(session_id.clone())
            })
            .await?;
        Ok(parts.into_iter().flat_map(|(_, status)| status).collect())
    }

    async fn graph(&self, session_id: &SessionId) -> Result<GraphView> {
        let record = self.record(session_id)?;
        let holders = {
            let rec = record.lock();
            if rec.owners.is_empty() {
                return Ok(GraphView::new());
            }
            self.holders(&rec)
        };
        let parts = self
            .fan_out("getGraph", holders, |m, ()| m.get_graph(session_id.clone()))
            .await?;
        Ok(parts.into_iter().flat_map(|(_, graph)| graph).collect())
    }

    async fn trigger(&self, session_id: &SessionId, oids: &[Oid]) -> Result<()> {
        let record = self.record(session_id)?;
        let groups = {
            let rec = record.lock();
            if rec.status != SessionStatus::Running {
                return Err(DropflowError::InvalidSessionState {
                    session_id: session_id.clone(),
                    operation: "triggerDrops",
                    status: rec.status,
                });
            }
            self.by_owner(session_id, &rec, oids)?
        };
        let targets = groups
            .into_iter()
            .map(|(name, oids)| target(name, oids.clone(), oids))
            .collect();
        self.fan_out("triggerDrops", targets, |m, oids| {
            m.trigger_drops(session_id.clone(), oids)
        })
        .await
        .map(|_| ())
    }

    async fn deliver(&self, event: DropEvent) -> Result<()> {
        let record = self.record(&event.session_id)?;
        let targets: Vec<Target<()>> = {
            let rec = record.lock();
            let mut names = BTreeSet::new();
            for link in rec.links.iter().filter(|l| l.from == event.oid) {
                match self.level {
                    ManagerLevel::Island => {
                        if self.subordinates.contains_key(link.to_node.as_str()) {
                            names.insert(link.to_node.clone());
                        }
                    }
                    ManagerLevel::Master => {
                        if let Some(owner) = rec.owners.get(&link.to) {
                            names.insert(owner.clone());
                        }
                    }
                }
            }
            names
                .into_iter()
                .map(|name| target(name, vec![event.oid.clone()], ()))
                .collect()
        };
        let event = &event;
        self.fan_out("deliverEvent", targets, |m, ()| m.deliver_event(event.clone()))
            .await
            .map(|_| ())
    }
}

fn target<A>(name: String, oids: Vec<Oid>, arg: A) -> Target<A> {
    Target { name, oids, arg }
}

fn settle<T>(operation: &'static str, outcomes: Vec<Outcome<T>>) -> Result<Vec<(String, T)>> {
    let mut succeeded = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(value) => succeeded.push((outcome.target, value)),
            Err(e) => {
                warn!(
                    operation,
                    subordinate = %outcome.target,
                    error = %e,
                    "Subordinate call failed"
                );
                failures.push(e.into_subordinate_failure(outcome.target, outcome.oids));
            }
        }
    }
    if failures.is_empty() {
        Ok(succeeded)
    } else {
        Err(DropflowError::PartialFailure {
            operation,
            failures,
            succeeded: succeeded.into_iter().map(|(name, _)| name).collect(),
        })
    }
}

impl DropManager for CompositeManager {
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
                        return Err(DropflowError::SessionExists { session_id });
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(Arc::new(Mutex::new(SessionRecord::new())));
                    }
                }
                let sid = &session_id;
                self.fan_out("createSession", self.everyone(), |m, ()| {
                    m.create_session(sid.clone())
                })
                .await?;
                info!("Session created");
                Ok(())
            }
            .instrument(span),
        )
    }

    fn destroy_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()> {
        let span = manager_span!(self.name, "destroy_session", session_id);
        Box::pin(
            async move {
                if self.sessions.remove(&session_id).is_none() {
                    return Err(DropflowError::SessionNotFound { session_id });
                }
                let sid = &session_id;
                self.fan_out("destroySession", self.everyone(), |m, ()| {
                    m.destroy_session(sid.clone())
                })
                .await?;
                info!("Session destroyed");
                Ok(())
            }
            .instrument(span),
        )
    }

    fn add_graph_spec(&self, session_id: SessionId, graph: GraphSpec) -> ManagerFuture<'_, ()> {
        let span = manager_span!(self.name, "add_graph_spec", session_id);
        Box::pin(async move { self.append(&session_id, graph).await }.instrument(span))
    }

    fn deploy_session(
        &self,
        session_id: SessionId,
        completed: Vec<Oid>,
    ) -> ManagerFuture<'_, ()> {
        let span = manager_span!(self.name, "deploy_session", session_id);
        Box::pin(async move { self.deploy(&session_id, &completed).await }.instrument(span))
    }

    fn cancel_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()> {
        let span = manager_span!(self.name, "cancel_session", session_id);
        Box::pin(
            async move {
                let record = self.record(&session_id)?;
                let holders = {
                    let mut rec = record.lock();
                    if !rec.status.is_terminal() {
                        rec.status = SessionStatus::Cancelled;
                    }
                    self.holders(&rec)
                };
                let sid = &session_id;
                self.fan_out("cancelSession", holders, |m, ()| {
                    m.cancel_session(sid.clone())
                })
                .await
                .map(|_| ())
            }
            .instrument(span),
        )
    }

    fn get_session_status(
        &self,
        session_id: SessionId,
    ) -> ManagerFuture<'_, SessionStatusReport> {
        Box::pin(async move { self.status(&session_id).await })
    }

    fn get_graph_status(&self, session_id: SessionId) -> ManagerFuture<'_, GraphStatus> {
        Box::pin(async move { self.graph_status(&session_id).await })
    }

    fn get_graph(&self, session_id: SessionId) -> ManagerFuture<'_, GraphView> {
        Box::pin(async move { self.graph(&session_id).await })
    }

    fn add_node_subscriptions(
        &self,
        session_id: SessionId,
        links: Vec<RemoteLink>,
    ) -> ManagerFuture<'_, ()> {
        Box::pin(async move { self.subscribe(&session_id, links).await })
    }

    fn trigger_drops(&self, session_id: SessionId, oids: Vec<Oid>) -> ManagerFuture<'_, ()> {
        Box::pin(async move { self.trigger(&session_id, &oids).await })
    }

    fn deliver_event(&self, event: DropEvent) -> ManagerFuture<'_, ()> {
        Box::pin(async move { self.deliver(event).await })
    }

    fn info(&self) -> ManagerFuture<'_, ManagerInfo> {
        Box::pin(async move {
            Ok(ManagerInfo {
                name: self.name.clone(),
                level: self.level.as_str().to_string(),
                hosts: self.subordinate_names(),
                session_ids: self.get_session_ids().await?,
            })
        })
    }
}

impl fmt::Debug for CompositeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeManager")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("subordinates", &self.subordinates.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::NodeManager;
    use dropflow_core::dispatch::InlineDispatcher;

    fn island(nodes: &[&str]) -> CompositeManager {
        nodes.iter().fold(
            CompositeManager::island("island-1", ManagerConfig::default()),
            |dim, name| {
                let nm = NodeManager::new(*name, ManagerConfig::default())
                    .with_dispatcher(Arc::new(InlineDispatcher));
                dim.with_subordinate(Arc::new(nm))
            },
        )
    }

    #[test]
    fn routing_field_follows_level() {
        assert_eq!(ManagerLevel::Island.routing_field(), "node");
        assert_eq!(ManagerLevel::Master.routing_field(), "island");
        assert_eq!(
            serde_json::to_string(&ManagerLevel::Master).unwrap(),
            "\"master\""
        );
    }

    #[test]
    fn specs_route_by_node() {
        let dim = island(&["nm-1", "nm-2"]);
        let spec = DropSpec::data("A", "memory").with_node("nm-2");
        assert_eq!(dim.route(&spec).unwrap(), "nm-2");

        let err = dim.route(&DropSpec::data("A", "memory")).unwrap_err();
        assert!(matches!(err, DropflowError::MissingField { field: "node", .. }));

        let err = dim
            .route(&DropSpec::data("A", "memory").with_node("unknown_host"))
            .unwrap_err();
        assert!(matches!(err, DropflowError::UnknownTarget { .. }));

        let err = dim
            .route(
                &DropSpec::data("A", "memory")
                    .with_node("nm-1")
                    .with_island("island-9"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DropflowError::TargetMismatch {
                field: "island",
                ..
            }
        ));
    }

    #[test]
    fn master_needs_node_and_island() {
        let mm = CompositeManager::master("master", ManagerConfig::default())
            .with_subordinate(Arc::new(island(&["nm-1"])));
        let err = mm
            .route(&DropSpec::data("A", "memory").with_island("island-1"))
            .unwrap_err();
        assert!(matches!(err, DropflowError::MissingField { field: "node", .. }));

        let err = mm
            .route(&DropSpec::data("A", "memory").with_node("nm-1"))
            .unwrap_err();
        assert!(matches!(
            err,
            DropflowError::MissingField {
                field: "island",
                ..
            }
        ));

        let spec = DropSpec::data("A", "memory")
            .with_node("nm-1")
            .with_island("island-1");
        assert_eq!(mm.route(&spec).unwrap(), "island-1");
    }

    #[test]
    fn cross_owner_edges_become_links() {
        let mut rec = SessionRecord::new();
        rec.specs = vec![
            DropSpec::data("A", "memory")
                .with_node("nm-1")
                .with_consumers(["B"]),
            DropSpec::app("B", "copy").with_node("nm-2"),
        ];
        rec.owners.insert(Oid::new("A"), "nm-1".into());
        rec.owners.insert(Oid::new("B"), "nm-2".into());
        let links = rec.remote_links().unwrap();
        assert_eq!(
            links,
            vec![RemoteLink {
                from: Oid::new("A"),
                to: Oid::new("B"),
                from_node: "nm-1".into(),
                to_node: "nm-2".into(),
                streaming: false,
            }]
        );

        rec.specs.push(DropSpec::app("C", "copy").with_node("nm-1").with_links(
            dropflow_core::spec::LinkType::Input,
            ["ghost"],
        ));
        rec.owners.insert(Oid::new("C"), "nm-1".into());
        assert!(matches!(
            rec.remote_links().unwrap_err(),
            DropflowError::InvalidLink { .. }
        ));
    }

    #[tokio::test]
    async fn failed_subordinates_are_named() {
        let dim = island(&["nm-1"]);
        let outcomes = dim
            .gather(
                vec![
                    target("nm-1".to_string(), Vec::new(), ()),
                    target("nm-9".to_string(), vec![Oid::new("X")], ()),
                ],
                |m, ()| m.get_session_ids(),
            )
            .await;
        let err = settle("getSessionIds", outcomes).unwrap_err();
        match err {
            DropflowError::PartialFailure {
                failures,
                succeeded,
                ..
            } => {
                assert_eq!(succeeded, vec!["nm-1".to_string()]);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].subordinate, "nm-9");
                assert_eq!(failures[0].oids, vec![Oid::new("X")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
