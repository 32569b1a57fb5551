//! The drop state machine.

use super::app::{AppContext, Application};
use super::checksum::Checksummer;
use super::io::{ChunkReader, DataIo};
use crate::dispatch::{Dispatcher, default_dispatcher};
use crate::error::{DropflowError, Result};
use crate::event::{DropEvent, EventBus};
use crate::spec::{DropCategory, DropSpec, EdgeKind};
use crate::types::{
    AppRunState, ChecksumType, DropPhase, DropStatus, ExecutionMode, Oid, SessionId, Uid,
};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Shared handle to a live drop.
pub type DropRef = Arc<DropObject>;

/// Chunk size used by [`DropReader`] unless overridden.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// What a drop holds.
pub enum Payload {
    /// Bytes in a storage backend.
    Data(Box<dyn DataIo>),
    /// Code to run.
    App(Box<dyn Application>),
    /// Nothing; completes with its children.
    Container,
}

impl Payload {
    fn category(&self) -> DropCategory {
        match self {
            Self::Data(_) => DropCategory::Data,
            Self::App(_) => DropCategory::Application,
            Self::Container => DropCategory::Container,
        }
    }
}

/// Everything a drop shares with the rest of its session.
#[derive(Clone)]
pub struct DropEnv {
    /// Owning session.
    pub session_id: SessionId,
    /// Session event bus.
    pub bus: Arc<EventBus>,
    /// Executor for application runs.
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Root directory for file-backed drops.
    pub data_dir: PathBuf,
    /// Checksum algorithm for data drops.
    pub checksum_type: ChecksumType,
}

impl DropEnv {
    /// Environment with a fresh bus, the default dispatcher and a data
    /// directory under the system temp dir.
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            bus: Arc::new(EventBus::new()),
            dispatcher: default_dispatcher(),
            data_dir: std::env::temp_dir().join("dropflow"),
            checksum_type: ChecksumType::default(),
        }
    }

    /// Use a specific dispatcher.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Use a specific data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Use a specific checksum algorithm.
    pub fn with_checksum_type(mut self, kind: ChecksumType) -> Self {
        self.checksum_type = kind;
        self
    }
}

impl fmt::Debug for DropEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropEnv")
            .field("session_id", &self.session_id)
            .field("dispatcher", &self.dispatcher.name())
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

/// Point-in-time view of a drop, taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropSnapshot {
    /// Object id.
    pub oid: Oid,
    /// Instance id.
    pub uid: Uid,
    /// Category.
    pub category: DropCategory,
    /// Status.
    pub status: DropStatus,
    /// Storage tier.
    pub phase: DropPhase,
    /// Run-state, for application drops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_status: Option<AppRunState>,
    /// Checksum of the bytes written so far, for data drops that saw writes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u32>,
    /// Algorithm behind `checksum`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_type: Option<ChecksumType>,
    /// Bytes written.
    pub size: u64,
    /// Failure reason, if the drop failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

struct State {
    status: DropStatus,
    run_state: AppRunState,
    checksum: Option<Checksummer>,
    size: u64,
    /// Upstream drops whose terminal status this drop waits on.
    upstream: HashSet<Oid>,
    /// Upstream drops that already reported.
    reported: HashSet<Oid>,
    failure: Option<String>,
}

#[derive(Clone)]
struct Link {
    oid: Oid,
    drop: Weak<DropObject>,
}

#[derive(Default)]
struct Links {
    consumers: Vec<Link>,
    streaming_consumers: Vec<Link>,
    producers: Vec<Link>,
    inputs: Vec<Link>,
    streaming_inputs: Vec<Link>,
    outputs: Vec<Link>,
    parent: Option<Link>,
    children: Vec<Link>,
}

fn push_link(list: &mut Vec<Link>, target: &DropRef) {
    if !list.iter().any(|l| l.oid == target.oid) {
        list.push(Link {
            oid: target.oid.clone(),
            drop: Arc::downgrade(target),
        });
    }
}

fn upgrade(list: &[Link]) -> Vec<DropRef> {
    list.iter().filter_map(|l| l.drop.upgrade()).collect()
}

enum Next {
    Nothing,
    Run,
    Transition(DropStatus),
}

/// A live drop: a data container, an application, or a container of drops.
///
/// Data flows in through [`write`](Self::write) and out through
/// [`open`](Self::open). Completion travels downstream as status events:
/// a drop that reaches a terminal status reports it to every consumer,
/// output and parent. A data drop completes once every producer reported
/// COMPLETED; an application runs once every input did. Failures are
/// mirrored downstream (applications become SKIPPED) so nothing waits
/// forever.
pub struct DropObject {
    oid: Oid,
    uid: Uid,
    session_id: SessionId,
    category: DropCategory,
    dropclass: String,
    execution_mode: ExecutionMode,
    expected_size: Option<u64>,
    checksum_type: ChecksumType,
    payload: Payload,
    state: Mutex<State>,
    links: RwLock<Links>,
    status_tx: watch::Sender<DropStatus>,
    open_readers: AtomicUsize,
    bus: Arc<EventBus>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl DropObject {
    /// Create a drop for `spec` around `payload`. The category follows the
    /// payload.
    pub fn new(spec: &DropSpec, payload: Payload, env: &DropEnv) -> DropRef {
        let (status_tx, _) = watch::channel(DropStatus::Initialized);
        Arc::new(Self {
            oid: spec.oid().clone(),
            uid: spec.uid().clone(),
            session_id: env.session_id.clone(),
            category: payload.category(),
            dropclass: spec.dropclass().to_string(),
            execution_mode: spec.execution_mode(),
            expected_size: spec.expected_size(),
            checksum_type: env.checksum_type,
            payload,
            state: Mutex::new(State {
                status: DropStatus::Initialized,
                run_state: AppRunState::NotRun,
                checksum: None,
                size: 0,
                upstream: HashSet::new(),
                reported: HashSet::new(),
                failure: None,
            }),
            links: RwLock::new(Links::default()),
            status_tx,
            open_readers: AtomicUsize::new(0),
            bus: Arc::clone(&env.bus),
            dispatcher: Arc::clone(&env.dispatcher),
        })
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Object id.
    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    /// Instance id.
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Owning session.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Category.
    pub fn category(&self) -> DropCategory {
        self.category
    }

    /// Implementation selector the drop was built from.
    pub fn dropclass(&self) -> &str {
        &self.dropclass
    }

    /// Execution mode.
    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    /// Declared size after which the drop completes itself.
    pub fn expected_size(&self) -> Option<u64> {
        self.expected_size
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Current status.
    pub fn status(&self) -> DropStatus {
        self.state.lock().status
    }

    /// Current run-state (always `NotRun` for non-applications).
    pub fn run_state(&self) -> AppRunState {
        self.state.lock().run_state
    }

    /// Checksum of the bytes written so far.
    pub fn checksum(&self) -> Option<u32> {
        self.state.lock().checksum.as_ref().map(Checksummer::value)
    }

    /// Bytes written so far.
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    /// Number of readers currently open.
    pub fn open_reader_count(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }

    /// Watch the drop's status.
    pub fn subscribe(&self) -> watch::Receiver<DropStatus> {
        self.status_tx.subscribe()
    }

    /// Consistent view of status, checksum and size.
    pub fn snapshot(&self) -> DropSnapshot {
        let st = self.state.lock();
        let phase = match (&self.payload, st.status) {
            (_, DropStatus::Deleted) => DropPhase::Lost,
            (Payload::Data(io), _) => io.phase(),
            _ => DropPhase::default(),
        };
        DropSnapshot {
            oid: self.oid.clone(),
            uid: self.uid.clone(),
            category: self.category,
            status: st.status,
            phase,
            exec_status: (self.category == DropCategory::Application).then_some(st.run_state),
            checksum: st.checksum.as_ref().map(Checksummer::value),
            checksum_type: st.checksum.as_ref().map(Checksummer::kind),
            size: st.size,
            failure: st.failure.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------

    /// Relate two drops along an edge, updating both sides.
    ///
    /// Data (or container) to application makes a consumer; application to
    /// data makes an output; containment makes `upstream` a child of
    /// `downstream`. In every case `downstream` starts waiting on
    /// `upstream`.
    pub fn link(upstream: &DropRef, downstream: &DropRef, kind: EdgeKind) -> Result<()> {
        use DropCategory::{Application, Container, Data};

        let invalid = |cause: &str| DropflowError::InvalidLink {
            from: upstream.oid.clone(),
            to: downstream.oid.clone(),
            cause: cause.to_string(),
        };

        match (kind, upstream.category, downstream.category) {
            (EdgeKind::Containment, _, Container) => {
                {
                    let mut links = upstream.links.write();
                    links.parent = Some(Link {
                        oid: downstream.oid.clone(),
                        drop: Arc::downgrade(downstream),
                    });
                }
                push_link(&mut downstream.links.write().children, upstream);
            }
            (EdgeKind::Containment, _, _) => return Err(invalid("parent is not a container")),
            (EdgeKind::Streaming, Data | Container, Application) => {
                push_link(&mut upstream.links.write().streaming_consumers, downstream);
                push_link(&mut downstream.links.write().streaming_inputs, upstream);
            }
            (EdgeKind::Data, Data | Container, Application) => {
                push_link(&mut upstream.links.write().consumers, downstream);
                push_link(&mut downstream.links.write().inputs, upstream);
            }
            (EdgeKind::Data, Application, Data | Container) => {
                push_link(&mut upstream.links.write().outputs, downstream);
                push_link(&mut downstream.links.write().producers, upstream);
            }
            (EdgeKind::Streaming, Application, _) => {
                return Err(invalid("applications cannot stream into other drops"));
            }
            (_, Application, Application) => {
                return Err(invalid("applications must be connected through data"));
            }
            (_, _, _) => return Err(invalid("data drops must be connected through applications")),
        }
        downstream.add_upstream(upstream.oid.clone());
        Ok(())
    }

    /// Wait on an upstream drop that lives in another session or node.
    /// Its status arrives through [`input_event`](Self::input_event).
    pub fn add_upstream(&self, oid: impl Into<Oid>) {
        self.state.lock().upstream.insert(oid.into());
    }

    /// Oids this drop waits on.
    pub fn upstream_oids(&self) -> Vec<Oid> {
        let mut oids: Vec<Oid> = self.state.lock().upstream.iter().cloned().collect();
        oids.sort();
        oids
    }

    /// Applications triggered when this drop completes.
    pub fn consumers(&self) -> Vec<DropRef> {
        upgrade(&self.links.read().consumers)
    }

    /// Applications fed as bytes are written.
    pub fn streaming_consumers(&self) -> Vec<DropRef> {
        upgrade(&self.links.read().streaming_consumers)
    }

    /// Applications writing this drop.
    pub fn producers(&self) -> Vec<DropRef> {
        upgrade(&self.links.read().producers)
    }

    /// Data read by this application.
    pub fn inputs(&self) -> Vec<DropRef> {
        upgrade(&self.links.read().inputs)
    }

    /// Data streamed into this application.
    pub fn streaming_inputs(&self) -> Vec<DropRef> {
        upgrade(&self.links.read().streaming_inputs)
    }

    /// Data written by this application.
    pub fn outputs(&self) -> Vec<DropRef> {
        upgrade(&self.links.read().outputs)
    }

    /// Container holding this drop.
    pub fn parent(&self) -> Option<DropRef> {
        self.links.read().parent.as_ref().and_then(|l| l.drop.upgrade())
    }

    /// Drops held by this container.
    pub fn children(&self) -> Vec<DropRef> {
        upgrade(&self.links.read().children)
    }

    // ------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------

    /// Append bytes.
    ///
    /// The first write moves the drop to WRITING. Writing the last
    /// expected byte completes it. Streaming consumers receive the bytes
    /// after the drop's lock is released.
    pub fn write(self: &Arc<Self>, data: &[u8]) -> Result<usize> {
        let Payload::Data(io) = &self.payload else {
            return Err(self.unsupported("write"));
        };

        let (written, first, reached) = {
            let mut st = self.state.lock();
            if !st.status.accepts_writes() {
                return Err(DropflowError::InvalidDropState {
                    oid: self.oid.clone(),
                    operation: "write",
                    status: st.status,
                });
            }
            match io.write(data) {
                Ok(n) => {
                    st.checksum
                        .get_or_insert_with(|| Checksummer::new(self.checksum_type))
                        .update(&data[..n]);
                    st.size += n as u64;
                    let first = st.status == DropStatus::Initialized;
                    st.status = DropStatus::Writing;
                    let reached = self.expected_size.is_some_and(|e| st.size >= e);
                    (n, first, reached)
                }
                Err(e) => {
                    let cause = e.to_string();
                    st.status = DropStatus::Error;
                    st.failure = Some(cause.clone());
                    drop(st);
                    warn!(session_id = %self.session_id, oid = %self.oid, error = %cause, "Write failed");
                    self.after_transition(DropStatus::Error);
                    return Err(DropflowError::Storage {
                        oid: self.oid.clone(),
                        cause,
                    });
                }
            }
        };

        if first {
            self.after_transition(DropStatus::Writing);
        }
        for consumer in self.streaming_consumers() {
            consumer.data_written(&self.oid, &data[..written]);
        }
        if reached {
            // A concurrent setCompleted may win; either way the drop is complete.
            let _ = self.set_completed();
        }
        Ok(written)
    }

    /// Mark all data present and notify consumers.
    ///
    /// Valid from INITIALIZED (empty drop) or WRITING.
    pub fn set_completed(self: &Arc<Self>) -> Result<()> {
        if self.category == DropCategory::Application {
            return Err(self.unsupported("setCompleted"));
        }
        {
            let mut st = self.state.lock();
            if !st.status.accepts_writes() {
                return Err(DropflowError::InvalidDropState {
                    oid: self.oid.clone(),
                    operation: "setCompleted",
                    status: st.status,
                });
            }
            st.status = DropStatus::Completed;
        }
        self.after_transition(DropStatus::Completed);
        Ok(())
    }

    /// Open a reader over the drop's data. Requires COMPLETED.
    pub fn open(self: &Arc<Self>) -> Result<DropReader> {
        let Payload::Data(io) = &self.payload else {
            return Err(self.unsupported("open"));
        };
        let status = self.status();
        if status != DropStatus::Completed {
            return Err(DropflowError::InvalidDropState {
                oid: self.oid.clone(),
                operation: "open",
                status,
            });
        }
        let inner = io.open_reader().map_err(|e| DropflowError::Storage {
            oid: self.oid.clone(),
            cause: e.to_string(),
        })?;
        self.open_readers.fetch_add(1, Ordering::SeqCst);
        Ok(DropReader {
            drop: Arc::clone(self),
            inner,
            chunk_size: DEFAULT_CHUNK_SIZE,
            done: false,
        })
    }

    fn data_written(&self, from: &Oid, data: &[u8]) {
        if let Payload::App(app) = &self.payload {
            app.data_written(from, data);
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start a deployment-level trigger: run an application, complete
    /// anything else.
    pub fn trigger(self: &Arc<Self>) -> Result<()> {
        match self.category {
            DropCategory::Application => self.execute(),
            _ => self.set_completed(),
        }
    }

    /// Run an application now, regardless of its inputs.
    ///
    /// Fails if it already ran or is running.
    pub fn execute(self: &Arc<Self>) -> Result<()> {
        if self.category != DropCategory::Application {
            return Err(self.unsupported("execute"));
        }
        {
            let mut st = self.state.lock();
            if st.status.is_terminal() || st.run_state != AppRunState::NotRun {
                return Err(DropflowError::InvalidDropState {
                    oid: self.oid.clone(),
                    operation: "execute",
                    status: st.status,
                });
            }
            st.run_state = AppRunState::Running;
        }
        self.dispatch_run();
        Ok(())
    }

    /// Notify consumers of a COMPLETED drop whose execution mode is
    /// EXTERNAL.
    pub fn trigger_consumers(self: &Arc<Self>) -> Result<()> {
        let status = self.status();
        if status != DropStatus::Completed {
            return Err(DropflowError::InvalidDropState {
                oid: self.oid.clone(),
                operation: "triggerConsumers",
                status,
            });
        }
        let links = self.links.read();
        let targets: Vec<DropRef> = upgrade(&links.consumers)
            .into_iter()
            .chain(upgrade(&links.streaming_consumers))
            .collect();
        drop(links);
        for target in targets {
            target.input_event(&self.oid, DropStatus::Completed);
        }
        Ok(())
    }

    /// Fail the drop. Returns false if it was already terminal.
    pub fn set_error(self: &Arc<Self>, cause: impl Into<String>) -> bool {
        self.terminate(DropStatus::Error, Some(cause.into()))
    }

    /// Skip the drop. Returns false if it was already terminal.
    pub fn skip(self: &Arc<Self>) -> bool {
        self.terminate(DropStatus::Skipped, None)
    }

    /// Cancel the drop and notify downstream. Returns false if it was
    /// already terminal.
    pub fn cancel(self: &Arc<Self>) -> bool {
        self.terminate(DropStatus::Cancelled, None)
    }

    /// Cancel without notifying anyone yet; pair with
    /// [`announce`](Self::announce). Lets a whole session be marked
    /// CANCELLED before propagation would turn dependents SKIPPED.
    pub fn mark_cancelled(&self) -> bool {
        let mut st = self.state.lock();
        if st.status.is_terminal() {
            return false;
        }
        st.status = DropStatus::Cancelled;
        true
    }

    /// Publish the current status as if it had just been reached.
    pub fn announce(self: &Arc<Self>) {
        let status = self.status();
        self.after_transition(status);
    }

    /// Move a COMPLETED drop to EXPIRED.
    pub fn expire(self: &Arc<Self>) -> Result<()> {
        {
            let mut st = self.state.lock();
            if st.status != DropStatus::Completed {
                return Err(DropflowError::InvalidDropState {
                    oid: self.oid.clone(),
                    operation: "expire",
                    status: st.status,
                });
            }
            st.status = DropStatus::Expired;
        }
        self.after_transition(DropStatus::Expired);
        Ok(())
    }

    /// Release the drop's data and move it to DELETED. Idempotent.
    pub fn delete(self: &Arc<Self>) -> Result<()> {
        {
            let mut st = self.state.lock();
            if st.status == DropStatus::Deleted {
                return Ok(());
            }
            if let Payload::Data(io) = &self.payload {
                io.delete().map_err(|e| DropflowError::Storage {
                    oid: self.oid.clone(),
                    cause: e.to_string(),
                })?;
            }
            st.status = DropStatus::Deleted;
        }
        self.after_transition(DropStatus::Deleted);
        Ok(())
    }

    /// An upstream drop reached `status`.
    ///
    /// Each upstream oid counts once. When the last expected upstream
    /// reports COMPLETED an application starts running and anything else
    /// completes. A failed upstream fails this drop straight away.
    pub fn input_event(self: &Arc<Self>, from: &Oid, status: DropStatus) {
        let next = {
            let mut st = self.state.lock();
            if !st.upstream.contains(from)
                || st.status.is_terminal()
                || st.run_state != AppRunState::NotRun
                || !(status == DropStatus::Completed || status.is_failure())
                || !st.reported.insert(from.clone())
            {
                Next::Nothing
            } else if status.is_failure() {
                let new = match self.category {
                    DropCategory::Application => DropStatus::Skipped,
                    _ => status,
                };
                st.status = new;
                st.failure = Some(format!("upstream {from} is {status}"));
                Next::Transition(new)
            } else if st.reported.len() < st.upstream.len() {
                Next::Nothing
            } else if self.category == DropCategory::Application {
                st.run_state = AppRunState::Running;
                Next::Run
            } else {
                st.status = DropStatus::Completed;
                Next::Transition(DropStatus::Completed)
            }
        };

        match next {
            Next::Nothing => {}
            Next::Run => self.dispatch_run(),
            Next::Transition(s) => self.after_transition(s),
        }
    }

    fn terminate(self: &Arc<Self>, status: DropStatus, cause: Option<String>) -> bool {
        {
            let mut st = self.state.lock();
            if st.status.is_terminal() {
                return false;
            }
            st.status = status;
            st.failure = cause;
        }
        self.after_transition(status);
        true
    }

    fn dispatch_run(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.dispatcher.dispatch(Box::new(move || this.run_now()));
    }

    fn run_now(self: &Arc<Self>) {
        let Payload::App(app) = &self.payload else {
            return;
        };
        let ctx = {
            let links = self.links.read();
            AppContext {
                oid: self.oid.clone(),
                session_id: self.session_id.clone(),
                inputs: upgrade(&links.inputs),
                streaming_inputs: upgrade(&links.streaming_inputs),
                outputs: upgrade(&links.outputs),
            }
        };
        debug!(session_id = %self.session_id, oid = %self.oid, dropclass = %self.dropclass, "Running application");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| app.run(&ctx))).unwrap_or_else(
            |payload| {
                let cause = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "application panicked".to_string());
                Err(DropflowError::AppFailed {
                    oid: self.oid.clone(),
                    cause,
                })
            },
        );
        self.finish(outcome);
    }

    fn finish(self: &Arc<Self>, outcome: Result<()>) {
        let transition = {
            let mut st = self.state.lock();
            let status = match &outcome {
                Ok(()) => {
                    st.run_state = AppRunState::Finished;
                    DropStatus::Completed
                }
                Err(e) => {
                    st.run_state = AppRunState::Error;
                    st.failure = Some(e.to_string());
                    DropStatus::Error
                }
            };
            // A cancel may have landed while running.
            if st.status.is_terminal() {
                None
            } else {
                st.status = status;
                Some(status)
            }
        };
        if let Err(e) = &outcome {
            warn!(session_id = %self.session_id, oid = %self.oid, error = %e, "Application failed");
        }
        if let Some(status) = transition {
            self.after_transition(status);
        }
    }

    /// Publish a transition and, for terminal outcomes, report it
    /// downstream. Must be called without holding the state lock.
    fn after_transition(self: &Arc<Self>, status: DropStatus) {
        debug!(session_id = %self.session_id, oid = %self.oid, %status, "Drop changed status");
        {
            // Watchers see the current status, never a transition that a
            // later one has already overtaken.
            let st = self.state.lock();
            self.status_tx.send_replace(st.status);
        }
        self.bus.publish(&DropEvent {
            session_id: self.session_id.clone(),
            oid: self.oid.clone(),
            uid: self.uid.clone(),
            status,
        });

        if !(status == DropStatus::Completed || status.is_failure()) {
            return;
        }
        let targets: Vec<DropRef> = {
            let links = self.links.read();
            let mut targets = Vec::new();
            let external = status == DropStatus::Completed
                && self.execution_mode == ExecutionMode::External;
            if !external {
                targets.extend(upgrade(&links.consumers));
                targets.extend(upgrade(&links.streaming_consumers));
            }
            targets.extend(upgrade(&links.outputs));
            if let Some(parent) = links.parent.as_ref().and_then(|l| l.drop.upgrade()) {
                targets.push(parent);
            }
            targets
        };
        for target in targets {
            target.input_event(&self.oid, status);
        }
    }

    fn unsupported(&self, operation: &'static str) -> DropflowError {
        DropflowError::Unsupported {
            oid: self.oid.clone(),
            operation,
        }
    }
}

impl fmt::Debug for DropObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropObject")
            .field("oid", &self.oid)
            .field("category", &self.category)
            .field("dropclass", &self.dropclass)
            .field("status", &self.status())
            .finish()
    }
}

/// Reader over a completed drop's data.
///
/// Yields chunks until the data is exhausted. Each reader starts at the
/// beginning; dropping it (or calling [`close`](Self::close)) releases it.
pub struct DropReader {
    drop: DropRef,
    inner: Box<dyn ChunkReader>,
    chunk_size: usize,
    done: bool,
}

impl DropReader {
    /// Read in chunks of at most `size` bytes.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Release the reader.
    pub fn close(self) {}
}

impl Iterator for DropReader {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next_chunk(self.chunk_size) {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(DropflowError::Storage {
                    oid: self.drop.oid.clone(),
                    cause: e.to_string(),
                }))
            }
        }
    }
}

impl Drop for DropReader {
    fn drop(&mut self) {
        self.drop.open_readers.fetch_sub(1, Ordering::SeqCst);
    }
}
