//! Executors for application runs.
//!
//! When an application drop becomes runnable its run is handed to a
//! [`Dispatcher`] instead of executing on the caller's stack. The choice of
//! dispatcher is the only thing that decides whether a completion cascade is
//! synchronous (tests) or spread over worker threads (managers).

use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;

/// A unit of work handed to a dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs somewhere.
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Run `job`, now or later.
    fn dispatch(&self, job: Job);

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Runs jobs on the calling thread before returning.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) {
        job();
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Runs jobs on a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    handle: Handle,
}

impl TokioDispatcher {
    /// Use the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the current context, if there is one.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Dispatcher for TokioDispatcher {
    fn dispatch(&self, job: Job) {
        // Applications block (sleep, file I/O), so keep them off the async workers.
        drop(self.handle.spawn_blocking(job));
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}

/// Runs every job on a fresh OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDispatcher;

impl Dispatcher for ThreadDispatcher {
    fn dispatch(&self, job: Job) {
        // The job moves into the closure, so a failed spawn cannot hand it back.
        let (tx, rx) = std::sync::mpsc::sync_channel::<Job>(1);
        let spawned = std::thread::Builder::new()
            .name("dropflow-app".to_string())
            .spawn(move || {
                if let Ok(job) = rx.recv() {
                    job();
                }
            });
        match spawned {
            Ok(_) => {
                let _ = tx.send(job);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn application thread, running inline");
                job();
            }
        }
    }

    fn name(&self) -> &'static str {
        "thread"
    }
}

/// The tokio blocking pool when called inside a runtime, else plain threads.
pub fn default_dispatcher() -> Arc<dyn Dispatcher> {
    match TokioDispatcher::current() {
        Some(d) => Arc::new(d),
        None => Arc::new(ThreadDispatcher),
    }
}
