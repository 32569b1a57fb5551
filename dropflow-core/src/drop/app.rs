//! Application drops: the code that runs when a drop's inputs complete.

use super::DropRef;
use crate::error::Result;
use crate::spec::DropSpec;
use crate::types::{Oid, SessionId};

/// Code run by an application drop.
///
/// `run` is called at most once per deployment, on a dispatcher thread,
/// after every input reached COMPLETED. Returning an error marks the drop
/// ERROR and fails its outputs.
pub trait Application: Send + Sync {
    /// Process inputs into outputs.
    fn run(&self, ctx: &AppContext) -> Result<()>;

    /// Bytes written to a streaming input, delivered as they arrive.
    fn data_written(&self, _from: &Oid, _data: &[u8]) {}
}

/// Builds an [`Application`] from its drop spec.
///
/// Parameter validation belongs here so bad specs fail at deploy time,
/// not when the application finally runs.
pub trait AppFactory: Send + Sync {
    /// Create the application for `spec`.
    fn create(&self, spec: &DropSpec) -> Result<Box<dyn Application>>;
}

impl<F> AppFactory for F
where
    F: Fn(&DropSpec) -> Result<Box<dyn Application>> + Send + Sync,
{
    fn create(&self, spec: &DropSpec) -> Result<Box<dyn Application>> {
        self(spec)
    }
}

/// What an application sees while running.
pub struct AppContext {
    pub(crate) oid: Oid,
    pub(crate) session_id: SessionId,
    pub(crate) inputs: Vec<DropRef>,
    pub(crate) streaming_inputs: Vec<DropRef>,
    pub(crate) outputs: Vec<DropRef>,
}

impl AppContext {
    /// The application drop's oid.
    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    /// Session the application runs in.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Completed input drops, in declaration order.
    pub fn inputs(&self) -> &[DropRef] {
        &self.inputs
    }

    /// Streaming input drops.
    pub fn streaming_inputs(&self) -> &[DropRef] {
        &self.streaming_inputs
    }

    /// Output drops to write into.
    pub fn outputs(&self) -> &[DropRef] {
        &self.outputs
    }
}
