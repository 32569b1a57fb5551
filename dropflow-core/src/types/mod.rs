//! Core identifier and status types.

mod ids;
mod status;

pub use ids::{Oid, SessionId, Uid};
pub use status::{
    AppRunState, ChecksumType, DropPhase, DropStatus, ExecutionMode, SessionStatus,
};
