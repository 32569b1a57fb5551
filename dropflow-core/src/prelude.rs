//! Prelude for convenient imports.
//!
//! ```ignore
//! use dropflow_core::prelude::*;
//! ```

// Core types
pub use crate::types::{
    AppRunState, ChecksumType, DropPhase, DropStatus, ExecutionMode, Oid, SessionId,
    SessionStatus, Uid,
};

// Error handling
pub use crate::error::{DropflowError, ErrorKind, Result, SubordinateFailure};

// Specs
pub use crate::spec::{DropCategory, DropRel, DropSpec, Edge, EdgeKind, GraphSpec, LinkType};

// Drops
pub use crate::drop::{
    AppContext, AppFactory, Application, DataIo, DropClass, DropClassRegistry, DropEnv,
    DropObject, DropReader, DropRef, DropSnapshot, DropWaiter, Payload, all_drop_contents,
    copy_drop_contents, downstream_drops, upstream_drops,
};

// Events and dispatch
pub use crate::dispatch::{Dispatcher, InlineDispatcher, ThreadDispatcher, TokioDispatcher};
pub use crate::event::{DropEvent, DropEventListener, EventBus};
