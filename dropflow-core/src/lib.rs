//! Dropflow Core Library
//!
//! Foundational types for the dropflow execution engine: drop specs, the
//! drop state machine, trigger propagation and the error taxonomy shared
//! by every manager level.
//!
//! # Overview
//!
//! A physical graph is a list of drop specs. Data drops hold bytes;
//! application drops run once all their inputs completed and write their
//! outputs. Completion travels downstream as status events, so a graph
//! executes itself once its root drops are completed.
//!
//! # Key Components
//!
//! - **Spec**: parsed drop specs and graph-level helpers (edges, roots)
//! - **Drop**: the state machine, storage backends and registry of drop classes
//! - **Event**: per-session event bus
//! - **Dispatch**: executors for application runs
//!
//! # Example
//!
//! ```ignore
//! use dropflow_core::prelude::*;
//!
//! let registry = DropClassRegistry::with_builtins();
//! let env = DropEnv::new("session-1");
//! let a = registry.build(&DropSpec::data("A", "memory"), &env)?;
//! let b = registry.build(&DropSpec::app("B", "copy"), &env)?;
//! let c = registry.build(&DropSpec::data("C", "memory"), &env)?;
//! DropObject::link(&a, &b, EdgeKind::Data)?;
//! DropObject::link(&b, &c, EdgeKind::Data)?;
//!
//! a.write(b"hello")?;
//! a.set_completed()?; // B runs, C completes
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod apps;
pub mod dispatch;
pub mod drop;
pub mod error;
pub mod event;
pub mod prelude;
pub mod spec;
pub mod types;

// Re-export key types at crate root for convenience
pub use dispatch::{Dispatcher, InlineDispatcher, ThreadDispatcher, TokioDispatcher};
pub use drop::{DropClassRegistry, DropEnv, DropObject, DropRef, DropSnapshot};
pub use error::{DropflowError, ErrorKind, Result, SubordinateFailure};
pub use event::{DropEvent, DropEventListener, EventBus};
pub use spec::{DropSpec, GraphSpec};
pub use types::{AppRunState, DropStatus, Oid, SessionId, SessionStatus, Uid};
