//! Dropflow Manager Library
//!
//! Sessions and the manager hierarchy that deploys physical graphs across
//! nodes.
//!
//! # Overview
//!
//! A [`NodeManager`] hosts sessions whose drops live in its process. A data
//! island manager fronts a set of node managers and a master manager a set
//! of islands; both route drop specs by placement and merge what their
//! subordinates report. Edges that cross node managers are wired through
//! event subscriptions, so completion still flows downstream across the
//! cluster.
//!
//! # Key Components
//!
//! - **Session**: lifecycle of one graph on one node
//! - **Manager**: the [`DropManager`] surface and its three levels
//! - **RPC**: an HTTP server exposing any manager and a client implementing
//!   [`DropManager`] against it
//! - **Observability**: logging setup shared by manager processes
//!
//! # Example
//!
//! ```ignore
//! use dropflow_manager::{CompositeManager, DropManager, ManagerConfig, NodeManager};
//! use std::sync::Arc;
//!
//! let config = ManagerConfig::default();
//! let dim = CompositeManager::island("island-1", config.clone())
//!     .with_subordinate(Arc::new(NodeManager::new("nm-1", config.clone())))
//!     .with_subordinate(Arc::new(NodeManager::new("nm-2", config)));
//!
//! dim.create_session("s1".into()).await?;
//! dim.add_graph_spec("s1".into(), graph).await?;
//! dim.deploy_session("s1".into(), roots).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod manager;
pub mod observability;
pub mod rpc;
pub mod session;

// Re-export key types at crate root for convenience
pub use config::{ManagerConfig, ManagerConfigBuilder};
pub use manager::{
    CompositeManager, DropManager, DropStatusEntry, GraphStatus, GraphView, ManagerFuture,
    ManagerInfo, ManagerLevel, NodeManager, RemoteLink, SessionStatusReport, SubordinateStatus,
};
pub use rpc::{ManagerClient, RpcServer, ServerConfig};
pub use session::Session;
