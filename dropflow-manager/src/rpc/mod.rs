//! JSON-over-HTTP boundary between managers.
//!
//! [`RpcServer`] exposes any [`DropManager`](crate::manager::DropManager)
//! under `/api`; [`ManagerClient`] implements the same trait against such a
//! server, so a composite manager can hold remote subordinates exactly like
//! in-process ones.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/api` | info |
//! | GET    | `/api/sessions` | getSessionIds |
//! | POST   | `/api/sessions` | createSession |
//! | DELETE | `/api/sessions/{id}` | destroySession |
//! | GET    | `/api/sessions/{id}/status` | getSessionStatus |
//! | POST   | `/api/sessions/{id}/graph/append` | addGraphSpec |
//! | GET    | `/api/sessions/{id}/graph` | getGraph |
//! | GET    | `/api/sessions/{id}/graph/status` | getGraphStatus |
//! | POST   | `/api/sessions/{id}/deploy` | deploySession |
//! | POST   | `/api/sessions/{id}/cancel` | cancelSession |
//! | POST   | `/api/sessions/{id}/subscriptions` | addNodeSubscriptions |
//! | POST   | `/api/sessions/{id}/trigger` | triggerDrops |
//! | POST   | `/api/sessions/{id}/events` | deliverEvent |
//!
//! Failures answer with `{"error": {"code", "kind", "message"}}`.
//!
//! # Example
//!
//! ```ignore
//! use dropflow_manager::rpc::{RpcServer, ServerConfig};
//!
//! let server = RpcServer::bind(&ServerConfig::new("127.0.0.1", 8001), manager).await?;
//! let (tx, rx) = tokio::sync::oneshot::channel();
//! server.run(rx).await?;
//! ```

mod client;
mod error;
mod response;
mod router;
mod server;
mod wire;

pub use client::ManagerClient;
pub use error::ApiError;
pub use router::route;
pub use server::{RpcServer, ServerConfig};
pub use wire::{CreateSessionRequest, DeployRequest, ErrorBody, ErrorDetail, TriggerRequest};

/// Path prefix of every endpoint.
pub const API_PREFIX: &str = "/api";
