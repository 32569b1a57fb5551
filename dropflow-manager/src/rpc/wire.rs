//! Request and error bodies shared by the server and the client.

use dropflow_core::error::ErrorKind;
use dropflow_core::types::{Oid, SessionId};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Id of the new session.
    pub session_id: SessionId,
}

/// Body of `POST /api/sessions/{id}/deploy`. An empty body means no
/// completed drops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Drops to complete once deployed.
    #[serde(default)]
    pub completed: Vec<Oid>,
}

/// Body of `POST /api/sessions/{id}/trigger`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Drops to complete or start.
    pub oids: Vec<Oid>,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// The error.
    pub error: ErrorDetail,
}

/// Details of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// `Exxx` code.
    pub code: String,
    /// Error category.
    pub kind: ErrorKind,
    /// Rendered message.
    pub message: String,
}
