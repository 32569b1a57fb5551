//! Error types for dropflow.
//!
//! Every error carries the identifiers needed to locate the problem (oid,
//! session id, subordinate manager, task) and maps onto one [`ErrorKind`],
//! which is what travels between managers.

use crate::types::{DropStatus, Oid, SessionId, SessionStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for dropflow operations.
pub type Result<T> = std::result::Result<T, DropflowError>;

/// Broad category of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or topologically invalid graph spec.
    Validation,
    /// Operation not valid in the current drop or session status.
    State,
    /// An application drop failed while running.
    Execution,
    /// A subordinate manager was unreachable or returned an error.
    Remote,
    /// The scheduler could not produce an allocation.
    Scheduling,
    /// I/O, serialization or configuration problems.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::State => "state",
            Self::Execution => "execution",
            Self::Remote => "remote",
            Self::Scheduling => "scheduling",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// One subordinate's failure inside a fanned-out manager operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubordinateFailure {
    /// Identifier of the subordinate manager (node or island name).
    pub subordinate: String,
    /// Category of the subordinate's error.
    pub kind: ErrorKind,
    /// Rendered error message.
    pub message: String,
    /// Drops that were routed to this subordinate in the failed call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub oids: Vec<Oid>,
}

impl fmt::Display for SubordinateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.subordinate, self.kind, self.message)
    }
}

/// The main error type for dropflow operations.
#[derive(Error, Debug)]
pub enum DropflowError {
    // =========================================================================
    // Validation Errors (E100-E199)
    // =========================================================================
    /// A drop spec is missing a required key.
    #[error("E101: Drop spec {oid} is missing required field '{field}'")]
    MissingField {
        /// Oid of the offending spec, or `<unknown>` if the oid itself is missing.
        oid: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// The same oid appears twice in a session.
    #[error("E102: Duplicate drop oid '{oid}'")]
    DuplicateOid {
        /// The duplicated oid.
        oid: Oid,
    },

    /// A drop spec names a node or island that is not a registered subordinate.
    #[error("E103: Drop {oid} targets unknown {field} '{target}'")]
    UnknownTarget {
        /// The drop's oid.
        oid: Oid,
        /// Routing field (`node` or `island`).
        field: &'static str,
        /// The unknown target identifier.
        target: String,
    },

    /// A drop spec was submitted to a manager that does not host its target.
    #[error("E104: Drop {oid} targets {field} '{target}' but this manager is '{manager}'")]
    TargetMismatch {
        /// The drop's oid.
        oid: Oid,
        /// Routing field (`node` or `island`).
        field: &'static str,
        /// Target named by the spec.
        target: String,
        /// Identity of the manager that received it.
        manager: String,
    },

    /// No drop implementation is registered for a dropclass.
    #[error("E105: Unknown dropclass '{dropclass}' for drop {oid}")]
    UnknownDropClass {
        /// The drop's oid.
        oid: Oid,
        /// The unregistered dropclass identifier.
        dropclass: String,
    },

    /// A drop spec could not be parsed.
    #[error("E106: Invalid drop spec at position {index}: {cause}")]
    InvalidDropSpec {
        /// Position of the spec in the submitted list.
        index: usize,
        /// What was wrong with it.
        cause: String,
    },

    /// An oid referenced by an operation is not part of the session.
    #[error("E107: Drop {oid} is not part of session {session_id}")]
    UnknownOid {
        /// Session that was searched.
        session_id: SessionId,
        /// The missing oid.
        oid: Oid,
    },

    /// A spec's categoryType does not match what its dropclass implements.
    #[error("E108: Drop {oid} declares category '{category}' but dropclass '{dropclass}' is not")]
    CategoryMismatch {
        /// The drop's oid.
        oid: Oid,
        /// Declared category.
        category: String,
        /// The dropclass identifier.
        dropclass: String,
    },

    /// Two drops cannot be related the way an edge declares.
    #[error("E109: Cannot link {from} -> {to}: {cause}")]
    InvalidLink {
        /// Upstream drop.
        from: Oid,
        /// Downstream drop.
        to: Oid,
        /// Why the relation is not allowed.
        cause: String,
    },

    /// A drop parameter has an unusable value.
    #[error("E110: Drop {oid} has invalid parameter '{param}': {cause}")]
    InvalidParameter {
        /// The drop's oid.
        oid: Oid,
        /// Parameter name.
        param: &'static str,
        /// What is wrong with the value.
        cause: String,
    },

    // =========================================================================
    // State Errors (E200-E299)
    // =========================================================================
    /// A drop operation is not valid in the drop's current status.
    #[error("E201: Cannot {operation} drop {oid} in status {status}")]
    InvalidDropState {
        /// The drop's oid.
        oid: Oid,
        /// The rejected operation.
        operation: &'static str,
        /// Status at the time of the call.
        status: DropStatus,
    },

    /// A session operation is not valid in the session's current status.
    #[error("E202: Cannot {operation} session {session_id} in status {status}")]
    InvalidSessionState {
        /// The session.
        session_id: SessionId,
        /// The rejected operation.
        operation: &'static str,
        /// Status at the time of the call.
        status: SessionStatus,
    },

    /// The session does not exist on this manager.
    #[error("E203: Session {session_id} not found")]
    SessionNotFound {
        /// The unknown session.
        session_id: SessionId,
    },

    /// A session with this id already exists on this manager.
    #[error("E204: Session {session_id} already exists")]
    SessionExists {
        /// The duplicated session id.
        session_id: SessionId,
    },

    /// A data operation was attempted on a drop that holds no data.
    #[error("E205: Drop {oid} does not support '{operation}'")]
    Unsupported {
        /// The drop's oid.
        oid: Oid,
        /// The rejected operation.
        operation: &'static str,
    },

    // =========================================================================
    // Execution Errors (E300-E399)
    // =========================================================================
    /// An application drop failed.
    #[error("E301: Application {oid} failed: {cause}")]
    AppFailed {
        /// The application's oid.
        oid: Oid,
        /// Reason for the failure.
        cause: String,
    },

    /// A storage backend failed while reading or writing drop data.
    #[error("E302: Storage failure on drop {oid}: {cause}")]
    Storage {
        /// The drop's oid.
        oid: Oid,
        /// Reason for the failure.
        cause: String,
    },

    /// Waiting for drops to finish exceeded its deadline.
    #[error("E303: Timed out after {waited_ms}ms waiting for {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
        /// How long the caller waited.
        waited_ms: u64,
    },

    // =========================================================================
    // Remote Errors (E400-E499)
    // =========================================================================
    /// A subordinate manager could not be reached in time.
    #[error("E401: Subordinate manager '{subordinate}' unreachable: {cause}")]
    Unreachable {
        /// Identifier of the subordinate.
        subordinate: String,
        /// Transport-level reason.
        cause: String,
    },

    /// A subordinate manager answered with an error.
    #[error("E402: Subordinate manager '{subordinate}' reported {kind} error: {message}")]
    Remote {
        /// Identifier of the subordinate.
        subordinate: String,
        /// Category of the remote error.
        kind: ErrorKind,
        /// Rendered remote error message.
        message: String,
    },

    /// A fanned-out operation failed on some subordinates.
    ///
    /// Subordinates listed in `succeeded` applied the operation; nothing is
    /// rolled back.
    #[error("E403: {operation} failed on {} subordinate(s): {}", failures.len(), render_failures(failures))]
    PartialFailure {
        /// The manager operation.
        operation: &'static str,
        /// Subordinates that failed.
        failures: Vec<SubordinateFailure>,
        /// Subordinates that succeeded.
        succeeded: Vec<String>,
    },

    // =========================================================================
    // Scheduling Errors (E500-E599)
    // =========================================================================
    /// The task graph contains a cycle.
    #[error("E501: Task graph contains a cycle through task '{task}'")]
    CyclicGraph {
        /// A task on the cycle.
        task: String,
    },

    /// Scheduling was requested with no agents.
    #[error("E502: Cannot schedule onto an empty agent set")]
    NoAgents,

    /// No agent can host a task at its data-ready time.
    #[error("E503: Task '{task}' (demand {demand}) cannot start at t={ready} on any agent")]
    CapacityOverflow {
        /// The task that could not be placed.
        task: String,
        /// The task's resource demand.
        demand: u32,
        /// The time the task's inputs are ready.
        ready: u64,
    },

    /// A scheduling input is inconsistent.
    #[error("E504: Invalid scheduling problem: {cause}")]
    InvalidProblem {
        /// What is wrong with the input.
        cause: String,
    },

    // =========================================================================
    // Internal Errors (E900-E999)
    // =========================================================================
    /// Invalid configuration.
    #[error("E901: Configuration error: {cause}")]
    Config {
        /// What is wrong with the configuration.
        cause: String,
    },

    /// Filesystem failure.
    #[error("E902: I/O error at {path}: {cause}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    /// Serialization failure.
    #[error("E903: Serialization error: {cause}")]
    Serialization {
        /// Reason for the failure.
        cause: String,
    },
}

fn render_failures(failures: &[SubordinateFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DropflowError {
    /// The error's category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField { .. }
            | Self::DuplicateOid { .. }
            | Self::UnknownTarget { .. }
            | Self::TargetMismatch { .. }
            | Self::UnknownDropClass { .. }
            | Self::InvalidDropSpec { .. }
            | Self::UnknownOid { .. }
            | Self::CategoryMismatch { .. }
            | Self::InvalidLink { .. }
            | Self::InvalidParameter { .. } => ErrorKind::Validation,
            Self::InvalidDropState { .. }
            | Self::InvalidSessionState { .. }
            | Self::SessionNotFound { .. }
            | Self::SessionExists { .. }
            | Self::Unsupported { .. } => ErrorKind::State,
            Self::AppFailed { .. } | Self::Storage { .. } | Self::Timeout { .. } => {
                ErrorKind::Execution
            }
            Self::Unreachable { .. } | Self::Remote { .. } | Self::PartialFailure { .. } => {
                ErrorKind::Remote
            }
            Self::CyclicGraph { .. }
            | Self::NoAgents
            | Self::CapacityOverflow { .. }
            | Self::InvalidProblem { .. } => ErrorKind::Scheduling,
            Self::Config { .. } | Self::Io { .. } | Self::Serialization { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// The `Exxx` code at the start of the rendered message.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "E101",
            Self::DuplicateOid { .. } => "E102",
            Self::UnknownTarget { .. } => "E103",
            Self::TargetMismatch { .. } => "E104",
            Self::UnknownDropClass { .. } => "E105",
            Self::InvalidDropSpec { .. } => "E106",
            Self::UnknownOid { .. } => "E107",
            Self::CategoryMismatch { .. } => "E108",
            Self::InvalidLink { .. } => "E109",
            Self::InvalidParameter { .. } => "E110",
            Self::InvalidDropState { .. } => "E201",
            Self::InvalidSessionState { .. } => "E202",
            Self::SessionNotFound { .. } => "E203",
            Self::SessionExists { .. } => "E204",
            Self::Unsupported { .. } => "E205",
            Self::AppFailed { .. } => "E301",
            Self::Storage { .. } => "E302",
            Self::Timeout { .. } => "E303",
            Self::Unreachable { .. } => "E401",
            Self::Remote { .. } => "E402",
            Self::PartialFailure { .. } => "E403",
            Self::CyclicGraph { .. } => "E501",
            Self::NoAgents => "E502",
            Self::CapacityOverflow { .. } => "E503",
            Self::InvalidProblem { .. } => "E504",
            Self::Config { .. } => "E901",
            Self::Io { .. } => "E902",
            Self::Serialization { .. } => "E903",
        }
    }

    /// Whether the error means a subordinate could not be contacted at all.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    /// Render this error as a failure entry attributed to `subordinate`.
    ///
    /// Errors that already came from that subordinate keep their remote kind.
    #[must_use]
    pub fn into_subordinate_failure(
        self,
        subordinate: impl Into<String>,
        oids: Vec<Oid>,
    ) -> SubordinateFailure {
        let kind = match &self {
            Self::Remote { kind, .. } => *kind,
            other => other.kind(),
        };
        let message = match self {
            Self::Remote { message, .. } => message,
            other => other.to_string(),
        };
        SubordinateFailure {
            subordinate: subordinate.into(),
            kind,
            message,
            oids,
        }
    }
}

impl From<serde_json::Error> for DropflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            cause: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_codes_and_ids() {
        let err = DropflowError::UnknownTarget {
            oid: Oid::new("A"),
            field: "node",
            target: "unknown_host".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("E103"));
        assert!(msg.contains("unknown_host"));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), "E103");
    }

    #[test]
    fn subordinate_failure_keeps_remote_kind() {
        let err = DropflowError::Remote {
            subordinate: "nm-1".to_string(),
            kind: ErrorKind::State,
            message: "already deployed".to_string(),
        };
        let failure = err.into_subordinate_failure("nm-1", vec![Oid::new("A")]);
        assert_eq!(failure.kind, ErrorKind::State);
        assert_eq!(failure.message, "already deployed");
        assert_eq!(failure.oids, vec![Oid::new("A")]);
    }

    #[test]
    fn partial_failure_lists_every_subordinate() {
        let err = DropflowError::PartialFailure {
            operation: "deploySession",
            failures: vec![SubordinateFailure {
                subordinate: "nm-2".to_string(),
                kind: ErrorKind::Remote,
                message: "timed out".to_string(),
                oids: vec![],
            }],
            succeeded: vec!["nm-1".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("deploySession"));
        assert!(msg.contains("nm-2"));
        assert_eq!(err.kind(), ErrorKind::Remote);
    }
}
