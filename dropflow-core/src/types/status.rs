//! Status enumerations shared by drops, sessions and managers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a drop.
///
/// ```text
/// INITIALIZED ──write──► WRITING ──setCompleted──► COMPLETED ──► EXPIRED ──► DELETED
///      │                    │                          │
///      └──setCompleted──────┼──────────────────────────┘
///                           ▼
///                         ERROR          SKIPPED / CANCELLED (upstream failure, cancel)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropStatus {
    /// Created, nothing written yet.
    Initialized,
    /// At least one write happened.
    Writing,
    /// All data is present (or the application finished).
    Completed,
    /// Failed; terminal for this drop's contribution to the graph.
    Error,
    /// Data has outlived its lifespan.
    Expired,
    /// Data was removed.
    Deleted,
    /// Session was cancelled before this drop finished.
    Cancelled,
    /// Never produced because something upstream failed.
    Skipped,
}

impl DropStatus {
    /// Whether no further progress is possible for this drop.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Initialized | Self::Writing)
    }

    /// Whether this status counts as a failure for downstream drops.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Skipped | Self::Cancelled)
    }

    /// Whether writes are accepted in this status.
    #[must_use]
    pub fn accepts_writes(self) -> bool {
        matches!(self, Self::Initialized | Self::Writing)
    }
}

impl fmt::Display for DropStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialized => "INITIALIZED",
            Self::Writing => "WRITING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Expired => "EXPIRED",
            Self::Deleted => "DELETED",
            Self::Cancelled => "CANCELLED",
            Self::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// Storage durability tier of a drop, independent of its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropPhase {
    /// Volatile memory.
    Plasma,
    /// Local, non-replicated storage.
    #[default]
    Gas,
    /// Replicated storage.
    Liquid,
    /// Archived storage.
    Solid,
    /// Data is gone.
    Lost,
}

/// How a drop's consumers are triggered once it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Consumers run automatically when the drop completes.
    #[default]
    Drop,
    /// An external entity triggers consumers.
    External,
}

/// Run-state of an application drop, tracked alongside its drop status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppRunState {
    /// Not started.
    #[default]
    NotRun,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Finished,
    /// Finished with an error.
    Error,
}

impl fmt::Display for AppRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotRun => "NOT_RUN",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Checksum algorithm used while data is written into a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChecksumType {
    /// CRC-32 (IEEE).
    #[serde(rename = "CRC32", alias = "crc32")]
    Crc32,
    /// CRC-32C (Castagnoli).
    #[default]
    #[serde(rename = "CRC32C", alias = "crc32c")]
    Crc32c,
}

/// Status of a session on a single manager.
///
/// Ordered by progress; `Cancelled` and `Error` sit outside the normal
/// progression and are handled explicitly when statuses are rolled up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Created, no graph yet.
    Pristine,
    /// Graph specs are being appended.
    Building,
    /// Drops are being instantiated.
    Deploying,
    /// Drops are executing.
    Running,
    /// Every drop reached a terminal state.
    Finished,
    /// Cancelled on request.
    Cancelled,
    /// At least one drop failed.
    Error,
}

impl SessionStatus {
    /// Whether the session will not change status any more (barring destroy).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Error)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pristine => "PRISTINE",
            Self::Building => "BUILDING",
            Self::Deploying => "DEPLOYING",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!DropStatus::Initialized.is_terminal());
        assert!(!DropStatus::Writing.is_terminal());
        assert!(DropStatus::Completed.is_terminal());
        assert!(DropStatus::Skipped.is_terminal());
    }

    #[test]
    fn statuses_use_wire_names() {
        assert_eq!(
            serde_json::to_string(&DropStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
        assert_eq!(
            serde_json::to_string(&AppRunState::NotRun).unwrap(),
            "\"NOT_RUN\""
        );
        assert_eq!(
            serde_json::to_string(&ChecksumType::Crc32c).unwrap(),
            "\"CRC32C\""
        );
    }

    #[test]
    fn session_status_progress_order() {
        assert!(SessionStatus::Pristine < SessionStatus::Building);
        assert!(SessionStatus::Running < SessionStatus::Finished);
    }
}
