//! Session status as reported up the hierarchy.

use dropflow_core::error::SubordinateFailure;
use dropflow_core::types::SessionStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A session's status on one manager.
///
/// Node managers report a single status. Composite managers report one
/// entry per subordinate that holds the session, nested as deep as the
/// hierarchy goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionStatusReport {
    /// Status of a node manager's session.
    Leaf(SessionStatus),
    /// Per-subordinate statuses.
    Composite(BTreeMap<String, SubordinateStatus>),
}

/// What one subordinate said about a session.
///
/// Unreachable subordinates are kept apart from ones that answered with an
/// error, and both apart from sessions whose status is ERROR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubordinateStatus {
    /// The subordinate could not be contacted.
    Unreachable {
        /// Transport-level reason.
        unreachable: String,
    },
    /// The subordinate answered with an error.
    Failed {
        /// The reported failure.
        error: SubordinateFailure,
    },
    /// The subordinate answered.
    Reported(SessionStatusReport),
}

impl SessionStatusReport {
    /// Single status summarizing the whole report.
    ///
    /// Any ERROR wins, then any CANCELLED; otherwise the least advanced
    /// status, so a composite is FINISHED only once every subordinate is.
    /// `None` when a subordinate did not report and nothing failed, or when
    /// the report is empty.
    #[must_use]
    pub fn overall(&self) -> Option<SessionStatus> {
        match self {
            Self::Leaf(status) => Some(*status),
            Self::Composite(entries) => {
                let mut statuses = Vec::with_capacity(entries.len());
                let mut missing = false;
                for entry in entries.values() {
                    match entry {
                        SubordinateStatus::Reported(report) => match report.overall() {
                            Some(s) => statuses.push(s),
                            None => missing = true,
                        },
                        _ => missing = true,
                    }
                }
                rollup(&statuses, missing)
            }
        }
    }

    /// The entry reported by `subordinate`.
    #[must_use]
    pub fn get(&self, subordinate: &str) -> Option<&SubordinateStatus> {
        match self {
            Self::Leaf(_) => None,
            Self::Composite(entries) => entries.get(subordinate),
        }
    }

    /// Whether this is a node manager's report.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }
}

fn rollup(statuses: &[SessionStatus], missing: bool) -> Option<SessionStatus> {
    if statuses.contains(&SessionStatus::Error) {
        return Some(SessionStatus::Error);
    }
    if missing {
        return None;
    }
    if statuses.contains(&SessionStatus::Cancelled) {
        return Some(SessionStatus::Cancelled);
    }
    statuses.iter().copied().min()
}

impl SubordinateStatus {
    /// The subordinate's report, if it answered.
    #[must_use]
    pub fn report(&self) -> Option<&SessionStatusReport> {
        match self {
            Self::Reported(report) => Some(report),
            _ => None,
        }
    }

    /// Whether the subordinate could not be contacted.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

impl From<SessionStatus> for SessionStatusReport {
    fn from(status: SessionStatus) -> Self {
        Self::Leaf(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropflow_core::ErrorKind;

    fn composite(entries: Vec<(&str, SubordinateStatus)>) -> SessionStatusReport {
        SessionStatusReport::Composite(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    fn reported(s: SessionStatus) -> SubordinateStatus {
        SubordinateStatus::Reported(SessionStatusReport::Leaf(s))
    }

    #[test]
    fn least_advanced_status_wins() {
        let report = composite(vec![
            ("nm-1", reported(SessionStatus::Running)),
            ("nm-2", reported(SessionStatus::Finished)),
        ]);
        assert_eq!(report.overall(), Some(SessionStatus::Running));
    }

    #[test]
    fn error_beats_everything() {
        let report = composite(vec![
            ("nm-1", reported(SessionStatus::Error)),
            (
                "nm-2",
                SubordinateStatus::Unreachable {
                    unreachable: "connection refused".into(),
                },
            ),
        ]);
        assert_eq!(report.overall(), Some(SessionStatus::Error));
    }

    #[test]
    fn unreachable_subordinate_blocks_rollup() {
        let report = composite(vec![
            ("nm-1", reported(SessionStatus::Finished)),
            (
                "nm-2",
                SubordinateStatus::Unreachable {
                    unreachable: "timed out".into(),
                },
            ),
        ]);
        assert_eq!(report.overall(), None);
        assert!(report.get("nm-2").unwrap().is_unreachable());
    }

    #[test]
    fn wire_format_round_trips() {
        let report = composite(vec![
            (
                "island-a",
                SubordinateStatus::Reported(composite(vec![(
                    "nm-1",
                    reported(SessionStatus::Building),
                )])),
            ),
            (
                "island-b",
                SubordinateStatus::Failed {
                    error: SubordinateFailure {
                        subordinate: "island-b".into(),
                        kind: ErrorKind::State,
                        message: "no such session".into(),
                        oids: vec![],
                    },
                },
            ),
        ]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["island-a"]["nm-1"], "BUILDING");
        assert_eq!(json["island-b"]["error"]["kind"], "state");

        let back: SessionStatusReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
