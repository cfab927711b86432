//! Per-cycle outcome report
//!
//! A [`CycleReport`] is produced once per cycle, whether the cycle applied
//! every action, some of them, or aborted during scanning. It is plain data
//! handed to whatever logs or persists it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::Action;
use super::newtypes::CycleId;

/// Category of a per-action failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyErrorKind {
    /// Insufficient permissions on the destination (or to read the source)
    PermissionDenied,
    /// The target is busy or locked by another process
    Locked,
    /// A directory scheduled for deletion still has entries
    DirectoryNotEmpty,
    /// The destination holds a different kind of entry than expected
    KindMismatch,
    /// The source entry disappeared between scan and apply
    SourceMissing,
    /// Any other I/O failure
    Io,
}

impl std::fmt::Display for ApplyErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApplyErrorKind::PermissionDenied => "permission_denied",
            ApplyErrorKind::Locked => "locked",
            ApplyErrorKind::DirectoryNotEmpty => "directory_not_empty",
            ApplyErrorKind::KindMismatch => "kind_mismatch",
            ApplyErrorKind::SourceMissing => "source_missing",
            ApplyErrorKind::Io => "io",
        };
        write!(f, "{s}")
    }
}

/// An action that could not be applied, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAction {
    pub action: Action,
    pub kind: ApplyErrorKind,
    pub message: String,
}

/// Summary of one scan/diff/apply cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    pub cycle_started_at: DateTime<Utc>,
    pub actions_attempted: u64,
    pub actions_succeeded: u64,
    pub actions_failed: Vec<FailedAction>,
    pub duration_ms: u64,
    /// Set when the cycle aborted before applying anything
    pub scan_error: Option<String>,
}

impl CycleReport {
    /// Starts an empty report for a cycle that begins now
    pub fn begin(cycle_id: CycleId) -> Self {
        Self::begin_at(cycle_id, Utc::now())
    }

    /// Starts an empty report with an explicit start time
    pub fn begin_at(cycle_id: CycleId, cycle_started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            cycle_started_at,
            actions_attempted: 0,
            actions_succeeded: 0,
            actions_failed: Vec::new(),
            duration_ms: 0,
            scan_error: None,
        }
    }

    /// Records a successfully applied action
    pub fn record_success(&mut self) {
        self.actions_attempted += 1;
        self.actions_succeeded += 1;
    }

    /// Records a failed action
    pub fn record_failure(
        &mut self,
        action: Action,
        kind: ApplyErrorKind,
        message: impl Into<String>,
    ) {
        self.actions_attempted += 1;
        self.actions_failed.push(FailedAction {
            action,
            kind,
            message: message.into(),
        });
    }

    /// Marks the cycle as aborted during scanning
    pub fn abort_scan(&mut self, reason: impl Into<String>) {
        self.scan_error = Some(reason.into());
    }

    pub fn set_duration_ms(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    pub fn failure_count(&self) -> usize {
        self.actions_failed.len()
    }

    /// True when the scan succeeded and every attempted action applied
    pub fn is_clean(&self) -> bool {
        self.scan_error.is_none() && self.actions_failed.is_empty()
    }

    /// True when the cycle found nothing to do
    pub fn is_noop(&self) -> bool {
        self.scan_error.is_none() && self.actions_attempted == 0
    }
}
