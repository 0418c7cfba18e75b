//! Sync data types
//!
//! Defines the engine's state machine, pass outcomes and status snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::mapping::MappingError;
use crate::error::StoreError;
use crate::records::Table;
use crate::remote::RemoteError;

/// Sub-stage of a running pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    DrainingTombstones,
    Pushing,
    Pulling,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncPhase::DrainingTombstones => "draining tombstones",
            SyncPhase::Pushing => "pushing",
            SyncPhase::Pulling => "pulling",
        })
    }
}

/// Engine state; a finished pass always returns to `Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SyncState {
    Idle,
    Syncing { phase: SyncPhase },
}

/// How the most recent pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PassResult {
    Succeeded,
    Failed,
}

/// Per-table record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub students: usize,
    pub attendance: usize,
    pub performance: usize,
}

impl TableCounts {
    pub fn total(&self) -> usize {
        self.students + self.attendance + self.performance
    }
}

/// What a successful pass did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub run_id: Uuid,
    /// Tombstones propagated to the remote store
    pub deleted: usize,
    pub pushed: TableCounts,
    pub pulled: TableCounts,
    pub finished_at: DateTime<Utc>,
}

/// Why a pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// No authenticated owner
    NoOwner,
    /// Another pass is in flight
    AlreadyRunning,
}

/// Errors raised inside a pass
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local store: {0}")]
    Local(#[from] StoreError),

    #[error("remote store: {0}")]
    Remote(#[from] RemoteError),

    #[error("{table} record mapping: {source}")]
    Mapping {
        table: Table,
        #[source]
        source: MappingError,
    },
}

/// A failed pass: the phase it stopped in and the cause
#[derive(Debug, Error)]
#[error("sync failed while {phase}: {error}")]
pub struct SyncFailure {
    pub run_id: Uuid,
    pub phase: SyncPhase,
    #[source]
    pub error: SyncError,
}

/// Result of `run_sync`
#[derive(Debug)]
pub enum SyncOutcome {
    Completed(SyncSummary),
    Skipped(SkipReason),
    Failed(SyncFailure),
}

impl SyncOutcome {
    /// Everything except a failed pass counts as success
    pub fn is_success(&self) -> bool {
        !matches!(self, SyncOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&SyncFailure> {
        match self {
            SyncOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&SyncSummary> {
        match self {
            SyncOutcome::Completed(summary) => Some(summary),
            _ => None,
        }
    }
}

/// Observable engine status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Last successful sync timestamp
    #[serde(rename = "lastSync")]
    pub last_sync: Option<DateTime<Utc>>,
    /// Whether sync is in progress
    #[serde(rename = "inProgress")]
    pub in_progress: bool,
    /// Last error if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "failedPhase", skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<SyncPhase>,
    #[serde(rename = "lastRunId", skip_serializing_if = "Option::is_none")]
    pub last_run_id: Option<Uuid>,
    /// Terminal state of the most recent pass; stays set once the engine is idle
    #[serde(rename = "lastResult", skip_serializing_if = "Option::is_none")]
    pub last_result: Option<PassResult>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            last_sync: None,
            in_progress: false,
            error: None,
            failed_phase: None,
            last_run_id: None,
            last_result: None,
        }
    }
}
