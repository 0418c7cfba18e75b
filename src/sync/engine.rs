//! Sync engine
//!
//! Runs one reconciliation pass: drain tombstones, push, pull. Passes and
//! their status are tracked per owner.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use super::mapping;
use super::types::{
    PassResult, SkipReason, SyncError, SyncFailure, SyncOutcome, SyncPhase, SyncState,
    SyncStatus, SyncSummary, TableCounts,
};
use crate::db::LocalStore;
use crate::records::{
    AttendanceEntry, OwnerId, PerformanceEntry, RecordKey, Student, SyncRecord, Table,
};
use crate::remote::{Filter, RemoteStore, OWNER_COLUMN};

type StatusChannel = Arc<watch::Sender<SyncStatus>>;

/// Reconciles a local store with a remote store
pub struct SyncEngine<L, R> {
    local: L,
    remote: R,
    in_flight: Mutex<HashSet<OwnerId>>,
    statuses: Mutex<HashMap<OwnerId, StatusChannel>>,
}

/// Releases the owner's in-flight slot and returns its state to idle, even if
/// the pass future is dropped part way
struct InFlight<'a> {
    owner: OwnerId,
    running: &'a Mutex<HashSet<OwnerId>>,
    status: StatusChannel,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.status.send_modify(|s| {
            s.state = SyncState::Idle;
            s.in_progress = false;
        });
        self.running.lock().remove(&self.owner);
    }
}

impl<L: LocalStore, R: RemoteStore> SyncEngine<L, R> {
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local,
            remote,
            in_flight: Mutex::new(HashSet::new()),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn is_syncing(&self, owner: &OwnerId) -> bool {
        self.in_flight.lock().contains(owner)
    }

    pub fn last_synced_at(&self, owner: &OwnerId) -> Option<DateTime<Utc>> {
        self.status(owner).last_sync
    }

    /// Status snapshot for `owner`; an owner that never synced is idle
    pub fn status(&self, owner: &OwnerId) -> SyncStatus {
        self.statuses
            .lock()
            .get(owner)
            .map(|tx| tx.borrow().clone())
            .unwrap_or_default()
    }

    /// Watch status changes for `owner`
    pub fn subscribe(&self, owner: &OwnerId) -> watch::Receiver<SyncStatus> {
        self.channel(owner).subscribe()
    }

    fn channel(&self, owner: &OwnerId) -> StatusChannel {
        self.statuses
            .lock()
            .entry(owner.clone())
            .or_insert_with(|| Arc::new(watch::channel(SyncStatus::default()).0))
            .clone()
    }

    /// Run one full pass for `owner`.
    ///
    /// Without an owner nothing is touched. A call made while a pass for the
    /// same owner is in flight is skipped.
    pub async fn run_sync(&self, owner: Option<&OwnerId>) -> SyncOutcome {
        let Some(owner) = owner else {
            tracing::debug!("Sync requested without an authenticated owner, skipping");
            return SyncOutcome::Skipped(SkipReason::NoOwner);
        };

        if !self.in_flight.lock().insert(owner.clone()) {
            tracing::warn!("Sync already in progress, ignoring request for {}", owner);
            return SyncOutcome::Skipped(SkipReason::AlreadyRunning);
        }
        let status = self.channel(owner);
        let _guard = InFlight {
            owner: owner.clone(),
            running: &self.in_flight,
            status: status.clone(),
        };

        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, "Starting sync for {}", owner);
        status.send_modify(|s| s.in_progress = true);

        match self.run_phases(owner, run_id, &status).await {
            Ok(summary) => {
                tracing::info!(
                    %run_id,
                    deleted = summary.deleted,
                    pushed = summary.pushed.total(),
                    pulled = summary.pulled.total(),
                    "Sync complete"
                );
                status.send_modify(|s| {
                    s.last_sync = Some(summary.finished_at);
                    s.error = None;
                    s.failed_phase = None;
                    s.last_run_id = Some(run_id);
                    s.last_result = Some(PassResult::Succeeded);
                });
                SyncOutcome::Completed(summary)
            }
            Err(failure) => {
                tracing::error!(%run_id, "Sync failed: {}", failure);
                status.send_modify(|s| {
                    s.error = Some(failure.error.to_string());
                    s.failed_phase = Some(failure.phase);
                    s.last_run_id = Some(run_id);
                    s.last_result = Some(PassResult::Failed);
                });
                SyncOutcome::Failed(failure)
            }
        }
    }

    async fn run_phases(
        &self,
        owner: &OwnerId,
        run_id: Uuid,
        status: &watch::Sender<SyncStatus>,
    ) -> Result<SyncSummary, SyncFailure> {
        let fail = move |phase: SyncPhase| move |error: SyncError| SyncFailure { run_id, phase, error };

        enter(status, SyncPhase::DrainingTombstones);
        let deleted = self
            .drain_tombstones(owner)
            .await
            .map_err(fail(SyncPhase::DrainingTombstones))?;

        enter(status, SyncPhase::Pushing);
        let pushed = self.push(owner).await.map_err(fail(SyncPhase::Pushing))?;

        enter(status, SyncPhase::Pulling);
        let pulled = self.pull(owner).await.map_err(fail(SyncPhase::Pulling))?;

        Ok(SyncSummary {
            run_id,
            deleted,
            pushed,
            pulled,
            finished_at: Utc::now(),
        })
    }

    /// Propagate queued deletions, then clear exactly the tombstones read
    async fn drain_tombstones(&self, owner: &OwnerId) -> Result<usize, SyncError> {
        let tombstones = self.local.tombstones(owner).await?;
        if tombstones.is_empty() {
            return Ok(0);
        }
        tracing::info!("Draining {} tombstones", tombstones.len());

        let mut students = BTreeSet::new();
        let mut dated: BTreeSet<&RecordKey> = BTreeSet::new();
        for tombstone in &tombstones {
            match tombstone.key.table() {
                Table::Students => {
                    students.insert(tombstone.key.student_id());
                }
                Table::Attendance | Table::Performance => {
                    dated.insert(&tombstone.key);
                }
            }
        }

        if !students.is_empty() {
            let filter = Filter::owner(owner).is_in("student_id", students);
            self.remote.delete(Table::Students, &filter).await?;
        }

        for key in dated {
            let filter = dated_key_filter(owner, key);
            self.remote.delete(key.table(), &filter).await?;
        }

        let ids: Vec<i64> = tombstones.iter().map(|t| t.id).collect();
        self.local.remove_tombstones(&ids).await?;

        Ok(tombstones.len())
    }

    async fn push(&self, owner: &OwnerId) -> Result<TableCounts, SyncError> {
        let pushed_at = Utc::now();
        let (students, attendance, performance) = tokio::try_join!(
            self.push_table::<Student>(owner, pushed_at),
            self.push_table::<AttendanceEntry>(owner, pushed_at),
            self.push_table::<PerformanceEntry>(owner, pushed_at),
        )?;

        Ok(TableCounts {
            students,
            attendance,
            performance,
        })
    }

    async fn push_table<T: SyncRecord>(
        &self,
        owner: &OwnerId,
        pushed_at: DateTime<Utc>,
    ) -> Result<usize, SyncError> {
        let records: Vec<T> = self.local.list(owner).await?;
        if records.is_empty() {
            return Ok(0);
        }

        let rows = records
            .iter()
            .map(|r| mapping::to_remote_row(owner, r, pushed_at))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SyncError::Mapping {
                table: T::TABLE,
                source,
            })?;

        self.remote
            .upsert(T::TABLE, rows, T::TABLE.conflict_key())
            .await?;
        tracing::info!("Pushed {} {} records", records.len(), T::TABLE);

        Ok(records.len())
    }

    /// Fetch and decode all three tables before writing any of them locally.
    ///
    /// Records deleted locally while the fetch was in flight keep their queued
    /// tombstone and are not written back.
    async fn pull(&self, owner: &OwnerId) -> Result<TableCounts, SyncError> {
        let (students, attendance, performance) = tokio::try_join!(
            self.fetch_table::<Student>(owner),
            self.fetch_table::<AttendanceEntry>(owner),
            self.fetch_table::<PerformanceEntry>(owner),
        )?;

        let counts = TableCounts {
            students: self.local.merge_pulled(owner, &students).await?,
            attendance: self.local.merge_pulled(owner, &attendance).await?,
            performance: self.local.merge_pulled(owner, &performance).await?,
        };
        tracing::info!("Pulled {} records", counts.total());

        Ok(counts)
    }

    async fn fetch_table<T: SyncRecord>(&self, owner: &OwnerId) -> Result<Vec<T>, SyncError> {
        let rows = self.remote.select(T::TABLE, &Filter::owner(owner)).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            if row.get(OWNER_COLUMN).and_then(|v| v.as_str()) != Some(owner.as_str()) {
                tracing::warn!("Ignoring {} row owned by another account", T::TABLE);
                continue;
            }
            let record = mapping::from_remote_row::<T>(row).map_err(|source| {
                SyncError::Mapping {
                    table: T::TABLE,
                    source,
                }
            })?;
            records.push(record);
        }

        Ok(records)
    }
}

fn enter(status: &watch::Sender<SyncStatus>, phase: SyncPhase) {
    tracing::debug!("Sync phase: {}", phase);
    status.send_modify(|s| s.state = SyncState::Syncing { phase });
}

fn dated_key_filter(owner: &OwnerId, key: &RecordKey) -> Filter {
    let filter = Filter::owner(owner).eq("student_id", key.student_id());
    match (key.table().date_column(), key.date()) {
        (Some(column), Some(date)) => filter.eq(column, date.to_string()),
        _ => filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_dated_key_filter() {
        let owner = OwnerId::new("coach-a");
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();

        let filter = dated_key_filter(&owner, &RecordKey::performance("STU-1", date));
        assert_eq!(
            filter,
            Filter::owner(&owner)
                .eq("student_id", "STU-1")
                .eq("assessment_date", "2024-01-10")
        );
    }
}
