//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;

use academy_sync::db::{create_memory_pool, SqliteLocalStore};
use academy_sync::records::{
    AttendanceEntry, AttendanceStatus, Gender, MembershipStatus, OwnerId, PerformanceEntry,
    SkillLevel, Student, SyncRecord,
};
use academy_sync::remote::{Filter, MemoryRemoteStore, RemoteError, RemoteRow, RemoteStore};
use academy_sync::records::Table;
use academy_sync::sync::to_remote_row;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub async fn memory_store() -> SqliteLocalStore {
    SqliteLocalStore::new(create_memory_pool().await.unwrap())
}

pub fn student(student_id: &str, full_name: &str) -> Student {
    Student {
        student_id: student_id.to_string(),
        full_name: full_name.to_string(),
        date_of_birth: date("2011-05-14"),
        gender: Gender::Female,
        photo: None,
        contact_number: "555-0100".to_string(),
        email: None,
        emergency_contact: "555-0199".to_string(),
        enrollment_date: date("2023-09-01"),
        batch: "U13".to_string(),
        skill_level: SkillLevel::Intermediate,
        membership_status: MembershipStatus::Active,
        address: None,
        medical_notes: None,
        parent_name: Some("Parent".to_string()),
        parent_contact: None,
    }
}

pub fn attendance(student_id: &str, on: &str) -> AttendanceEntry {
    AttendanceEntry {
        student_id: student_id.to_string(),
        date: date(on),
        status: AttendanceStatus::Present,
        session: "Morning".to_string(),
        batch_id: "U13".to_string(),
        notes: None,
    }
}

pub fn performance(student_id: &str, on: &str, next: Option<&str>) -> PerformanceEntry {
    PerformanceEntry {
        student_id: student_id.to_string(),
        assessment_date: date(on),
        footwork: 7,
        serve_quality: 6,
        stroke_quality: 8,
        stroke_consistency: 5,
        smash_power: 6,
        chops_drop_shots: 4,
        defense_skills: 7,
        court_coverage: 6,
        stamina: 8,
        physical_fitness: 7,
        mindset: 9,
        matches_played: 10,
        matches_won: 6,
        improvement_areas: "Backhand clears".to_string(),
        strengths: "Net play".to_string(),
        coach_comments: "Steady progress".to_string(),
        next_assessment_date: next.map(date),
    }
}

/// Remote row for `record` as the engine would push it
pub fn remote_row<T: SyncRecord>(owner: &OwnerId, record: &T) -> RemoteRow {
    to_remote_row(owner, record, Utc::now()).unwrap()
}

/// Remote store wrapper with injectable faults
pub struct FlakyRemote {
    inner: MemoryRemoteStore,
    deletes: AtomicUsize,
    fail_delete_at: Mutex<Option<usize>>,
    fail_upsert: Mutex<HashSet<Table>>,
    fail_select: Mutex<HashSet<Table>>,
    discard_upserts: AtomicBool,
    ignore_select_filter: AtomicBool,
    latency: Mutex<Option<Duration>>,
    delete_log: Mutex<Vec<(Table, Filter)>>,
}

impl FlakyRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryRemoteStore::new(),
            deletes: AtomicUsize::new(0),
            fail_delete_at: Mutex::new(None),
            fail_upsert: Mutex::new(HashSet::new()),
            fail_select: Mutex::new(HashSet::new()),
            discard_upserts: AtomicBool::new(false),
            ignore_select_filter: AtomicBool::new(false),
            latency: Mutex::new(None),
            delete_log: Mutex::new(Vec::new()),
        })
    }

    pub fn inner(&self) -> &MemoryRemoteStore {
        &self.inner
    }

    pub fn rows(&self, table: Table) -> Vec<RemoteRow> {
        self.inner.rows(table)
    }

    pub fn seed(&self, table: Table, row: RemoteRow) {
        self.inner.seed(table, row);
    }

    /// Fail the `n`th delete call, counting from 1 across the store's lifetime
    pub fn fail_delete_at(&self, n: usize) {
        *self.fail_delete_at.lock() = Some(n);
    }

    pub fn fail_upsert(&self, table: Table) {
        self.fail_upsert.lock().insert(table);
    }

    pub fn fail_select(&self, table: Table) {
        self.fail_select.lock().insert(table);
    }

    /// Report upserts as successful without storing anything
    pub fn discard_upserts(&self) {
        self.discard_upserts.store(true, Ordering::SeqCst);
    }

    /// Return every row from `select`, whoever owns it
    pub fn ignore_select_filter(&self) {
        self.ignore_select_filter.store(true, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Clear every injected fault
    pub fn heal(&self) {
        *self.fail_delete_at.lock() = None;
        self.fail_upsert.lock().clear();
        self.fail_select.lock().clear();
        self.discard_upserts.store(false, Ordering::SeqCst);
        self.ignore_select_filter.store(false, Ordering::SeqCst);
        *self.latency.lock() = None;
    }

    pub fn delete_log(&self) -> Vec<(Table, Filter)> {
        self.delete_log.lock().clone()
    }

    /// Store operations that reached the backing tables
    pub fn calls(&self) -> usize {
        self.inner.calls()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn offline(what: &str) -> RemoteError {
    RemoteError::Unavailable(format!("injected {} failure", what))
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn upsert(
        &self,
        table: Table,
        rows: Vec<RemoteRow>,
        conflict_key: &[&str],
    ) -> Result<(), RemoteError> {
        self.delay().await;
        if self.fail_upsert.lock().contains(&table) {
            return Err(offline("upsert"));
        }
        if self.discard_upserts.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.upsert(table, rows, conflict_key).await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), RemoteError> {
        self.delay().await;
        let n = self.deletes.fetch_add(1, Ordering::SeqCst) + 1;
        self.delete_log.lock().push((table, filter.clone()));
        if *self.fail_delete_at.lock() == Some(n) {
            return Err(offline("delete"));
        }
        self.inner.delete(table, filter).await
    }

    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<RemoteRow>, RemoteError> {
        self.delay().await;
        if self.fail_select.lock().contains(&table) {
            return Err(offline("select"));
        }
        if self.ignore_select_filter.load(Ordering::SeqCst) {
            return Ok(self.inner.rows(table));
        }
        self.inner.select(table, filter).await
    }
}
