//! In-process remote store
//!
//! Keeps remote tables in memory and enforces the same unique constraints the
//! hosted backend must carry, so an upsert on an undeclared conflict key fails
//! instead of degrading into a blind insert.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Filter, RemoteError, RemoteRow, RemoteStore};
use crate::records::Table;

/// Remote tables held in memory
pub struct MemoryRemoteStore {
    tables: Mutex<HashMap<Table, Vec<RemoteRow>>>,
    constraints: HashMap<Table, Vec<String>>,
    calls: AtomicUsize,
}

impl MemoryRemoteStore {
    /// Store with a unique constraint on each table's conflict key
    pub fn new() -> Self {
        let constraints = Table::ALL
            .iter()
            .map(|t| (*t, t.conflict_key().iter().map(|c| c.to_string()).collect()))
            .collect();
        Self::with_constraints(constraints)
    }

    /// Store with explicit unique constraints.
    ///
    /// A table missing from `constraints` accepts no upserts at all.
    pub fn with_constraints(constraints: HashMap<Table, Vec<String>>) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            constraints,
            calls: AtomicUsize::new(0),
        }
    }

    /// Insert a row as-is, bypassing constraints
    pub fn seed(&self, table: Table, row: RemoteRow) {
        self.tables.lock().entry(table).or_default().push(row);
    }

    /// Snapshot of a table
    pub fn rows(&self, table: Table) -> Vec<RemoteRow> {
        self.tables.lock().get(&table).cloned().unwrap_or_default()
    }

    /// Number of store operations served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_conflict_key(&self, table: Table, conflict_key: &[&str]) -> Result<(), RemoteError> {
        let declared: HashSet<&str> = self
            .constraints
            .get(&table)
            .map(|cols| cols.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let requested: HashSet<&str> = conflict_key.iter().copied().collect();

        if declared.is_empty() || declared != requested {
            return Err(RemoteError::Constraint(format!(
                "no unique constraint on {}({}) matches the conflict target",
                table,
                conflict_key.join(", ")
            )));
        }
        Ok(())
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn key_of(row: &RemoteRow, conflict_key: &[&str]) -> Result<Vec<String>, RemoteError> {
    conflict_key
        .iter()
        .map(|col| match row.get(*col) {
            Some(Value::Null) | None => Err(RemoteError::Constraint(format!(
                "null value in conflict column {}",
                col
            ))),
            Some(v) => Ok(v.to_string()),
        })
        .collect()
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(
        &self,
        table: Table,
        rows: Vec<RemoteRow>,
        conflict_key: &[&str],
    ) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_conflict_key(table, conflict_key)?;

        // Validate the whole batch before applying any of it
        let mut batch_keys = HashSet::new();
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let key = key_of(&row, conflict_key)?;
            if !batch_keys.insert(key.clone()) {
                return Err(RemoteError::Constraint(format!(
                    "upsert into {} would affect the same row twice",
                    table
                )));
            }
            keyed.push((key, row));
        }

        let mut tables = self.tables.lock();
        let existing = tables.entry(table).or_default();
        for (key, row) in keyed {
            let slot = existing
                .iter()
                .position(|r| key_of(r, conflict_key).ok().as_ref() == Some(&key));
            match slot {
                Some(idx) => {
                    let current = &mut existing[idx];
                    for (col, value) in row {
                        current.insert(col, value);
                    }
                }
                None => existing.push(row),
            }
        }
        Ok(())
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if filter.is_empty() {
            return Err(RemoteError::InvalidFilter(
                "refusing to delete without a filter".to_string(),
            ));
        }

        if let Some(rows) = self.tables.lock().get_mut(&table) {
            rows.retain(|row| !filter.matches(row));
        }
        Ok(())
    }

    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<RemoteRow>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tables
            .lock()
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }
}
