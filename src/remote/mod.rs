//! Remote store contract
//!
//! The cloud copy of the three tables is reached through the `RemoteStore`
//! trait: upsert by conflict key, delete by filter, select by filter.
//!
//! # Implementations
//!
//! - `RestRemoteStore`: PostgREST-style HTTP backend
//! - `MemoryRemoteStore`: in-process tables with enforced unique constraints

mod memory;
mod rest;

pub use memory::MemoryRemoteStore;
pub use rest::RestRemoteStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::records::{OwnerId, Table};

/// A remote row: column name to JSON value
pub type RemoteRow = Map<String, Value>;

/// Column every remote row and filter is scoped by
pub const OWNER_COLUMN: &str = "coach_id";

/// Column holding the denormalized record payload
pub const PAYLOAD_COLUMN: &str = "data";

/// DDL the remote backend must carry for upserts to resolve on natural keys
pub const REMOTE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS students (
    id BIGSERIAL PRIMARY KEY,
    coach_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    full_name TEXT,
    data JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (coach_id, student_id)
);

CREATE TABLE IF NOT EXISTS attendance (
    id BIGSERIAL PRIMARY KEY,
    coach_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    date DATE NOT NULL,
    status TEXT,
    data JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (coach_id, student_id, date)
);

CREATE TABLE IF NOT EXISTS performance (
    id BIGSERIAL PRIMARY KEY,
    coach_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    assessment_date DATE NOT NULL,
    data JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (coach_id, student_id, assessment_date)
);
"#;

/// Remote store errors
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq { column, .. } | Condition::In { column, .. } => column,
        }
    }

    fn matches(&self, row: &RemoteRow) -> bool {
        match self {
            Condition::Eq { column, value } => row.get(column) == Some(value),
            Condition::In { column, values } => row
                .get(column)
                .map(|v| values.contains(v))
                .unwrap_or(false),
        }
    }
}

/// Conjunction of conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Filter scoped to a single owner
    pub fn owner(owner: &OwnerId) -> Self {
        Self::default().eq(OWNER_COLUMN, owner.as_str())
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn is_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, row: &RemoteRow) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

/// Remote store operations used by the sync engine
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or update rows, resolving conflicts on `conflict_key`
    async fn upsert(
        &self,
        table: Table,
        rows: Vec<RemoteRow>,
        conflict_key: &[&str],
    ) -> Result<(), RemoteError>;

    /// Delete every row matching `filter`. An empty filter is rejected.
    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), RemoteError>;

    /// Fetch every row matching `filter`
    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<RemoteRow>, RemoteError>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn upsert(
        &self,
        table: Table,
        rows: Vec<RemoteRow>,
        conflict_key: &[&str],
    ) -> Result<(), RemoteError> {
        (**self).upsert(table, rows, conflict_key).await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), RemoteError> {
        (**self).delete(table, filter).await
    }

    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<RemoteRow>, RemoteError> {
        (**self).select(table, filter).await
    }
}
