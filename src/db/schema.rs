//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::StoreError;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

// Record tables share one shape. `record_date` is '' for students so the
// natural-key UNIQUE constraint never compares NULLs.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    record_date TEXT NOT NULL DEFAULT '',
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE(owner_id, student_id, record_date)
);

CREATE INDEX IF NOT EXISTS idx_students_owner ON students(owner_id);

CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    record_date TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE(owner_id, student_id, record_date)
);

CREATE INDEX IF NOT EXISTS idx_attendance_owner_date ON attendance(owner_id, record_date);

CREATE TABLE IF NOT EXISTS performance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    record_date TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE(owner_id, student_id, record_date)
);

CREATE INDEX IF NOT EXISTS idx_performance_owner_date ON performance(owner_id, record_date);

-- Deletion outbox, drained by the next sync
CREATE TABLE IF NOT EXISTS deleted_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    table_name TEXT NOT NULL CHECK (table_name IN ('students', 'attendance', 'performance')),
    item_id TEXT NOT NULL,
    record_date TEXT,
    deleted_at TEXT NOT NULL,

    CHECK (table_name = 'students' OR record_date IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_deleted_records_owner ON deleted_records(owner_id);
"#;
