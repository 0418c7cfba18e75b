//! Local record store
//!
//! SQLite-backed tables for the three record sets, keyed per owner by natural
//! key, plus the `deleted_records` outbox.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::StoreError;
use crate::records::{OwnerId, RecordKey, SyncRecord, Table};

/// A queued deletion waiting for remote propagation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Outbox surrogate key
    pub id: i64,
    pub owner_id: OwnerId,
    pub key: RecordKey,
    pub deleted_at: DateTime<Utc>,
}

/// Local store operations used by the sync engine
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// All records of `T`'s table belonging to `owner`
    async fn list<T: SyncRecord>(&self, owner: &OwnerId) -> Result<Vec<T>, StoreError>;

    /// Lookup by natural key
    async fn get<T: SyncRecord>(
        &self,
        owner: &OwnerId,
        key: &RecordKey,
    ) -> Result<Option<T>, StoreError>;

    /// Add or update a record by natural key
    async fn put<T: SyncRecord>(&self, owner: &OwnerId, record: &T) -> Result<(), StoreError>;

    /// Add or update many records in one transaction
    async fn bulk_put<T: SyncRecord>(
        &self,
        owner: &OwnerId,
        records: &[T],
    ) -> Result<usize, StoreError>;

    /// Upsert pulled records in one transaction, skipping any whose deletion
    /// is still queued for `owner`. Returns the number written.
    async fn merge_pulled<T: SyncRecord>(
        &self,
        owner: &OwnerId,
        records: &[T],
    ) -> Result<usize, StoreError>;

    /// Delete a record and queue its tombstone atomically.
    ///
    /// Returns false, and queues nothing, when no such record exists.
    async fn delete(&self, owner: &OwnerId, key: &RecordKey) -> Result<bool, StoreError>;

    /// Remove every local record of a table for `owner` without queuing tombstones
    async fn clear(&self, owner: &OwnerId, table: Table) -> Result<u64, StoreError>;

    /// Pending tombstones for `owner`, oldest first
    async fn tombstones(&self, owner: &OwnerId) -> Result<Vec<Tombstone>, StoreError>;

    /// Drop drained tombstones by outbox id
    async fn remove_tombstones(&self, ids: &[i64]) -> Result<(), StoreError>;
}

/// SQLite implementation of `LocalStore`
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Records of a dated table recorded on `date`
    pub async fn on_date<T: SyncRecord>(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
    ) -> Result<Vec<T>, StoreError> {
        if !T::TABLE.is_dated() {
            return Ok(Vec::new());
        }

        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT data FROM {} WHERE owner_id = ? AND record_date = ? ORDER BY student_id",
            T::TABLE
        ))
        .bind(owner.as_str())
        .bind(date.to_string())
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows)
    }

    /// Number of tombstones queued for `owner`
    pub async fn pending_deletions(&self, owner: &OwnerId) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM deleted_records WHERE owner_id = ?")
            .bind(owner.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

fn date_text(key: &RecordKey) -> String {
    key.date().map(|d| d.to_string()).unwrap_or_default()
}

fn check_table<T: SyncRecord>(key: &RecordKey) -> Result<(), StoreError> {
    if key.table() != T::TABLE {
        return Err(StoreError::TableMismatch {
            expected: T::TABLE,
            found: key.table(),
        });
    }
    Ok(())
}

fn decode_all<T: SyncRecord>(rows: Vec<(String,)>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data).map_err(StoreError::from))
        .collect()
}

async fn upsert_one<T: SyncRecord>(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    record: &T,
    now: &str,
) -> Result<(), StoreError> {
    let key = record.key();
    let data = serde_json::to_string(record)?;

    sqlx::query(&format!(
        r#"
        INSERT INTO {} (owner_id, student_id, record_date, data, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(owner_id, student_id, record_date) DO UPDATE SET
            data = excluded.data,
            updated_at = excluded.updated_at
        "#,
        T::TABLE
    ))
    .bind(owner.as_str())
    .bind(key.student_id())
    .bind(date_text(&key))
    .bind(&data)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn list<T: SyncRecord>(&self, owner: &OwnerId) -> Result<Vec<T>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT data FROM {} WHERE owner_id = ? ORDER BY student_id, record_date",
            T::TABLE
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows)
    }

    async fn get<T: SyncRecord>(
        &self,
        owner: &OwnerId,
        key: &RecordKey,
    ) -> Result<Option<T>, StoreError> {
        check_table::<T>(key)?;

        let row: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT data FROM {} WHERE owner_id = ? AND student_id = ? AND record_date = ?",
            T::TABLE
        ))
        .bind(owner.as_str())
        .bind(key.student_id())
        .bind(date_text(key))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(data,)| serde_json::from_str(&data).map_err(StoreError::from))
            .transpose()
    }

    async fn put<T: SyncRecord>(&self, owner: &OwnerId, record: &T) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.acquire().await?;
        upsert_one(&mut *conn, owner, record, &now).await
    }

    async fn bulk_put<T: SyncRecord>(
        &self,
        owner: &OwnerId,
        records: &[T],
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for record in records {
            upsert_one(&mut *tx, owner, record, &now).await?;
        }
        tx.commit().await?;

        Ok(records.len())
    }

    async fn merge_pulled<T: SyncRecord>(
        &self,
        owner: &OwnerId,
        records: &[T],
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let mut written = 0;
        let mut tx = self.pool.begin().await?;
        for record in records {
            let key = record.key();
            let (queued,): (i64,) = sqlx::query_as(
                r#"
                SELECT COUNT(*) FROM deleted_records
                WHERE owner_id = ? AND table_name = ? AND item_id = ?
                  AND COALESCE(record_date, '') = ?
                "#,
            )
            .bind(owner.as_str())
            .bind(T::TABLE.as_str())
            .bind(key.student_id())
            .bind(date_text(&key))
            .fetch_one(&mut *tx)
            .await?;

            if queued > 0 {
                tracing::debug!("Skipping pulled {}: deletion still queued", key);
                continue;
            }
            upsert_one(&mut *tx, owner, record, &now).await?;
            written += 1;
        }
        tx.commit().await?;

        Ok(written)
    }

    async fn delete(&self, owner: &OwnerId, key: &RecordKey) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE owner_id = ? AND student_id = ? AND record_date = ?",
            key.table()
        ))
        .bind(owner.as_str())
        .bind(key.student_id())
        .bind(date_text(key))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO deleted_records (owner_id, table_name, item_id, record_date, deleted_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(owner.as_str())
        .bind(key.table().as_str())
        .bind(key.student_id())
        .bind(key.date().map(|d| d.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!("Deleted {} for {} and queued tombstone", key, owner);

        Ok(true)
    }

    async fn clear(&self, owner: &OwnerId, table: Table) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE owner_id = ?", table))
            .bind(owner.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn tombstones(&self, owner: &OwnerId) -> Result<Vec<Tombstone>, StoreError> {
        let rows = sqlx::query_as::<_, TombstoneRow>(
            r#"
            SELECT id, owner_id, table_name, item_id, record_date, deleted_at
            FROM deleted_records
            WHERE owner_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_tombstone()).collect()
    }

    async fn remove_tombstones(&self, ids: &[i64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
        let query = format!(
            "DELETE FROM deleted_records WHERE id IN ({})",
            placeholders.join(", ")
        );

        let mut q = sqlx::query(&query);
        for id in ids {
            q = q.bind(*id);
        }

        q.execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TombstoneRow {
    id: i64,
    owner_id: String,
    table_name: String,
    item_id: String,
    record_date: Option<String>,
    deleted_at: String,
}

impl TombstoneRow {
    fn into_tombstone(self) -> Result<Tombstone, StoreError> {
        let corrupt = |message: String| StoreError::Corrupt {
            table: "deleted_records".to_string(),
            message,
        };

        let table: Table = self.table_name.parse()?;
        let date = self
            .record_date
            .as_deref()
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| corrupt(format!("tombstone {} has bad date: {}", self.id, e)))?;
        let deleted_at = DateTime::parse_from_rfc3339(&self.deleted_at)
            .map_err(|e| corrupt(format!("tombstone {} has bad timestamp: {}", self.id, e)))?
            .with_timezone(&Utc);

        Ok(Tombstone {
            id: self.id,
            owner_id: OwnerId::new(self.owner_id),
            key: RecordKey::new(table, self.item_id, date)?,
            deleted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;
    use crate::records::{AttendanceEntry, AttendanceStatus};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn mark(student_id: &str, day: &str, status: AttendanceStatus) -> AttendanceEntry {
        AttendanceEntry {
            student_id: student_id.to_string(),
            date: date(day),
            status,
            session: "Morning".to_string(),
            batch_id: "U13".to_string(),
            notes: None,
        }
    }

    async fn setup_store() -> SqliteLocalStore {
        SqliteLocalStore::new(create_memory_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_put_overwrites_by_natural_key() {
        let store = setup_store().await;
        let owner = OwnerId::new("coach-a");

        store
            .put(&owner, &mark("STU-1", "2024-01-10", AttendanceStatus::Present))
            .await
            .unwrap();
        store
            .put(&owner, &mark("STU-1", "2024-01-10", AttendanceStatus::Late))
            .await
            .unwrap();

        let all: Vec<AttendanceEntry> = store.list(&owner).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn test_list_is_owner_scoped() {
        let store = setup_store().await;
        let a = OwnerId::new("coach-a");
        let b = OwnerId::new("coach-b");

        store
            .bulk_put(
                &a,
                &[
                    mark("STU-1", "2024-01-10", AttendanceStatus::Present),
                    mark("STU-2", "2024-01-10", AttendanceStatus::Absent),
                ],
            )
            .await
            .unwrap();
        store
            .put(&b, &mark("STU-1", "2024-01-10", AttendanceStatus::OnLeave))
            .await
            .unwrap();

        let for_a: Vec<AttendanceEntry> = store.list(&a).await.unwrap();
        let for_b: Vec<AttendanceEntry> = store.list(&b).await.unwrap();
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_b, vec![mark("STU-1", "2024-01-10", AttendanceStatus::OnLeave)]);

        let key = RecordKey::attendance("STU-1", date("2024-01-10"));
        let got: Option<AttendanceEntry> = store.get(&a, &key).await.unwrap();
        assert_eq!(got.unwrap().status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn test_on_date_lookup() {
        let store = setup_store().await;
        let owner = OwnerId::new("coach-a");

        store
            .bulk_put(
                &owner,
                &[
                    mark("STU-1", "2024-01-10", AttendanceStatus::Present),
                    mark("STU-1", "2024-01-11", AttendanceStatus::Late),
                    mark("STU-2", "2024-01-11", AttendanceStatus::Absent),
                ],
            )
            .await
            .unwrap();

        let day: Vec<AttendanceEntry> = store.on_date(&owner, date("2024-01-11")).await.unwrap();
        assert_eq!(day.len(), 2);
        assert!(day.iter().all(|m| m.date == date("2024-01-11")));
    }

    #[tokio::test]
    async fn test_delete_queues_tombstone() {
        let store = setup_store().await;
        let owner = OwnerId::new("coach-a");
        let key = RecordKey::attendance("STU-1", date("2024-01-10"));

        store
            .put(&owner, &mark("STU-1", "2024-01-10", AttendanceStatus::Present))
            .await
            .unwrap();

        assert!(store.delete(&owner, &key).await.unwrap());
        assert!(store.get::<AttendanceEntry>(&owner, &key).await.unwrap().is_none());

        let queued = store.tombstones(&owner).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].key, key);
        assert_eq!(queued[0].owner_id, owner);
        assert_eq!(store.pending_deletions(&owner).await.unwrap(), 1);

        // Deleting something that is not there queues nothing
        assert!(!store.delete(&owner, &key).await.unwrap());
        assert_eq!(store.tombstones(&owner).await.unwrap().len(), 1);

        store.remove_tombstones(&[queued[0].id]).await.unwrap();
        assert!(store.tombstones(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_pulled_skips_keys_with_queued_deletion() {
        let store = setup_store().await;
        let owner = OwnerId::new("coach-a");
        let gone = RecordKey::attendance("STU-1", date("2024-01-10"));

        store
            .put(&owner, &mark("STU-1", "2024-01-10", AttendanceStatus::Present))
            .await
            .unwrap();
        store.delete(&owner, &gone).await.unwrap();

        let written = store
            .merge_pulled(
                &owner,
                &[
                    mark("STU-1", "2024-01-10", AttendanceStatus::Present),
                    mark("STU-2", "2024-01-10", AttendanceStatus::Late),
                ],
            )
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert!(store.get::<AttendanceEntry>(&owner, &gone).await.unwrap().is_none());
        let all: Vec<AttendanceEntry> = store.list(&owner).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].student_id, "STU-2");

        // The queued deletion belongs to coach-a only
        let other = OwnerId::new("coach-b");
        let written = store
            .merge_pulled(&other, &[mark("STU-1", "2024-01-10", AttendanceStatus::Absent)])
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_get_rejects_key_from_other_table() {
        let store = setup_store().await;
        let owner = OwnerId::new("coach-a");

        let err = store
            .get::<AttendanceEntry>(&owner, &RecordKey::student("STU-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TableMismatch { .. }));
    }

    #[tokio::test]
    async fn test_clear_does_not_queue_tombstones() {
        let store = setup_store().await;
        let owner = OwnerId::new("coach-a");

        store
            .put(&owner, &mark("STU-1", "2024-01-10", AttendanceStatus::Present))
            .await
            .unwrap();

        assert_eq!(store.clear(&owner, Table::Attendance).await.unwrap(), 1);
        assert!(store.tombstones(&owner).await.unwrap().is_empty());
    }
}
