//! Local record API routes
//!
//! Reads and writes the caller's local copy. Deletions queue a tombstone that
//! the next sync pass propagates.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use super::require_owner;
use crate::db::{LocalStore, SqliteLocalStore};
use crate::error::{AppError, Result};
use crate::records::{
    AttendanceEntry, OwnerId, PerformanceEntry, RecordKey, Student, SyncRecord, Table,
};
use crate::state::AppState;

/// Create the records router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:table", get(list_records).put(put_record))
        .route("/:table/:student_id", delete(delete_record))
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

async fn list_of<T: SyncRecord>(
    store: &SqliteLocalStore,
    owner: &OwnerId,
    date: Option<NaiveDate>,
) -> Result<Value> {
    let records: Vec<T> = match date {
        Some(date) => store.on_date(owner, date).await?,
        None => store.list(owner).await?,
    };
    Ok(serde_json::to_value(records)?)
}

async fn put_one<T: SyncRecord>(
    store: &SqliteLocalStore,
    owner: &OwnerId,
    body: Value,
) -> Result<Value> {
    let record: T = serde_json::from_value(body)?;
    if record.key().student_id().is_empty() {
        return Err(AppError::BadRequest("studentId must not be empty".to_string()));
    }
    store.put(owner, &record).await?;
    Ok(serde_json::to_value(record)?)
}

/// List the caller's records, optionally only those on `?date=`
async fn list_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(table): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>> {
    let owner = require_owner(&headers)?;
    let table: Table = table.parse()?;
    if query.date.is_some() && !table.is_dated() {
        return Err(AppError::BadRequest(format!("{} records have no date", table)));
    }

    let store = state.store();
    let records = match table {
        Table::Students => list_of::<Student>(store, &owner, query.date).await?,
        Table::Attendance => list_of::<AttendanceEntry>(store, &owner, query.date).await?,
        Table::Performance => list_of::<PerformanceEntry>(store, &owner, query.date).await?,
    };
    Ok(Json(records))
}

/// Add or update a record by its natural key
async fn put_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let owner = require_owner(&headers)?;
    let table: Table = table.parse()?;

    let store = state.store();
    let record = match table {
        Table::Students => put_one::<Student>(store, &owner, body).await?,
        Table::Attendance => put_one::<AttendanceEntry>(store, &owner, body).await?,
        Table::Performance => put_one::<PerformanceEntry>(store, &owner, body).await?,
    };
    Ok(Json(record))
}

/// Delete a record and queue its tombstone
async fn delete_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((table, student_id)): Path<(String, String)>,
    Query(query): Query<DateQuery>,
) -> Result<StatusCode> {
    let owner = require_owner(&headers)?;
    let table: Table = table.parse()?;
    let key = RecordKey::new(table, student_id, query.date)?;

    if state.store().delete(&owner, &key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("No record: {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::{create_memory_pool, SqliteLocalStore};
    use crate::records::OwnerId;
    use crate::remote::MemoryRemoteStore;
    use crate::routes::app;
    use crate::state::AppState;

    async fn setup() -> AppState {
        let pool = create_memory_pool().await.unwrap();
        AppState::new(
            Config::default(),
            SqliteLocalStore::new(pool),
            Arc::new(MemoryRemoteStore::new()),
        )
    }

    fn request(method: &str, uri: &str, owner: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(owner) = owner {
            builder = builder.header("x-owner-id", owner);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn attendance(student_id: &str, date: &str) -> Value {
        json!({
            "studentId": student_id,
            "date": date,
            "status": "Present",
            "session": "Morning",
            "batchId": "U13",
        })
    }

    #[tokio::test]
    async fn test_missing_owner_is_unauthorized() {
        let response = app(setup().await)
            .oneshot(request("GET", "/api/v1/records/students", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_table_is_bad_request() {
        let response = app(setup().await)
            .oneshot(request("GET", "/api/v1/records/coaches", Some("coach-a"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put_then_list_by_date() {
        let state = setup().await;
        for (id, date) in [("STU-1", "2024-01-10"), ("STU-2", "2024-01-11")] {
            let response = app(state.clone())
                .oneshot(request(
                    "PUT",
                    "/api/v1/records/attendance",
                    Some("coach-a"),
                    Some(attendance(id, date)),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app(state)
            .oneshot(request(
                "GET",
                "/api/v1/records/attendance?date=2024-01-10",
                Some("coach-a"),
                None,
            ))
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["studentId"], "STU-1");
    }

    #[tokio::test]
    async fn test_invalid_record_is_unprocessable() {
        let response = app(setup().await)
            .oneshot(request(
                "PUT",
                "/api/v1/records/attendance",
                Some("coach-a"),
                Some(json!({ "studentId": "STU-1" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_delete_queues_tombstone() {
        let state = setup().await;
        app(state.clone())
            .oneshot(request(
                "PUT",
                "/api/v1/records/attendance",
                Some("coach-a"),
                Some(attendance("STU-1", "2024-01-10")),
            ))
            .await
            .unwrap();

        let uri = "/api/v1/records/attendance/STU-1?date=2024-01-10";
        let response = app(state.clone())
            .oneshot(request("DELETE", uri, Some("coach-a"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let owner = OwnerId::new("coach-a");
        assert_eq!(state.store().pending_deletions(&owner).await.unwrap(), 1);

        let response = app(state.clone())
            .oneshot(request("DELETE", uri, Some("coach-a"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.store().pending_deletions(&owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_dated_record_requires_date() {
        let response = app(setup().await)
            .oneshot(request(
                "DELETE",
                "/api/v1/records/performance/STU-1",
                Some("coach-a"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
