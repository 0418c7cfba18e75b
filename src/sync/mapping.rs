//! Record <-> remote row mapping
//!
//! Remote rows carry the owner, the natural key columns, a few summary
//! columns and the full payload blob. Dates travel as text and are rebuilt
//! here on the way back, once per table.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::records::{OwnerId, SyncRecord, Table};
use crate::remote::{RemoteRow, OWNER_COLUMN, PAYLOAD_COLUMN};

/// Errors converting between records and remote rows
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("row has no payload")]
    MissingPayload,

    #[error("payload is not an object: {0}")]
    MalformedPayload(String),

    #[error("required date field {field} is missing")]
    MissingDate { field: &'static str },

    #[error("date field {field} has invalid value {value}")]
    InvalidDate { field: &'static str, value: String },

    #[error("payload does not decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A payload field holding a date
#[derive(Debug, Clone, Copy)]
struct DateField {
    name: &'static str,
    required: bool,
}

const fn required(name: &'static str) -> DateField {
    DateField {
        name,
        required: true,
    }
}

const fn optional(name: &'static str) -> DateField {
    DateField {
        name,
        required: false,
    }
}

fn date_fields(table: Table) -> &'static [DateField] {
    static STUDENTS: [DateField; 2] = [required("dateOfBirth"), required("enrollmentDate")];
    static ATTENDANCE: [DateField; 1] = [required("date")];
    static PERFORMANCE: [DateField; 2] =
        [required("assessmentDate"), optional("nextAssessmentDate")];

    match table {
        Table::Students => &STUDENTS,
        Table::Attendance => &ATTENDANCE,
        Table::Performance => &PERFORMANCE,
    }
}

/// Parse a date as it arrives from transport.
///
/// Accepts `YYYY-MM-DD` and RFC 3339 timestamps; a timestamp maps to its UTC
/// calendar date.
pub fn parse_transport_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
}

fn coerce_date(payload: &mut Map<String, Value>, field: DateField) -> Result<(), MappingError> {
    let parsed = match payload.get(field.name) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(parse_transport_date(s).ok_or_else(|| {
            MappingError::InvalidDate {
                field: field.name,
                value: s.clone(),
            }
        })?),
        Some(other) => {
            return Err(MappingError::InvalidDate {
                field: field.name,
                value: other.to_string(),
            })
        }
    };

    match parsed {
        Some(date) => {
            payload.insert(field.name.to_string(), Value::String(date.to_string()));
        }
        None if field.required => return Err(MappingError::MissingDate { field: field.name }),
        None => {
            payload.remove(field.name);
        }
    }
    Ok(())
}

/// Build the remote row for a local record
pub fn to_remote_row<T: SyncRecord>(
    owner: &OwnerId,
    record: &T,
    pushed_at: DateTime<Utc>,
) -> Result<RemoteRow, MappingError> {
    let key = record.key();
    let mut row = RemoteRow::new();

    row.insert(OWNER_COLUMN.to_string(), Value::String(owner.to_string()));
    row.insert(
        "student_id".to_string(),
        Value::String(key.student_id().to_string()),
    );
    if let (Some(column), Some(date)) = (T::TABLE.date_column(), key.date()) {
        row.insert(column.to_string(), Value::String(date.to_string()));
    }
    for (column, value) in record.remote_columns() {
        row.insert(column.to_string(), value);
    }
    row.insert(PAYLOAD_COLUMN.to_string(), serde_json::to_value(record)?);
    row.insert(
        "updated_at".to_string(),
        Value::String(pushed_at.to_rfc3339()),
    );

    Ok(row)
}

/// Rebuild a record from the payload blob of a remote row
pub fn from_remote_row<T: SyncRecord>(row: &RemoteRow) -> Result<T, MappingError> {
    let mut payload = match row.get(PAYLOAD_COLUMN) {
        None | Some(Value::Null) => return Err(MappingError::MissingPayload),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => return Err(MappingError::MalformedPayload(other.to_string())),
    };

    for field in date_fields(T::TABLE) {
        coerce_date(&mut payload, *field)?;
    }

    Ok(serde_json::from_value(Value::Object(payload))?)
}
