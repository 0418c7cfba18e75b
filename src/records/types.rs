//! Record types
//!
//! Defines the synced payloads and their natural keys:
//! - `Student` keyed by `studentId`
//! - `AttendanceEntry` keyed by `studentId` + `date`
//! - `PerformanceEntry` keyed by `studentId` + `assessmentDate`

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identifier of the coach/account that owns a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The three synced tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Students,
    Attendance,
    Performance,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Students, Table::Attendance, Table::Performance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Students => "students",
            Table::Attendance => "attendance",
            Table::Performance => "performance",
        }
    }

    /// Remote column holding the date half of the natural key, if any
    pub fn date_column(&self) -> Option<&'static str> {
        match self {
            Table::Students => None,
            Table::Attendance => Some("date"),
            Table::Performance => Some("assessment_date"),
        }
    }

    /// Column set the remote upsert resolves conflicts on.
    ///
    /// The remote must carry a unique constraint over exactly these columns.
    pub fn conflict_key(&self) -> &'static [&'static str] {
        match self {
            Table::Students => &["coach_id", "student_id"],
            Table::Attendance => &["coach_id", "student_id", "date"],
            Table::Performance => &["coach_id", "student_id", "assessment_date"],
        }
    }

    pub fn is_dated(&self) -> bool {
        self.date_column().is_some()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "students" => Ok(Table::Students),
            "attendance" => Ok(Table::Attendance),
            "performance" => Ok(Table::Performance),
            other => Err(KeyError::UnknownTable(other.to_string())),
        }
    }
}

/// Errors building a natural key
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("{0} records are keyed by student id and date; date is missing")]
    MissingDate(Table),

    #[error("students are keyed by student id alone; unexpected date")]
    UnexpectedDate,

    #[error("student id must not be empty")]
    EmptyStudentId,
}

/// Natural key of a record: table, student id and, for dated tables, the date
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    table: Table,
    student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<NaiveDate>,
}

impl RecordKey {
    pub fn new(
        table: Table,
        student_id: impl Into<String>,
        date: Option<NaiveDate>,
    ) -> Result<Self, KeyError> {
        let student_id = student_id.into();
        if student_id.is_empty() {
            return Err(KeyError::EmptyStudentId);
        }
        match (table.is_dated(), date) {
            (true, None) => Err(KeyError::MissingDate(table)),
            (false, Some(_)) => Err(KeyError::UnexpectedDate),
            _ => Ok(Self {
                table,
                student_id,
                date,
            }),
        }
    }

    pub fn student(student_id: impl Into<String>) -> Self {
        Self {
            table: Table::Students,
            student_id: student_id.into(),
            date: None,
        }
    }

    pub fn attendance(student_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            table: Table::Attendance,
            student_id: student_id.into(),
            date: Some(date),
        }
    }

    pub fn performance(student_id: impl Into<String>, assessment_date: NaiveDate) -> Self {
        Self {
            table: Table::Performance,
            student_id: student_id.into(),
            date: Some(assessment_date),
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date {
            Some(date) => write!(f, "{}/{}@{}", self.table, self.student_id, date),
            None => write!(f, "{}/{}", self.table, self.student_id),
        }
    }
}

/// A record type that participates in sync
pub trait SyncRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;

    fn key(&self) -> RecordKey;

    /// Structured columns mirrored next to the payload blob on the remote row
    fn remote_columns(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    #[serde(rename = "On Leave")]
    OnLeave,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::OnLeave => "On Leave",
        }
    }
}

/// A student on the academy roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub student_id: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub contact_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub emergency_contact: String,
    pub enrollment_date: NaiveDate,
    pub batch: String,
    pub skill_level: SkillLevel,
    pub membership_status: MembershipStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_contact: Option<String>,
}

impl SyncRecord for Student {
    const TABLE: Table = Table::Students;

    fn key(&self) -> RecordKey {
        RecordKey::student(&self.student_id)
    }

    fn remote_columns(&self) -> Vec<(&'static str, Value)> {
        vec![("full_name", Value::String(self.full_name.clone()))]
    }
}

/// Attendance mark for one student on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub session: String,
    pub batch_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SyncRecord for AttendanceEntry {
    const TABLE: Table = Table::Attendance;

    fn key(&self) -> RecordKey {
        RecordKey::attendance(&self.student_id, self.date)
    }

    fn remote_columns(&self) -> Vec<(&'static str, Value)> {
        vec![("status", Value::String(self.status.as_str().to_string()))]
    }
}

/// Skill assessment of a student on a given date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEntry {
    pub student_id: String,
    pub assessment_date: NaiveDate,
    pub footwork: u8,
    pub serve_quality: u8,
    pub stroke_quality: u8,
    pub stroke_consistency: u8,
    pub smash_power: u8,
    pub chops_drop_shots: u8,
    pub defense_skills: u8,
    pub court_coverage: u8,
    pub stamina: u8,
    pub physical_fitness: u8,
    pub mindset: u8,
    pub matches_played: u32,
    pub matches_won: u32,
    pub improvement_areas: String,
    pub strengths: String,
    pub coach_comments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_assessment_date: Option<NaiveDate>,
}

impl SyncRecord for PerformanceEntry {
    const TABLE: Table = Table::Performance;

    fn key(&self) -> RecordKey {
        RecordKey::performance(&self.student_id, self.assessment_date)
    }
}
