//! Academy records
//!
//! Typed payloads for the three synced tables and the keys that identify
//! them across the local and remote stores.

mod types;

pub use types::{
    AttendanceEntry, AttendanceStatus, Gender, KeyError, MembershipStatus, OwnerId,
    PerformanceEntry, RecordKey, SkillLevel, Student, SyncRecord, Table,
};
