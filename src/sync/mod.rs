//! Sync module for offline-first reconciliation
//!
//! Provides:
//! - Tombstone draining for local deletions
//! - Idempotent push of local records
//! - Additive pull of remote records
//!
//! # Sync Pass
//!
//! 1. Queued deletions are propagated to the remote store, then cleared
//! 2. Every local record is upserted remotely on its natural key
//! 3. Every remote record for the owner is upserted locally
//!
//! A failure in any step ends the pass; later steps do not run. A pull never
//! removes local records.

mod engine;
pub mod mapping;
mod types;

pub use engine::SyncEngine;
pub use mapping::{from_remote_row, parse_transport_date, to_remote_row, MappingError};
pub use types::{
    PassResult, SkipReason, SyncError, SyncFailure, SyncOutcome, SyncPhase, SyncState,
    SyncStatus, SyncSummary, TableCounts,
};
