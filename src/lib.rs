//! Academy Sync
//!
//! Offline-first sync for an academy roster: a local SQLite copy of students,
//! attendance and performance records, reconciled with a hosted PostgREST
//! backend.
//!
//! # Modules
//!
//! - `records`: Typed records and their natural keys
//! - `db`: Local store and the deletion outbox
//! - `remote`: Remote store contract, REST and in-memory backends
//! - `sync`: The sync engine and record mapping
//! - `routes`: HTTP surface

pub mod config;
pub mod db;
pub mod error;
pub mod records;
pub mod remote;
pub mod routes;
pub mod state;
pub mod sync;
