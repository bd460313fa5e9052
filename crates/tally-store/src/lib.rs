//! # tally-store
//!
//! Transactional storage engine with a `SQLite` backend.
//!
//! - **Connection pool**: `r2d2` pool with per-connection pragmas; every
//!   operation checks out its own connection
//! - **Executor**: [`Database::execute`] runs guarded [`Transaction`]s and
//!   converts every driver fault into [`DbOpError`]
//! - **Patches**: [`PatchRunner`] applies idempotent schema steps in declared
//!   order at startup
//! - **Keep-alive**: [`ConnectionKeeper`] probes the pool and reconnects once on
//!   failure
//! - **Batch migration**: [`BatchMigrator`] copies one database into another in
//!   foreign-key order
//! - **Domain operations**: [`transactions`] and [`queries`] for the analytics
//!   tables

#![deny(unsafe_code)]

pub mod capability;
pub mod cleanup;
pub mod database;
pub mod errors;
pub mod keeper;
pub mod migrate;
pub mod patches;
pub mod periodic;
pub mod queries;
pub mod records;
pub mod sqlite;
pub mod transaction;
pub mod transactions;

pub use capability::{HashCapability, IpHasher, Sha256IpHasher};
pub use cleanup::CleanupTask;
pub use database::{Database, DbState};
pub use errors::{DbOpError, Result, StoreError};
pub use keeper::{ConnectionKeeper, ConnectionSlot, ProbeOutcome};
pub use migrate::{BatchMigrator, MigrationSummary};
pub use patches::{Patch, PatchRunner, PatchSummary};
pub use periodic::{PeriodicTask, Tick};
pub use sqlite::{ConnectionConfig, ConnectionPool, DbSource};
pub use transaction::{Outcome, Query, Transaction, TxContext};
