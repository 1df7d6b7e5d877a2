//! Targets a migration executor can run against.
//!
//! A backend owns the ledger, the single-writer lock and the atomic scope
//! each unit runs in. [`PostgresBackend`] drives a real database;
//! [`MemoryBackend`] applies the same directives to an in-memory schema
//! with row-level constraint enforcement.

mod memory;
mod postgres;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use tenantry_core::error::Result;
use tenantry_core::schema::Direction;

use crate::migrations::Migration;

pub use memory::{MemoryBackend, Row};
pub use postgres::PostgresBackend;

/// A ledger entry for an applied unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub id: String,
    pub applied_at: DateTime<Utc>,
    pub checksum: Option<String>,
    pub execution_time_ms: Option<i32>,
}

pub trait SchemaBackend: Send + Sync {
    /// Create the ledger if it does not exist.
    fn ensure_ledger(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Try to take the single-writer lock without blocking.
    fn try_lock(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;

    fn unlock(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Release the lock without awaiting.
    ///
    /// Called from `Drop` when a run is cancelled or its `unlock` fails, so it
    /// must not block. A later `try_lock` from any holder must succeed.
    fn release_abandoned_lock(&self);

    /// Ledger entries, in no particular order.
    fn applied(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AppliedMigration>>> + Send + '_>>;

    /// Run one half of a unit in a single atomic scope.
    ///
    /// `up` records the unit in the ledger and fails with an ordering
    /// violation if it is already there; `down` removes the entry and fails
    /// if there is none. Either the directives and the ledger change both
    /// take effect or neither does.
    fn run_unit<'a>(
        &'a self,
        migration: &'a Migration,
        direction: Direction,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
