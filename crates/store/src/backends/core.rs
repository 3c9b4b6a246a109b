//! Core Database Backend Traits
//!
//! The orchestrator never talks to a driver directly. Commands, the
//! bookkeeping store and migration bodies all run through a
//! [`StoreTransaction`] obtained from a [`MigrationDatabase`].

use crate::error::StoreResult;
use crate::security::Identifier;
use crate::version::{MigrationIndex, MigrationState, VersionRow};
use async_trait::async_trait;
use std::time::Duration;

/// Advisory lock key taken by every command transaction ("STRATA")
pub const MIGRATION_LOCK_KEY: i64 = 0x5354_5241_5441;

/// Legacy key-value table consulted by the initial-migration stats branch
pub const LEGACY_MODELS_TABLE: &str = "models";

/// Supported backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    PostgreSQL,
    Memory,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::PostgreSQL => write!(f, "postgresql"),
            BackendType::Memory => write!(f, "memory"),
        }
    }
}

/// A database the orchestrator can open transactions against
#[async_trait]
pub trait MigrationDatabase: Send + Sync {
    /// Begin a new transaction
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    /// Round-trip latency of a trivial query
    async fn health_check(&self) -> StoreResult<Duration>;

    fn backend_type(&self) -> BackendType;
}

/// An open transaction
///
/// Dropping a transaction without calling [`commit`](StoreTransaction::commit)
/// discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Create the `version` table if it does not exist
    async fn ensure_version_table(&mut self) -> StoreResult<()>;

    async fn version_table_exists(&mut self) -> StoreResult<bool>;

    /// All rows of the `version` table, in no particular order
    async fn read_versions(&mut self) -> StoreResult<Vec<VersionRow>>;

    /// Insert a row unless one exists for `index`; returns whether it inserted
    async fn insert_version_if_absent(
        &mut self,
        index: MigrationIndex,
        state: MigrationState,
    ) -> StoreResult<bool>;

    /// Update an existing row; fails with `MissingVersion` if there is none
    async fn update_version(
        &mut self,
        index: MigrationIndex,
        state: MigrationState,
    ) -> StoreResult<()>;

    /// Take the transaction-scoped migration lock
    async fn lock_migrations(&mut self) -> StoreResult<()>;

    async fn table_exists(&mut self, table: &Identifier) -> StoreResult<bool>;

    /// `count(*)` of a table; fails with `MissingTable` if it does not exist
    async fn count_rows(&mut self, table: &Identifier) -> StoreResult<u64>;

    /// Live legacy models of a collection: `fqid like 'collection/%' and not deleted`
    async fn count_legacy_models(&mut self, collection: &Identifier) -> StoreResult<u64>;

    /// Execute raw SQL (possibly several statements); returns affected rows
    async fn execute(&mut self, sql: &str) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
