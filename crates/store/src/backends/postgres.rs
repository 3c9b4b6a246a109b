//! PostgreSQL Backend Implementation
//!
//! Implements the backend traits on top of sqlx. Migration indices are
//! stored as `INTEGER`, states as `TEXT`.

use super::core::*;
use crate::error::{StoreError, StoreResult};
use crate::security::Identifier;
use crate::version::{MigrationIndex, MigrationState, VersionRow, VERSION_TABLE};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row};
use std::time::{Duration, Instant};
use tracing::debug;

/// PostgreSQL database backed by a sqlx pool
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MigrationDatabase for PostgresDatabase {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to begin transaction: {}", e)))?;
        debug!("Began PostgreSQL transaction");
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn health_check(&self) -> StoreResult<Duration> {
        let start = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(start.elapsed())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::PostgreSQL
    }
}

/// An open PostgreSQL transaction
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn relation_exists(&mut self, quoted_name: String) -> StoreResult<bool> {
        let row = sqlx::query("SELECT to_regclass($1) IS NOT NULL")
            .bind(quoted_name)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.try_get::<bool, _>(0)?)
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn ensure_version_table(&mut self) -> StoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                migration_index INTEGER PRIMARY KEY,\n    \
                migration_state TEXT NOT NULL\n\
            )",
            VERSION_TABLE
        );
        sqlx::query(&sql).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn version_table_exists(&mut self) -> StoreResult<bool> {
        self.relation_exists(VERSION_TABLE.to_string()).await
    }

    async fn read_versions(&mut self) -> StoreResult<Vec<VersionRow>> {
        let sql = format!(
            "SELECT migration_index, migration_state FROM {} ORDER BY migration_index",
            VERSION_TABLE
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;

        let mut versions = Vec::with_capacity(rows.len());
        for row in rows {
            let index: i32 = row.try_get("migration_index")?;
            let state: String = row.try_get("migration_state")?;
            versions.push(VersionRow::new(index, state.parse()?));
        }
        Ok(versions)
    }

    async fn insert_version_if_absent(
        &mut self,
        index: MigrationIndex,
        state: MigrationState,
    ) -> StoreResult<bool> {
        let sql = format!(
            "INSERT INTO {} (migration_index, migration_state) VALUES ($1, $2) \
             ON CONFLICT (migration_index) DO NOTHING",
            VERSION_TABLE
        );
        let result = sqlx::query(&sql)
            .bind(index)
            .bind(state.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_version(
        &mut self,
        index: MigrationIndex,
        state: MigrationState,
    ) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET migration_state = $1 WHERE migration_index = $2",
            VERSION_TABLE
        );
        let result = sqlx::query(&sql)
            .bind(state.as_str())
            .bind(index)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingVersion(index));
        }
        Ok(())
    }

    async fn lock_migrations(&mut self) -> StoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn table_exists(&mut self, table: &Identifier) -> StoreResult<bool> {
        self.relation_exists(table.quoted()).await
    }

    async fn count_rows(&mut self, table: &Identifier) -> StoreResult<u64> {
        // a failed statement would abort the whole transaction, so check first
        if !self.table_exists(table).await? {
            return Err(StoreError::MissingTable(table.to_string()));
        }
        let sql = format!("SELECT COUNT(*) FROM {}", table.quoted());
        let row = sqlx::query(&sql).fetch_one(&mut *self.tx).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn count_legacy_models(&mut self, collection: &Identifier) -> StoreResult<u64> {
        if !self.relation_exists(LEGACY_MODELS_TABLE.to_string()).await? {
            return Err(StoreError::MissingTable(LEGACY_MODELS_TABLE.to_string()));
        }
        // prefix compare instead of LIKE: `_` in collection names is literal
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE left(fqid, char_length($1)) = $1 AND deleted = false",
            LEGACY_MODELS_TABLE
        );
        let row = sqlx::query(&sql)
            .bind(format!("{}/", collection.as_str()))
            .fetch_one(&mut *self.tx)
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn execute(&mut self, sql: &str) -> StoreResult<u64> {
        // a bare &str carries no arguments and goes through the simple query
        // protocol, which accepts several statements at once
        let result = sqlx::Executor::execute(&mut *self.tx, sql).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to commit transaction: {}", e)))?;
        debug!("Committed PostgreSQL transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to rollback transaction: {}", e)))?;
        debug!("Rolled back PostgreSQL transaction");
        Ok(())
    }
}
