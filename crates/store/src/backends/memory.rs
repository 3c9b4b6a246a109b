//! In-memory database backend for development and testing
//!
//! Transactions read a snapshot taken at `begin` plus their own writes, and
//! replay their write log onto the shared state on commit. Raw SQL is not
//! interpreted; executed statements are recorded so tests can inspect them.

use super::core::*;
use crate::error::{StoreError, StoreResult};
use crate::security::Identifier;
use crate::version::{MigrationIndex, MigrationState, VersionRow};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct LegacyModel {
    fqid: String,
    deleted: bool,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    version_table: bool,
    versions: BTreeMap<MigrationIndex, MigrationState>,
    tables: BTreeMap<String, u64>,
    legacy_models: Option<Vec<LegacyModel>>,
    statements: Vec<String>,
    failing_patterns: Vec<String>,
    commits: u64,
}

#[derive(Debug, Clone)]
enum MemoryOp {
    CreateVersionTable,
    InsertVersion(MigrationIndex, MigrationState),
    UpdateVersion(MigrationIndex, MigrationState),
    Execute(String),
}

impl MemoryState {
    fn apply(&mut self, op: &MemoryOp) {
        match op {
            MemoryOp::CreateVersionTable => self.version_table = true,
            MemoryOp::InsertVersion(index, state) => {
                self.version_table = true;
                self.versions.entry(*index).or_insert(*state);
            }
            MemoryOp::UpdateVersion(index, state) => {
                if let Some(current) = self.versions.get_mut(index) {
                    *current = *state;
                }
            }
            MemoryOp::Execute(sql) => self.statements.push(sql.clone()),
        }
    }
}

/// In-process database implementing the backend seam
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    /// Create an empty database without a `version` table
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a `version` row, creating the table if needed
    pub fn with_version(self, index: MigrationIndex, state: MigrationState) -> Self {
        {
            let mut shared = self.state.lock();
            shared.version_table = true;
            shared.versions.insert(index, state);
        }
        self
    }

    /// Create (or overwrite) a table holding `rows` rows
    pub fn set_table_rows(&self, table: &str, rows: u64) {
        self.state.lock().tables.insert(table.to_string(), rows);
    }

    /// Add a row to the legacy `models` table, creating it if needed
    pub fn add_legacy_model(&self, fqid: &str, deleted: bool) {
        self.state
            .lock()
            .legacy_models
            .get_or_insert_with(Vec::new)
            .push(LegacyModel {
                fqid: fqid.to_string(),
                deleted,
            });
    }

    /// Make every statement containing `pattern` fail
    pub fn fail_statements_containing(&self, pattern: &str) {
        self.state.lock().failing_patterns.push(pattern.to_string());
    }

    /// Remove all failure patterns
    pub fn clear_failures(&self) {
        self.state.lock().failing_patterns.clear();
    }

    /// Committed `version` rows, ascending
    pub fn versions(&self) -> Vec<VersionRow> {
        self.state
            .lock()
            .versions
            .iter()
            .map(|(index, state)| VersionRow::new(*index, *state))
            .collect()
    }

    /// Committed state of one index
    pub fn state_of(&self, index: MigrationIndex) -> Option<MigrationState> {
        self.state.lock().versions.get(&index).copied()
    }

    /// Statements executed by committed transactions, in commit order
    pub fn executed_statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    /// Number of committed transactions that carried writes
    pub fn write_commits(&self) -> u64 {
        self.state.lock().commits
    }
}

#[async_trait]
impl MigrationDatabase for MemoryDatabase {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let view = self.state.lock().clone();
        Ok(Box::new(MemoryTransaction {
            shared: self.state.clone(),
            view,
            ops: Vec::new(),
        }))
    }

    async fn health_check(&self) -> StoreResult<Duration> {
        let start = Instant::now();
        let _guard = self.state.lock();
        Ok(start.elapsed())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }
}

/// An open in-memory transaction
pub struct MemoryTransaction {
    shared: Arc<Mutex<MemoryState>>,
    view: MemoryState,
    ops: Vec<MemoryOp>,
}

impl MemoryTransaction {
    fn record(&mut self, op: MemoryOp) {
        self.view.apply(&op);
        self.ops.push(op);
    }

    fn require_version_table(&self) -> StoreResult<()> {
        if self.view.version_table {
            Ok(())
        } else {
            Err(StoreError::MissingTable(crate::version::VERSION_TABLE.to_string()))
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn ensure_version_table(&mut self) -> StoreResult<()> {
        if !self.view.version_table {
            self.record(MemoryOp::CreateVersionTable);
        }
        Ok(())
    }

    async fn version_table_exists(&mut self) -> StoreResult<bool> {
        Ok(self.view.version_table)
    }

    async fn read_versions(&mut self) -> StoreResult<Vec<VersionRow>> {
        self.require_version_table()?;
        Ok(self
            .view
            .versions
            .iter()
            .map(|(index, state)| VersionRow::new(*index, *state))
            .collect())
    }

    async fn insert_version_if_absent(
        &mut self,
        index: MigrationIndex,
        state: MigrationState,
    ) -> StoreResult<bool> {
        self.require_version_table()?;
        if self.view.versions.contains_key(&index) {
            return Ok(false);
        }
        self.record(MemoryOp::InsertVersion(index, state));
        Ok(true)
    }

    async fn update_version(
        &mut self,
        index: MigrationIndex,
        state: MigrationState,
    ) -> StoreResult<()> {
        self.require_version_table()?;
        if !self.view.versions.contains_key(&index) {
            return Err(StoreError::MissingVersion(index));
        }
        self.record(MemoryOp::UpdateVersion(index, state));
        Ok(())
    }

    async fn lock_migrations(&mut self) -> StoreResult<()> {
        // command dispatch is already serialized in-process
        Ok(())
    }

    async fn table_exists(&mut self, table: &Identifier) -> StoreResult<bool> {
        Ok(self.view.tables.contains_key(table.as_str())
            || (table.as_str() == LEGACY_MODELS_TABLE && self.view.legacy_models.is_some()))
    }

    async fn count_rows(&mut self, table: &Identifier) -> StoreResult<u64> {
        if table.as_str() == LEGACY_MODELS_TABLE {
            if let Some(models) = &self.view.legacy_models {
                return Ok(models.len() as u64);
            }
        }
        self.view
            .tables
            .get(table.as_str())
            .copied()
            .ok_or_else(|| StoreError::MissingTable(table.to_string()))
    }

    async fn count_legacy_models(&mut self, collection: &Identifier) -> StoreResult<u64> {
        let models = self
            .view
            .legacy_models
            .as_ref()
            .ok_or_else(|| StoreError::MissingTable(LEGACY_MODELS_TABLE.to_string()))?;
        let prefix = format!("{}/", collection.as_str());
        Ok(models
            .iter()
            .filter(|model| !model.deleted && model.fqid.starts_with(&prefix))
            .count() as u64)
    }

    async fn execute(&mut self, sql: &str) -> StoreResult<u64> {
        if let Some(pattern) = self
            .view
            .failing_patterns
            .iter()
            .find(|pattern| sql.contains(pattern.as_str()))
        {
            return Err(StoreError::Database(format!(
                "statement rejected (matches '{}')",
                pattern
            )));
        }
        self.record(MemoryOp::Execute(sql.to_string()));
        Ok(0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.ops.is_empty() {
            return Ok(());
        }
        let mut shared = self.shared.lock();
        for op in &self.ops {
            shared.apply(op);
        }
        shared.commits += 1;
        debug!(ops = self.ops.len(), "Committed in-memory transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        debug!(ops = self.ops.len(), "Rolled back in-memory transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_applies_writes() {
        let db = MemoryDatabase::new();

        let mut tx = db.begin().await.unwrap();
        tx.ensure_version_table().await.unwrap();
        assert!(tx
            .insert_version_if_absent(100, MigrationState::Finalized)
            .await
            .unwrap());
        assert!(!tx
            .insert_version_if_absent(100, MigrationState::MigrationRequired)
            .await
            .unwrap());
        assert!(db.versions().is_empty());

        tx.commit().await.unwrap();
        assert_eq!(db.state_of(100), Some(MigrationState::Finalized));
        assert_eq!(db.write_commits(), 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let db = MemoryDatabase::new().with_version(100, MigrationState::MigrationRequired);

        let mut tx = db.begin().await.unwrap();
        tx.update_version(100, MigrationState::MigrationRunning)
            .await
            .unwrap();
        tx.execute("CREATE TABLE a_t (id int)").await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut dropped = db.begin().await.unwrap();
            dropped
                .update_version(100, MigrationState::MigrationRunning)
                .await
                .unwrap();
        }

        assert_eq!(db.state_of(100), Some(MigrationState::MigrationRequired));
        assert!(db.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_commit_replays_onto_latest_state() {
        let db = MemoryDatabase::new()
            .with_version(100, MigrationState::Finalized)
            .with_version(101, MigrationState::MigrationRequired);

        // a reader that began earlier must not clobber a later writer
        let reader = db.begin().await.unwrap();

        let mut writer = db.begin().await.unwrap();
        writer
            .update_version(101, MigrationState::MigrationRunning)
            .await
            .unwrap();
        writer.commit().await.unwrap();

        reader.commit().await.unwrap();
        assert_eq!(db.state_of(101), Some(MigrationState::MigrationRunning));
    }

    #[tokio::test]
    async fn test_missing_version_and_tables() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();

        assert!(!tx.version_table_exists().await.unwrap());
        assert!(matches!(
            tx.read_versions().await,
            Err(StoreError::MissingTable(_))
        ));

        tx.ensure_version_table().await.unwrap();
        assert!(matches!(
            tx.update_version(5, MigrationState::Finalized).await,
            Err(StoreError::MissingVersion(5))
        ));

        let user_t = Identifier::new("user_t").unwrap();
        assert!(!tx.table_exists(&user_t).await.unwrap());
        assert!(tx.count_rows(&user_t).await.unwrap_err().is_missing_table());
    }

    #[tokio::test]
    async fn test_counts() {
        let db = MemoryDatabase::new();
        db.set_table_rows("user_t", 3);
        db.add_legacy_model("user/1", false);
        db.add_legacy_model("user/2", true);
        db.add_legacy_model("user_group/1", false);
        db.add_legacy_model("meeting/1", false);

        let mut tx = db.begin().await.unwrap();
        assert_eq!(tx.count_rows(&Identifier::new("user_t").unwrap()).await.unwrap(), 3);
        assert_eq!(
            tx.count_legacy_models(&Identifier::new("user").unwrap())
                .await
                .unwrap(),
            1
        );
        assert!(tx
            .table_exists(&Identifier::new(LEGACY_MODELS_TABLE).unwrap())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_failing_statements() {
        let db = MemoryDatabase::new();
        db.fail_statements_containing("broken_t");

        let mut tx = db.begin().await.unwrap();
        assert!(tx.execute("UPDATE broken_t SET x = 1").await.is_err());
        assert!(tx.execute("UPDATE fine_t SET x = 1").await.is_ok());
        tx.commit().await.unwrap();

        assert_eq!(db.executed_statements(), vec!["UPDATE fine_t SET x = 1".to_string()]);
    }
}
