//! Migration Executor
//!
//! Runs pending units in ascending index order on behalf of a worker. Each
//! unit goes through two transactions: the first commits the running state
//! on its own so observers can see it, the second carries the unit body
//! together with the completing transition.

use crate::catalog::Catalog;
use crate::error::{MigrationError, MigrationResult};
use crate::progress::{ProgressWriter, TerminalError};
use crate::state::{check_transition, index_states, pending_indices};
use crate::unit::Phase;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_store::{
    read_rows, read_state, set_state, MigrationDatabase, MigrationIndex, MigrationState,
};
use tracing::{error, info, warn};
use uuid::Uuid;

/// What a worker is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Advance every `MIGRATION_REQUIRED` unit
    Migrate,
    /// Migrate first, then advance every `FINALIZATION_REQUIRED` unit
    Finalize,
}

#[derive(Clone)]
pub struct Executor {
    db: Arc<dyn MigrationDatabase>,
    catalog: Arc<Catalog>,
}

impl Executor {
    pub fn new(db: Arc<dyn MigrationDatabase>, catalog: Arc<Catalog>) -> Self {
        Self { db, catalog }
    }

    /// Worker entry point
    ///
    /// Owns the writer for the whole run; a failure is stored as the
    /// terminal exception before the writer is released.
    pub async fn run(self, mode: RunMode, out: ProgressWriter) {
        let run_id = Uuid::new_v4();
        info!(%run_id, ?mode, "Migration worker started");

        match self.execute(mode, &out).await {
            Ok(()) => info!(%run_id, "Migration worker finished"),
            Err(err) => {
                error!(%run_id, error = %err, "Migration worker failed");
                out.fail(TerminalError::from(err));
            }
        }
    }

    /// Apply every pending unit for `mode`
    pub async fn execute(&self, mode: RunMode, out: &ProgressWriter) -> MigrationResult<()> {
        let states = self.read_states().await?;
        if let Some(running) = states.values().find(|state| state.is_running()) {
            return Err(MigrationError::running(*running));
        }

        let pending = pending_indices(&states, &self.catalog, Phase::Migrate.required_state());
        if !pending.is_empty() {
            out.enter_phase(Phase::Migrate.running_state());
            out.write_line("started");
            for index in pending {
                self.run_unit(index, Phase::Migrate, out).await?;
            }
            out.write_line("finished");
        }

        if mode == RunMode::Finalize {
            let states = self.read_states().await?;
            let pending =
                pending_indices(&states, &self.catalog, Phase::Finalize.required_state());
            if !pending.is_empty() {
                out.enter_phase(Phase::Finalize.running_state());
                out.write_line("started finalization");
                for index in pending {
                    self.run_unit(index, Phase::Finalize, out).await?;
                }
                out.write_line("finished finalization");
            }
        }

        Ok(())
    }

    async fn read_states(&self) -> MigrationResult<BTreeMap<MigrationIndex, MigrationState>> {
        let mut tx = self.db.begin().await?;
        let rows = read_rows(tx.as_mut()).await?;
        tx.rollback().await?;
        Ok(index_states(&rows, &self.catalog))
    }

    async fn run_unit(
        &self,
        index: MigrationIndex,
        phase: Phase,
        out: &ProgressWriter,
    ) -> MigrationResult<()> {
        let unit = self
            .catalog
            .unit(index)
            .ok_or_else(|| MigrationError::Internal(format!("No migration unit for index {}", index)))?;

        match phase {
            Phase::Migrate => {
                out.write_verbose(format!("migrating to index {} ({})", index, unit.name()))
            }
            Phase::Finalize => {
                out.write_verbose(format!("finalizing index {} ({})", index, unit.name()))
            }
        }

        let mut tx = self.db.begin().await?;
        tx.lock_migrations().await?;
        let current = read_state(tx.as_mut(), index).await?;
        let running = phase.running_state();
        if let Err(err) = check_transition(index, current, running, unit.has_finalize()) {
            tx.rollback().await?;
            return Err(err);
        }
        set_state(tx.as_mut(), index, running).await?;
        tx.commit().await?;

        let mut tx = self.db.begin().await?;
        let result = match phase {
            Phase::Migrate => unit.migrate(tx.as_mut(), out).await,
            Phase::Finalize => unit.finalize(tx.as_mut(), out).await,
        };

        if let Err(err) = result {
            error!(
                migration_index = index,
                phase = %phase,
                error = %err,
                "Migration unit failed, leaving it running"
            );
            if let Err(rollback_err) = tx.rollback().await {
                warn!(migration_index = index, error = %rollback_err, "Rollback failed");
            }
            return Err(MigrationError::Unit {
                index,
                message: err.to_string(),
            });
        }

        // the row may have been moved while the body ran
        let completed = phase.completed_state(unit.has_finalize());
        let current = read_state(tx.as_mut(), index).await?;
        if let Err(err) = check_transition(index, current, completed, unit.has_finalize()) {
            tx.rollback().await?;
            return Err(err);
        }
        set_state(tx.as_mut(), index, completed).await?;
        tx.commit().await?;

        info!(migration_index = index, phase = %phase, state = %completed, "Migration unit completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnitResult;
    use crate::progress::ProgressBuffer;
    use crate::unit::MigrationUnit;
    use async_trait::async_trait;
    use strata_store::{MemoryDatabase, StoreTransaction};

    /// Moves its own row back to `MIGRATION_REQUIRED` from inside the body
    struct RewindingUnit;

    #[async_trait]
    impl MigrationUnit for RewindingUnit {
        fn target_index(&self) -> MigrationIndex {
            101
        }

        fn name(&self) -> &str {
            "rewinding"
        }

        async fn migrate(&self, tx: &mut dyn StoreTransaction, _out: &ProgressWriter) -> UnitResult<()> {
            set_state(tx, 101, MigrationState::MigrationRequired).await?;
            Ok(())
        }
    }

    fn executor(db: &MemoryDatabase) -> Executor {
        let catalog = Catalog::builder()
            .register(Arc::new(RewindingUnit))
            .build(100)
            .unwrap();
        Executor::new(Arc::new(db.clone()), Arc::new(catalog))
    }

    #[tokio::test]
    async fn test_completion_rejects_moved_row() {
        let db = MemoryDatabase::new()
            .with_version(100, MigrationState::Finalized)
            .with_version(101, MigrationState::MigrationRequired);
        let buffer = ProgressBuffer::new();
        let out = buffer
            .start_new(MigrationState::MigrationRunning, false)
            .unwrap();

        let err = executor(&db)
            .execute(RunMode::Migrate, &out)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Internal error: Migration 101 cannot move from MIGRATION_REQUIRED to FINALIZED"
        );
        assert_eq!(db.state_of(101), Some(MigrationState::MigrationRunning));
    }

    #[tokio::test]
    async fn test_phase_requires_matching_state() {
        let db = MemoryDatabase::new()
            .with_version(100, MigrationState::Finalized)
            .with_version(101, MigrationState::FinalizationRequired);
        let buffer = ProgressBuffer::new();
        let out = buffer
            .start_new(MigrationState::MigrationRunning, false)
            .unwrap();

        let err = executor(&db)
            .run_unit(101, Phase::Migrate, &out)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Internal(_)));
        assert_eq!(db.state_of(101), Some(MigrationState::FinalizationRequired));
        assert_eq!(db.write_commits(), 0);
    }
}
