//! Command Orchestrator
//!
//! Validates each command against the aggregate state, starts at most one
//! worker per process and answers with either a running snapshot or the
//! terminal result. Mutating commands serialize on a process-wide mutex that
//! is held only for the precondition check, the spawn and the bounded wait.

use crate::catalog::Catalog;
use crate::command::{Command, CommandRequest, CommandResponse};
use crate::config::OrchestratorConfig;
use crate::error::{MigrationError, MigrationResult};
use crate::executor::{Executor, RunMode};
use crate::progress::ProgressBuffer;
use crate::state::{aggregate_state, check_transition, index_states, pending_indices};
use crate::stats::compute_stats;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_store::{
    current_index, ensure_rows_for_catalog, read_rows, set_state, MigrationDatabase,
    MigrationIndex, MigrationState, VersionRow,
};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Top-level command dispatcher
pub struct Orchestrator {
    db: Arc<dyn MigrationDatabase>,
    catalog: Arc<Catalog>,
    config: OrchestratorConfig,
    progress: ProgressBuffer,
    dispatch: Mutex<()>,
}

impl Orchestrator {
    pub fn new(db: Arc<dyn MigrationDatabase>, catalog: Catalog, config: OrchestratorConfig) -> Self {
        Self {
            db,
            catalog: Arc::new(catalog),
            config,
            progress: ProgressBuffer::new(),
            dispatch: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<dyn MigrationDatabase> {
        &self.db
    }

    pub fn progress(&self) -> &ProgressBuffer {
        &self.progress
    }

    /// Startup check: validate indices and insert missing `version` rows
    pub async fn initialize(&self) -> MigrationResult<()> {
        let _dispatch = self.dispatch.lock().await;

        let mut tx = self.db.begin().await?;
        tx.lock_migrations().await?;
        let rows = read_rows(tx.as_mut()).await?;
        if let Err(err) = self.assert_valid_migration_index(&rows) {
            error!(error = %err, "Bookkeeping is ahead of the migration catalog");
            tx.rollback().await?;
            return Err(err);
        }

        let inserted = ensure_rows_for_catalog(
            tx.as_mut(),
            self.catalog.min_index(),
            self.catalog.target_index(),
        )
        .await?;
        tx.commit().await?;

        info!(
            backend = %self.db.backend_type(),
            target = self.catalog.target_index(),
            inserted,
            "Migration orchestrator initialized"
        );
        Ok(())
    }

    /// Dispatch one command
    ///
    /// Rejections become `success: false` responses; only store and
    /// internal failures are returned as errors.
    pub async fn handle_command(&self, request: &CommandRequest) -> MigrationResult<CommandResponse> {
        let command = match request.command() {
            Ok(command) => command,
            Err(err) => {
                warn!(cmd = ?request.cmd, "Invalid migration command");
                return Ok(CommandResponse::failure(err.to_string()));
            }
        };
        info!(command = %command, verbose = request.verbose, "Handling migration command");

        let result = match command {
            Command::Stats => self.stats().await,
            Command::Progress => self.progress_report().await,
            Command::Migrate => self.migrate(request.verbose).await,
            Command::Finalize => self.finalize(request.verbose).await,
            Command::Reset => self.reset().await,
        };

        match result {
            Ok(response) => Ok(response),
            Err(err) if err.is_rejection() => {
                info!(command = %command, reason = %err, "Migration command rejected");
                Ok(CommandResponse::failure(err.to_string()))
            }
            Err(err) => {
                error!(command = %command, error = %err, "Migration command failed");
                Err(err)
            }
        }
    }

    pub async fn stats(&self) -> MigrationResult<CommandResponse> {
        let mut tx = self.db.begin().await?;
        let rows = read_rows(tx.as_mut()).await?;
        let states = index_states(&rows, &self.catalog);
        let status = self.effective_state(&states);

        let stats = compute_stats(tx.as_mut(), &self.catalog, &rows, &states, status).await;
        tx.rollback().await?;

        Ok(CommandResponse::with_stats(stats?).exception(self.exception_message()))
    }

    /// Snapshot while a worker runs, otherwise the drained final output
    pub async fn progress_report(&self) -> MigrationResult<CommandResponse> {
        if let Some(status) = self.progress.running_state() {
            return Ok(CommandResponse::with_status(status)
                .output(self.progress.snapshot())
                .exception(self.exception_message()));
        }

        let status = self.read_aggregate().await?;
        let output = match self.progress.drain() {
            Ok(output) => output,
            // a worker started between the liveness check and the drain
            Err(MigrationError::WorkerActive) => self.progress.snapshot(),
            Err(err) => return Err(err),
        };
        Ok(CommandResponse::with_status(status)
            .output(output)
            .exception(self.exception_message()))
    }

    pub async fn migrate(&self, verbose: bool) -> MigrationResult<CommandResponse> {
        let _dispatch = self.dispatch.lock().await;
        let states = self.prepare().await?;

        if pending_indices(&states, &self.catalog, MigrationState::MigrationRequired).is_empty() {
            debug!("Nothing to migrate");
            return Ok(CommandResponse::with_status(aggregate_state(
                states.values().copied(),
            )));
        }
        self.start_worker(RunMode::Migrate, MigrationState::MigrationRunning, verbose)
            .await
    }

    pub async fn finalize(&self, verbose: bool) -> MigrationResult<CommandResponse> {
        let _dispatch = self.dispatch.lock().await;
        let states = self.prepare().await?;

        let migrate_first =
            !pending_indices(&states, &self.catalog, MigrationState::MigrationRequired).is_empty();
        let finalize_pending =
            !pending_indices(&states, &self.catalog, MigrationState::FinalizationRequired)
                .is_empty();

        if !migrate_first && !finalize_pending {
            debug!("Nothing to finalize");
            return Ok(CommandResponse::with_status(aggregate_state(
                states.values().copied(),
            )));
        }

        let phase = if migrate_first {
            MigrationState::MigrationRunning
        } else {
            MigrationState::FinalizationRunning
        };
        self.start_worker(RunMode::Finalize, phase, verbose).await
    }

    /// Revert every running row to its clean state and clear the exception
    pub async fn reset(&self) -> MigrationResult<CommandResponse> {
        let _dispatch = self.dispatch.lock().await;

        if self.progress.is_worker_alive() {
            return Err(MigrationError::precondition(
                "A migration worker is still active, wait for it to finish before resetting.",
            ));
        }

        let mut tx = self.db.begin().await?;
        tx.lock_migrations().await?;
        let rows = read_rows(tx.as_mut()).await?;
        self.assert_valid_migration_index(&rows)?;

        let running: Vec<VersionRow> = rows
            .iter()
            .filter(|row| row.migration_state.is_running())
            .copied()
            .collect();
        if running.is_empty() {
            return Err(MigrationError::precondition(
                "No migration is running, nothing to reset.",
            ));
        }

        for row in running {
            let clean = row.migration_state.before_running().ok_or_else(|| {
                MigrationError::Internal(format!(
                    "Migration {} is {} and cannot be reset",
                    row.migration_index, row.migration_state
                ))
            })?;
            let has_finalize = self
                .catalog
                .unit(row.migration_index)
                .map_or(true, |unit| unit.has_finalize());
            check_transition(row.migration_index, row.migration_state, clean, has_finalize)?;
            set_state(tx.as_mut(), row.migration_index, clean).await?;
            warn!(
                migration_index = row.migration_index,
                from = %row.migration_state,
                to = %clean,
                "Reset running migration"
            );
        }

        let rows = read_rows(tx.as_mut()).await?;
        tx.commit().await?;

        self.progress.clear_exception();
        self.progress.discard();

        let status = aggregate_state(index_states(&rows, &self.catalog).into_values());
        Ok(CommandResponse::with_status(status))
    }

    /// Shared precondition check of `migrate` and `finalize`
    async fn prepare(&self) -> MigrationResult<BTreeMap<MigrationIndex, MigrationState>> {
        if let Some(state) = self.progress.running_state() {
            return Err(MigrationError::running(state));
        }

        let mut tx = self.db.begin().await?;
        tx.lock_migrations().await?;
        let rows = read_rows(tx.as_mut()).await?;
        self.assert_valid_migration_index(&rows)?;

        let states = index_states(&rows, &self.catalog);
        let aggregate = aggregate_state(states.values().copied());
        if aggregate.is_running() {
            return Err(MigrationError::running(aggregate));
        }

        ensure_rows_for_catalog(
            tx.as_mut(),
            self.catalog.min_index(),
            self.catalog.target_index(),
        )
        .await?;
        tx.commit().await?;
        Ok(states)
    }

    async fn start_worker(
        &self,
        mode: RunMode,
        phase: MigrationState,
        verbose: bool,
    ) -> MigrationResult<CommandResponse> {
        let writer = self.progress.start_new(phase, verbose)?;
        let executor = Executor::new(self.db.clone(), self.catalog.clone());
        let mut handle = tokio::spawn(executor.run(mode, writer));

        match timeout(*self.config.get_wait_timeout(), &mut handle).await {
            Ok(joined) => {
                if let Err(err) = joined {
                    error!(error = %err, "Migration worker terminated abnormally");
                }
                let status = self.read_aggregate().await?;
                Ok(CommandResponse::with_status(status)
                    .output(self.progress.drain()?)
                    .exception(self.exception_message()))
            }
            Err(_) => {
                debug!("Migration worker still running after the wait timeout");
                let status = self.progress.running_state().unwrap_or(phase);
                Ok(CommandResponse::with_status(status).output(self.progress.snapshot()))
            }
        }
    }

    fn assert_valid_migration_index(&self, rows: &[VersionRow]) -> MigrationResult<()> {
        let database = current_index(rows, self.catalog.min_index());
        let target = self.catalog.target_index();
        if database > target {
            return Err(MigrationError::MismatchingIndices { database, target });
        }
        Ok(())
    }

    async fn read_aggregate(&self) -> MigrationResult<MigrationState> {
        let mut tx = self.db.begin().await?;
        let rows = read_rows(tx.as_mut()).await?;
        tx.rollback().await?;
        Ok(aggregate_state(
            index_states(&rows, &self.catalog).into_values(),
        ))
    }

    /// Running state of the live worker, else the aggregate of `states`
    fn effective_state(&self, states: &BTreeMap<MigrationIndex, MigrationState>) -> MigrationState {
        self.progress
            .running_state()
            .unwrap_or_else(|| aggregate_state(states.values().copied()))
    }

    fn exception_message(&self) -> Option<String> {
        self.progress.exception().map(|err| err.message)
    }
}
