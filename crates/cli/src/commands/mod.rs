pub mod migrate;
pub mod new;
pub mod serve;

use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{AppConfig, ConfigSource};
use strata_http::{init_logging, LoggingConfig};
use strata_migrate::{Catalog, MigrationError, Orchestrator, OrchestratorConfig};
use strata_store::{connect_postgres, PoolConfig};

/// Install the process-wide tracing subscriber
pub fn init_cli_logging(config: &AppConfig) -> anyhow::Result<()> {
    init_logging(LoggingConfig::from_app_config(config))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Record where each configuration value came from
pub fn log_config_sources(sources: &HashMap<String, ConfigSource>) {
    let mut fields: Vec<_> = sources.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    for (field, source) in fields {
        tracing::debug!(field = %field, source = %source, "Configuration value");
    }
}

/// What `bootstrap` does with the bookkeeping table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Leave the table untouched; enough for `stats` and `progress`
    ReadOnly,
    /// Create the table and the rows for pending catalog entries
    Initialize,
}

/// Connect and load the catalog, initializing the bookkeeping table when
/// `startup` asks for it
pub async fn bootstrap(config: &AppConfig, startup: Startup) -> anyhow::Result<Arc<Orchestrator>> {
    let url = config.require_database_url()?;
    let pool = PoolConfig::default()
        .with_max_connections(config.database_max_connections)
        .with_acquire_timeout(config.database_acquire_timeout);
    let db = connect_postgres(url, &pool)
        .await
        .context("Failed to connect to the database")?;

    let catalog = Catalog::load(&config.migrations_dir, config.min_migration_index)
        .with_context(|| {
            format!(
                "Failed to load migrations from {}",
                config.migrations_dir.display()
            )
        })?;
    tracing::info!(
        units = catalog.len(),
        target_index = catalog.target_index(),
        "Loaded migration catalog"
    );

    let orchestrator = Orchestrator::new(Arc::new(db), catalog, OrchestratorConfig::from(config));
    if startup == Startup::Initialize {
        initialize(&orchestrator).await?;
    }
    Ok(Arc::new(orchestrator))
}

/// Initialize the bookkeeping table
///
/// A database ahead of the catalog is logged and tolerated: `stats` and
/// `progress` keep working and every mutating command is rejected with the
/// same mismatch until the catalog catches up.
pub async fn initialize(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    match orchestrator.initialize().await {
        Ok(()) => Ok(()),
        Err(err @ MigrationError::MismatchingIndices { .. }) => {
            tracing::warn!(error = %err, "Continuing without initializing the bookkeeping table");
            Ok(())
        }
        Err(err) => Err(err).context("Failed to initialize the bookkeeping table"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_migrate::{CommandRequest, OrchestratorConfigBuilder, SqlMigration};
    use strata_store::{MemoryDatabase, MigrationState};

    fn orchestrator(db: &MemoryDatabase) -> Orchestrator {
        let catalog = Catalog::builder()
            .register(Arc::new(
                SqlMigration::parse(101, "noop", "-- migrate\nSELECT 1;\n").unwrap(),
            ))
            .build(100)
            .unwrap();
        let config = OrchestratorConfigBuilder::testing()
            .build()
            .expect("Failed to build config");
        Orchestrator::new(Arc::new(db.clone()), catalog, config)
    }

    #[tokio::test]
    async fn test_initialize_tolerates_database_ahead_of_catalog() {
        let db = MemoryDatabase::new()
            .with_version(101, MigrationState::Finalized)
            .with_version(102, MigrationState::Finalized);
        let orchestrator = orchestrator(&db);

        initialize(&orchestrator).await.unwrap();

        let stats = orchestrator
            .handle_command(&CommandRequest::new("stats"))
            .await
            .unwrap();
        assert!(stats.success);

        let migrate = orchestrator
            .handle_command(&CommandRequest::new("migrate"))
            .await
            .unwrap();
        assert!(!migrate.success);
        assert!(migrate
            .message
            .as_deref()
            .unwrap_or_default()
            .contains("higher migration index"));
        assert_eq!(db.state_of(102), Some(MigrationState::Finalized));
    }

    #[tokio::test]
    async fn test_initialize_creates_pending_rows() {
        let db = MemoryDatabase::new();
        let orchestrator = orchestrator(&db);

        initialize(&orchestrator).await.unwrap();
        assert_eq!(db.state_of(101), Some(MigrationState::MigrationRequired));
    }
}
