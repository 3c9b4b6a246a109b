use std::path::PathBuf;
use strata_core::AppConfig;
use strata_migrate::create_migration_file;

/// Write a new migration template into the migrations directory
pub async fn create(config: &AppConfig, name: &str, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = dir.unwrap_or_else(|| config.migrations_dir.clone());
    let path = create_migration_file(&dir, name, config.min_migration_index)?;

    println!("Created migration: {}", path.display());
    Ok(())
}
