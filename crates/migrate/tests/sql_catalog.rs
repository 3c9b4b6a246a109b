//! SQL file catalogs driven through the orchestrator

mod common;

use common::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use strata_migrate::{Catalog, MigrationError, Orchestrator, OrchestratorConfigBuilder};
use strata_store::{MemoryDatabase, MigrationState};

fn write_unit(dir: &Path, file: &str, content: &str) {
    fs::write(dir.join(file), content).unwrap();
}

fn sql_orchestrator(db: &MemoryDatabase, dir: &Path) -> Orchestrator {
    let catalog = Catalog::load(dir, MIN_INDEX).unwrap();
    let config = OrchestratorConfigBuilder::testing()
        .build()
        .expect("Failed to build config");
    Orchestrator::new(Arc::new(db.clone()), catalog, config)
}

#[tokio::test]
async fn test_sql_units_migrate_and_finalize() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(
        dir.path(),
        "0101_copy_users.sql",
        "-- replace: user => user_m\n\
         -- migrate\n\
         CREATE TABLE user_m (id INT);\n\
         INSERT INTO user_m SELECT id FROM user_t;\n\
         -- finalize\n\
         DROP TABLE user_t;\n",
    );
    write_unit(
        dir.path(),
        "0102_add_index.sql",
        "-- migrate\nCREATE INDEX motion_idx ON motion_t (id);\n",
    );
    write_unit(dir.path(), "README.md", "not a migration");

    let db = MemoryDatabase::new().with_version(MIN_INDEX, MigrationState::Finalized);
    db.set_table_rows("user_t", 2);
    let orchestrator = sql_orchestrator(&db, dir.path());
    assert_eq!(orchestrator.catalog().target_index(), 102);

    let stats = send(&orchestrator, "stats").await.stats.unwrap();
    assert_eq!(stats.migratable_models["user"].count, 2);

    let done = run_to_completion(&orchestrator, "finalize").await;
    assert_eq!(done.status, Some(MigrationState::Finalized));

    let statements = db.executed_statements();
    assert_eq!(statements.len(), 4);
    assert!(statements[0].contains("user_m"));
    assert!(statements[2].contains("motion_idx"));
    assert!(statements[3].starts_with("DROP TABLE"));
}

#[tokio::test]
async fn test_failing_sql_statement_surfaces_as_exception() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(
        dir.path(),
        "0101_update_broken.sql",
        "-- migrate\nUPDATE broken_t SET id = 1;\n",
    );

    let db = MemoryDatabase::new().with_version(MIN_INDEX, MigrationState::Finalized);
    db.fail_statements_containing("broken_t");
    let orchestrator = sql_orchestrator(&db, dir.path());

    send(&orchestrator, "migrate").await;
    wait_for_worker(&orchestrator).await;

    let progress = send(&orchestrator, "progress").await;
    assert_eq!(progress.status, Some(MigrationState::MigrationRunning));
    assert!(progress
        .exception
        .unwrap()
        .contains("statement rejected"));
}

#[test]
fn test_duplicate_sql_indices_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "0101_first.sql", "-- migrate\nSELECT 1;\n");
    write_unit(dir.path(), "101_second.sql", "-- migrate\nSELECT 2;\n");

    let err = Catalog::load(dir.path(), MIN_INDEX).unwrap_err();
    assert!(matches!(err, MigrationError::Catalog(_)));
    assert!(err.to_string().contains("Duplicate migration index 101"));
}

#[test]
fn test_malformed_file_name_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "copy_users.sql", "-- migrate\nSELECT 1;\n");

    assert!(Catalog::load(dir.path(), MIN_INDEX).is_err());
}
