//! Shared fixtures for orchestrator integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_migrate::{
    Catalog, CommandRequest, CommandResponse, MigrationUnit, Orchestrator,
    OrchestratorConfigBuilder, ProgressWriter, UnitResult,
};
use strata_store::{Identifier, MemoryDatabase, MigrationIndex, StoreTransaction};
use tokio::sync::Notify;

pub const MIN_INDEX: MigrationIndex = 100;

/// Programmable migration unit
///
/// Each phase executes a marker statement (`MIGRATE <index>` or
/// `FINALIZE <index>`) so tests can see which bodies committed.
pub struct TestUnit {
    index: MigrationIndex,
    name: String,
    finalize: bool,
    tables: BTreeMap<Identifier, Identifier>,
    fail_migrate: Arc<AtomicBool>,
    migrate_gate: Option<Arc<Notify>>,
    finalize_gate: Option<Arc<Notify>>,
}

impl TestUnit {
    pub fn new(index: MigrationIndex) -> Self {
        Self {
            index,
            name: format!("unit {}", index),
            finalize: false,
            tables: BTreeMap::new(),
            fail_migrate: Arc::new(AtomicBool::new(false)),
            migrate_gate: None,
            finalize_gate: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_finalize(mut self) -> Self {
        self.finalize = true;
        self
    }

    pub fn replaces(mut self, collection: &str, shadow: &str) -> Self {
        self.tables.insert(
            Identifier::new(collection).unwrap(),
            Identifier::new(shadow).unwrap(),
        );
        self
    }

    /// Fail the migrate phase while the returned flag is set
    pub fn failing(mut self, flag: Arc<AtomicBool>) -> Self {
        self.fail_migrate = flag;
        self
    }

    /// Block the migrate phase until the gate is notified
    pub fn gated_migrate(mut self, gate: Arc<Notify>) -> Self {
        self.migrate_gate = Some(gate);
        self
    }

    /// Block the finalize phase until the gate is notified
    pub fn gated_finalize(mut self, gate: Arc<Notify>) -> Self {
        self.finalize_gate = Some(gate);
        self
    }

    pub fn into_unit(self) -> Arc<dyn MigrationUnit> {
        Arc::new(self)
    }
}

#[async_trait]
impl MigrationUnit for TestUnit {
    fn target_index(&self) -> MigrationIndex {
        self.index
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_finalize(&self) -> bool {
        self.finalize
    }

    fn replace_tables(&self) -> BTreeMap<Identifier, Identifier> {
        self.tables.clone()
    }

    async fn migrate(&self, tx: &mut dyn StoreTransaction, out: &ProgressWriter) -> UnitResult<()> {
        if let Some(gate) = &self.migrate_gate {
            gate.notified().await;
        }
        tx.execute(&format!("MIGRATE {}", self.index)).await?;
        if self.fail_migrate.load(Ordering::SeqCst) {
            return Err("simulated failure".into());
        }
        out.write_verbose(format!("copied rows for {}", self.name));
        Ok(())
    }

    async fn finalize(&self, tx: &mut dyn StoreTransaction, _out: &ProgressWriter) -> UnitResult<()> {
        if let Some(gate) = &self.finalize_gate {
            gate.notified().await;
        }
        tx.execute(&format!("FINALIZE {}", self.index)).await?;
        Ok(())
    }
}

pub fn catalog(units: Vec<Arc<dyn MigrationUnit>>) -> Catalog {
    units
        .into_iter()
        .fold(Catalog::builder(), |builder, unit| builder.register(unit))
        .build(MIN_INDEX)
        .expect("valid test catalog")
}

pub fn orchestrator(db: &MemoryDatabase, units: Vec<Arc<dyn MigrationUnit>>) -> Orchestrator {
    let config = OrchestratorConfigBuilder::testing()
        .build()
        .expect("Failed to build config");
    Orchestrator::new(Arc::new(db.clone()), catalog(units), config)
}

pub async fn send(orchestrator: &Orchestrator, cmd: &str) -> CommandResponse {
    orchestrator
        .handle_command(&CommandRequest::new(cmd))
        .await
        .expect("command should not fail internally")
}

pub async fn send_verbose(orchestrator: &Orchestrator, cmd: &str) -> CommandResponse {
    orchestrator
        .handle_command(&CommandRequest::new(cmd).verbose(true))
        .await
        .expect("command should not fail internally")
}

/// Wait for the worker to exit
pub async fn wait_for_worker(orchestrator: &Orchestrator) {
    for _ in 0..500 {
        if !orchestrator.progress().is_worker_alive() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("migration worker did not finish in time");
}

/// Dispatch `cmd` and return the terminal response, polling `progress`
/// when the worker outlives the wait timeout
pub async fn run_to_completion(orchestrator: &Orchestrator, cmd: &str) -> CommandResponse {
    let response = send(orchestrator, cmd).await;
    assert!(response.success, "{:?}", response);
    if !orchestrator.progress().is_worker_alive() && orchestrator.progress().snapshot().is_none() {
        return response;
    }
    wait_for_worker(orchestrator).await;
    send(orchestrator, "progress").await
}
