//! Migration unit contract

use crate::error::UnitResult;
use crate::progress::ProgressWriter;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use strata_store::{Identifier, MigrationIndex, MigrationState, StoreTransaction};

/// A phase of a migration unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Migrate,
    Finalize,
}

impl Phase {
    /// State a row must be in for this phase to run
    pub fn required_state(&self) -> MigrationState {
        match self {
            Phase::Migrate => MigrationState::MigrationRequired,
            Phase::Finalize => MigrationState::FinalizationRequired,
        }
    }

    /// State the row holds while the phase runs
    pub fn running_state(&self) -> MigrationState {
        match self {
            Phase::Migrate => MigrationState::MigrationRunning,
            Phase::Finalize => MigrationState::FinalizationRunning,
        }
    }

    /// State after a successful run
    pub fn completed_state(&self, has_finalize: bool) -> MigrationState {
        match self {
            Phase::Migrate if has_finalize => MigrationState::FinalizationRequired,
            _ => MigrationState::Finalized,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Migrate => write!(f, "migrate"),
            Phase::Finalize => write!(f, "finalize"),
        }
    }
}

/// An indivisible schema/data transformation
///
/// Bodies receive the transaction they must run in; they never commit it.
/// Anything written to `out` shows up in the command's progress output.
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    /// Migration index this unit brings the database to
    fn target_index(&self) -> MigrationIndex;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Whether the unit has a second (finalize) phase
    fn has_finalize(&self) -> bool {
        false
    }

    /// Collections this unit copies forward, mapped to their shadow tables
    fn replace_tables(&self) -> BTreeMap<Identifier, Identifier> {
        BTreeMap::new()
    }

    async fn migrate(&self, tx: &mut dyn StoreTransaction, out: &ProgressWriter) -> UnitResult<()>;

    async fn finalize(&self, _tx: &mut dyn StoreTransaction, _out: &ProgressWriter) -> UnitResult<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("target_index", &self.target_index())
            .field("name", &self.name())
            .field("has_finalize", &self.has_finalize())
            .finish()
    }
}
