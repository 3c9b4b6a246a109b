//! Stats Engine
//!
//! Counts, per collection still waiting for a migration, how many rows the
//! authoritative `<collection>_t` table holds and how many of them already
//! reached the shadow table.

use crate::catalog::Catalog;
use crate::error::MigrationResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_store::{
    current_index, Identifier, MigrationIndex, MigrationState, StoreError, StoreResult,
    StoreTransaction, VersionRow,
};
use tracing::debug;

/// Row counts of one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    pub count: u64,
    pub migrated: u64,
}

/// Output of the `stats` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStats {
    pub status: MigrationState,
    pub current_migration_index: MigrationIndex,
    pub target_migration_index: MigrationIndex,
    pub migratable_models: BTreeMap<String, ModelStats>,
}

/// Compute stats from the rows read in `tx`
///
/// `status` is the state reported to the caller; `states` holds the
/// per-index states of every catalog index.
pub async fn compute_stats(
    tx: &mut dyn StoreTransaction,
    catalog: &Catalog,
    rows: &[VersionRow],
    states: &BTreeMap<MigrationIndex, MigrationState>,
    status: MigrationState,
) -> MigrationResult<MigrationStats> {
    let current = current_index(rows, catalog.min_index());
    let initial = current == catalog.min_index();

    let mut unmigrated = BTreeMap::new();
    for index in catalog.indices().filter(|index| *index > current) {
        if matches!(
            states.get(&index),
            Some(MigrationState::MigrationRequired | MigrationState::MigrationRunning)
        ) {
            unmigrated.extend(catalog.replace_tables(index));
        }
    }

    let mut migratable_models = BTreeMap::new();
    for (collection, shadow) in unmigrated {
        let authoritative = collection.with_suffix("_t")?;
        let count = if initial {
            count_or_zero(tx, &authoritative).await?
        } else {
            tx.count_rows(&authoritative).await?
        };

        let migrated = if initial {
            match shadow.strip_suffix("_m") {
                Some(stem) => count_or_zero(tx, &stem.with_suffix("_t")?).await?,
                None => zero_if_missing(tx.count_legacy_models(&collection).await)?,
            }
        } else {
            tx.count_rows(&shadow).await?
        };

        debug!(collection = %collection, count, migrated, "Collected collection stats");
        if count > 0 {
            migratable_models.insert(collection.to_string(), ModelStats { count, migrated });
        }
    }

    Ok(MigrationStats {
        status,
        current_migration_index: current,
        target_migration_index: catalog.target_index(),
        migratable_models,
    })
}

async fn count_or_zero(tx: &mut dyn StoreTransaction, table: &Identifier) -> StoreResult<u64> {
    zero_if_missing(tx.count_rows(table).await)
}

fn zero_if_missing(result: StoreResult<u64>) -> StoreResult<u64> {
    match result {
        Err(StoreError::MissingTable(_)) => Ok(0),
        other => other,
    }
}
