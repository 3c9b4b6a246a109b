//! Bookkeeping Store
//!
//! The `version` table holds one row per known migration index together
//! with its migration state. Every operation runs inside the caller's
//! transaction and never commits on its own.

use crate::backends::StoreTransaction;
use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Monotonically increasing identifier of a migration unit
pub type MigrationIndex = i32;

/// Name of the bookkeeping table
pub const VERSION_TABLE: &str = "version";

/// Per-index migration state, persisted as its upper-case name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    /// Not yet applied
    MigrationRequired,
    /// First phase in progress
    MigrationRunning,
    /// First phase complete, finalize phase pending
    FinalizationRequired,
    /// Finalize phase in progress
    FinalizationRunning,
    /// Fully applied
    #[serde(alias = "NO_MIGRATION_REQUIRED")]
    Finalized,
}

impl MigrationState {
    pub const ALL: [MigrationState; 5] = [
        MigrationState::MigrationRequired,
        MigrationState::MigrationRunning,
        MigrationState::FinalizationRequired,
        MigrationState::FinalizationRunning,
        MigrationState::Finalized,
    ];

    /// The persisted string value
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::MigrationRequired => "MIGRATION_REQUIRED",
            MigrationState::MigrationRunning => "MIGRATION_RUNNING",
            MigrationState::FinalizationRequired => "FINALIZATION_REQUIRED",
            MigrationState::FinalizationRunning => "FINALIZATION_RUNNING",
            MigrationState::Finalized => "FINALIZED",
        }
    }

    /// Whether a phase is currently being applied
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            MigrationState::MigrationRunning | MigrationState::FinalizationRunning
        )
    }

    /// The clean state a running row reverts to on reset
    pub fn before_running(&self) -> Option<MigrationState> {
        match self {
            MigrationState::MigrationRunning => Some(MigrationState::MigrationRequired),
            MigrationState::FinalizationRunning => Some(MigrationState::FinalizationRequired),
            _ => None,
        }
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: MigrationState, has_finalize: bool) -> bool {
        use MigrationState::*;
        match (self, next) {
            (MigrationRequired, MigrationRunning) => true,
            (MigrationRunning, FinalizationRequired) => has_finalize,
            (MigrationRunning, Finalized) => !has_finalize,
            (FinalizationRequired, FinalizationRunning) => true,
            (FinalizationRunning, Finalized) => true,
            // reset
            (MigrationRunning, MigrationRequired) => true,
            (FinalizationRunning, FinalizationRequired) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MIGRATION_REQUIRED" => Ok(MigrationState::MigrationRequired),
            "MIGRATION_RUNNING" => Ok(MigrationState::MigrationRunning),
            "FINALIZATION_REQUIRED" => Ok(MigrationState::FinalizationRequired),
            "FINALIZATION_RUNNING" => Ok(MigrationState::FinalizationRunning),
            "FINALIZED" | "NO_MIGRATION_REQUIRED" => Ok(MigrationState::Finalized),
            _ => Err(StoreError::InvalidState(s.to_string())),
        }
    }
}

/// One row of the `version` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRow {
    pub migration_index: MigrationIndex,
    pub migration_state: MigrationState,
}

impl VersionRow {
    pub fn new(migration_index: MigrationIndex, migration_state: MigrationState) -> Self {
        Self {
            migration_index,
            migration_state,
        }
    }
}

/// Read every row, ordered by index. A missing table reads as empty.
pub async fn read_rows(tx: &mut dyn StoreTransaction) -> StoreResult<Vec<VersionRow>> {
    if !tx.version_table_exists().await? {
        return Ok(Vec::new());
    }
    let mut rows = tx.read_versions().await?;
    rows.sort_by_key(|row| row.migration_index);
    Ok(rows)
}

/// Every index present in `version`, ascending
pub async fn read_all_indices(tx: &mut dyn StoreTransaction) -> StoreResult<Vec<MigrationIndex>> {
    Ok(read_rows(tx)
        .await?
        .into_iter()
        .map(|row| row.migration_index)
        .collect())
}

/// State of a single index
pub async fn read_state(
    tx: &mut dyn StoreTransaction,
    index: MigrationIndex,
) -> StoreResult<MigrationState> {
    read_rows(tx)
        .await?
        .into_iter()
        .find(|row| row.migration_index == index)
        .map(|row| row.migration_state)
        .ok_or(StoreError::MissingVersion(index))
}

/// Largest index whose row is `FINALIZED`, or `min_index - 1` if none is
pub async fn read_current_index(
    tx: &mut dyn StoreTransaction,
    min_index: MigrationIndex,
) -> StoreResult<MigrationIndex> {
    Ok(current_index(&read_rows(tx).await?, min_index))
}

/// [`read_current_index`] over rows already in hand
pub fn current_index(rows: &[VersionRow], min_index: MigrationIndex) -> MigrationIndex {
    rows.iter()
        .filter(|row| row.migration_state == MigrationState::Finalized)
        .map(|row| row.migration_index)
        .max()
        .unwrap_or(min_index - 1)
}

/// Update the state of an existing row
pub async fn set_state(
    tx: &mut dyn StoreTransaction,
    index: MigrationIndex,
    state: MigrationState,
) -> StoreResult<()> {
    debug!(migration_index = index, state = %state, "Setting migration state");
    tx.update_version(index, state).await
}

/// Insert a `MIGRATION_REQUIRED` row for every index in `(min_index, target]`
/// that has none yet. Existing rows are never touched.
///
/// Creates the table when missing; a completely empty table first receives
/// the baseline row `(min_index, FINALIZED)`. Returns the number of rows
/// inserted.
pub async fn ensure_rows_for_catalog(
    tx: &mut dyn StoreTransaction,
    min_index: MigrationIndex,
    target: MigrationIndex,
) -> StoreResult<usize> {
    tx.ensure_version_table().await?;

    let existing = tx.read_versions().await?;
    let mut inserted = 0;

    if existing.is_empty()
        && tx
            .insert_version_if_absent(min_index, MigrationState::Finalized)
            .await?
    {
        inserted += 1;
    }

    for index in (min_index + 1)..=target {
        if existing.iter().any(|row| row.migration_index == index) {
            continue;
        }
        if tx
            .insert_version_if_absent(index, MigrationState::MigrationRequired)
            .await?
        {
            inserted += 1;
        }
    }

    if inserted > 0 {
        debug!(inserted, target, "Inserted missing version rows");
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_strings_round_trip() {
        for state in MigrationState::ALL {
            assert_eq!(state.as_str().parse::<MigrationState>().unwrap(), state);
        }
        assert_eq!(
            "no_migration_required".parse::<MigrationState>().unwrap(),
            MigrationState::Finalized
        );
        assert!("DONE".parse::<MigrationState>().is_err());
    }

    #[test]
    fn test_state_serde_names() {
        assert_eq!(
            serde_json::to_string(&MigrationState::FinalizationRequired).unwrap(),
            "\"FINALIZATION_REQUIRED\""
        );
        assert_eq!(
            serde_json::from_str::<MigrationState>("\"NO_MIGRATION_REQUIRED\"").unwrap(),
            MigrationState::Finalized
        );
    }

    #[test]
    fn test_running_helpers() {
        assert!(MigrationState::MigrationRunning.is_running());
        assert!(MigrationState::FinalizationRunning.is_running());
        assert!(!MigrationState::Finalized.is_running());
        assert_eq!(
            MigrationState::FinalizationRunning.before_running(),
            Some(MigrationState::FinalizationRequired)
        );
        assert_eq!(MigrationState::MigrationRequired.before_running(), None);
    }

    #[test]
    fn test_transitions() {
        use MigrationState::*;
        assert!(MigrationRequired.can_transition_to(MigrationRunning, false));
        assert!(MigrationRunning.can_transition_to(FinalizationRequired, true));
        assert!(!MigrationRunning.can_transition_to(FinalizationRequired, false));
        assert!(MigrationRunning.can_transition_to(Finalized, false));
        assert!(!MigrationRunning.can_transition_to(Finalized, true));
        assert!(!MigrationRequired.can_transition_to(Finalized, false));
        assert!(!FinalizationRequired.can_transition_to(Finalized, true));
    }

    #[test]
    fn test_current_index() {
        let rows = vec![
            VersionRow::new(100, MigrationState::Finalized),
            VersionRow::new(101, MigrationState::Finalized),
            VersionRow::new(102, MigrationState::FinalizationRequired),
        ];
        assert_eq!(current_index(&rows, 100), 101);
        assert_eq!(current_index(&[], 100), 99);
    }
}
