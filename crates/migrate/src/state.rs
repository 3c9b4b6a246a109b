//! Aggregate migration state

use crate::catalog::Catalog;
use crate::error::{MigrationError, MigrationResult};
use std::collections::BTreeMap;
use strata_store::{MigrationIndex, MigrationState, VersionRow};

/// Externally visible state derived from per-index states
///
/// A running row wins, then a pending finalization, then a pending
/// migration; otherwise everything is finalized.
pub fn aggregate_state<I>(states: I) -> MigrationState
where
    I: IntoIterator<Item = MigrationState>,
{
    let mut finalization_required = false;
    let mut migration_required = false;

    for state in states {
        match state {
            MigrationState::MigrationRunning | MigrationState::FinalizationRunning => return state,
            MigrationState::FinalizationRequired => finalization_required = true,
            MigrationState::MigrationRequired => migration_required = true,
            MigrationState::Finalized => {}
        }
    }

    if finalization_required {
        MigrationState::FinalizationRequired
    } else if migration_required {
        MigrationState::MigrationRequired
    } else {
        MigrationState::Finalized
    }
}

/// Per-index states as seen by a command
///
/// Every persisted row is included; catalog indices that have no row yet
/// read as `MIGRATION_REQUIRED`.
pub fn index_states(
    rows: &[VersionRow],
    catalog: &Catalog,
) -> BTreeMap<MigrationIndex, MigrationState> {
    let mut states: BTreeMap<_, _> = rows
        .iter()
        .map(|row| (row.migration_index, row.migration_state))
        .collect();
    for index in catalog.indices() {
        states
            .entry(index)
            .or_insert(MigrationState::MigrationRequired);
    }
    states
}

/// Catalog indices currently in `state`, ascending
pub fn pending_indices(
    states: &BTreeMap<MigrationIndex, MigrationState>,
    catalog: &Catalog,
    state: MigrationState,
) -> Vec<MigrationIndex> {
    states
        .iter()
        .filter(|(index, s)| **s == state && catalog.unit(**index).is_some())
        .map(|(index, _)| *index)
        .collect()
}

/// Fail unless `from -> to` is a legal bookkeeping transition for a unit
pub fn check_transition(
    index: MigrationIndex,
    from: MigrationState,
    to: MigrationState,
    has_finalize: bool,
) -> MigrationResult<()> {
    if from.can_transition_to(to, has_finalize) {
        Ok(())
    } else {
        Err(MigrationError::Internal(format!(
            "Migration {} cannot move from {} to {}",
            index, from, to
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MigrationState::*;

    #[test]
    fn test_check_transition() {
        assert!(check_transition(101, MigrationRequired, MigrationRunning, true).is_ok());
        assert!(check_transition(101, MigrationRunning, Finalized, false).is_ok());
        assert!(check_transition(101, FinalizationRunning, FinalizationRequired, true).is_ok());

        let err = check_transition(101, MigrationRunning, Finalized, true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Internal error: Migration 101 cannot move from MIGRATION_RUNNING to FINALIZED"
        );
        assert!(check_transition(101, FinalizationRequired, MigrationRunning, true).is_err());
    }

    #[test]
    fn test_aggregate_precedence() {
        assert_eq!(aggregate_state(vec![]), Finalized);
        assert_eq!(aggregate_state(vec![Finalized, Finalized]), Finalized);
        assert_eq!(
            aggregate_state(vec![Finalized, MigrationRequired]),
            MigrationRequired
        );
        assert_eq!(
            aggregate_state(vec![MigrationRequired, FinalizationRequired]),
            FinalizationRequired
        );
        assert_eq!(
            aggregate_state(vec![FinalizationRequired, MigrationRunning, MigrationRequired]),
            MigrationRunning
        );
        assert_eq!(
            aggregate_state(vec![Finalized, FinalizationRunning]),
            FinalizationRunning
        );
    }

    #[test]
    fn test_index_states_from_rows() {
        let catalog = Catalog::builder().build(100).unwrap();
        let rows = vec![
            VersionRow::new(100, Finalized),
            VersionRow::new(101, FinalizationRequired),
        ];
        let states = index_states(&rows, &catalog);
        assert_eq!(states.len(), 2);
        assert_eq!(states.get(&101), Some(&FinalizationRequired));
        // rows without a catalog unit are never pending
        assert!(pending_indices(&states, &catalog, FinalizationRequired).is_empty());
    }
}
