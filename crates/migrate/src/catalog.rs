//! Migration Catalog
//!
//! The ordered set of migration units known to this build. A catalog is
//! only ever constructed through [`CatalogBuilder::build`], which rejects
//! duplicate, out-of-range and non-contiguous indices.

use crate::error::{MigrationError, MigrationResult};
use crate::sql_unit::SqlMigration;
use crate::unit::MigrationUnit;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use strata_store::{Identifier, MigrationIndex};
use tracing::{debug, info};

/// Validated, index-ordered collection of migration units
#[derive(Debug, Clone)]
pub struct Catalog {
    min_index: MigrationIndex,
    units: BTreeMap<MigrationIndex, Arc<dyn MigrationUnit>>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Load every SQL unit in `dir`
    pub fn load<P: AsRef<Path>>(dir: P, min_index: MigrationIndex) -> MigrationResult<Self> {
        CatalogBuilder::new().load_dir(dir)?.build(min_index)
    }

    /// Oldest index this catalog reasons about
    pub fn min_index(&self) -> MigrationIndex {
        self.min_index
    }

    /// Largest declared index, or the minimum index when empty
    pub fn target_index(&self) -> MigrationIndex {
        self.units
            .keys()
            .next_back()
            .copied()
            .unwrap_or(self.min_index)
    }

    pub fn unit(&self, index: MigrationIndex) -> Option<&Arc<dyn MigrationUnit>> {
        self.units.get(&index)
    }

    /// Collection to shadow table map of one unit
    pub fn replace_tables(&self, index: MigrationIndex) -> BTreeMap<Identifier, Identifier> {
        self.units
            .get(&index)
            .map(|unit| unit.replace_tables())
            .unwrap_or_default()
    }

    /// Units in ascending index order
    pub fn units(&self) -> impl Iterator<Item = &Arc<dyn MigrationUnit>> {
        self.units.values()
    }

    pub fn indices(&self) -> impl Iterator<Item = MigrationIndex> + '_ {
        self.units.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Collects migration units before validation
#[derive(Default)]
pub struct CatalogBuilder {
    units: Vec<Arc<dyn MigrationUnit>>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a programmatic unit
    pub fn register(mut self, unit: Arc<dyn MigrationUnit>) -> Self {
        self.units.push(unit);
        self
    }

    /// Add every `*.sql` unit found in `dir`; a missing directory adds nothing
    pub fn load_dir<P: AsRef<Path>>(mut self, dir: P) -> MigrationResult<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            debug!("Migrations directory {} does not exist", dir.display());
            return Ok(self);
        }

        let entries = fs::read_dir(dir).map_err(|e| {
            MigrationError::catalog(format!("Failed to read migrations directory: {}", e))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                MigrationError::catalog(format!("Failed to read directory entry: {}", e))
            })?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "sql") {
                let unit = SqlMigration::from_file(&path)?;
                self.units.push(Arc::new(unit));
            }
        }
        Ok(self)
    }

    /// Validate and freeze the catalog
    pub fn build(self, min_index: MigrationIndex) -> MigrationResult<Catalog> {
        let mut units: BTreeMap<MigrationIndex, Arc<dyn MigrationUnit>> = BTreeMap::new();

        for unit in self.units {
            let index = unit.target_index();
            if index <= min_index {
                return Err(MigrationError::catalog(format!(
                    "Migration '{}' has index {} which is not above the minimum index {}",
                    unit.name(),
                    index,
                    min_index
                )));
            }
            if let Some(existing) = units.get(&index) {
                return Err(MigrationError::catalog(format!(
                    "Duplicate migration index {}: '{}' and '{}'",
                    index,
                    existing.name(),
                    unit.name()
                )));
            }
            units.insert(index, unit);
        }

        for (expected, index) in ((min_index + 1)..).zip(units.keys()) {
            if *index != expected {
                return Err(MigrationError::catalog(format!(
                    "Missing migration index {} (next declared index is {})",
                    expected, index
                )));
            }
        }

        let catalog = Catalog { min_index, units };
        info!(
            units = catalog.len(),
            target = catalog.target_index(),
            "Loaded migration catalog"
        );
        Ok(catalog)
    }
}
