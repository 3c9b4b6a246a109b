//! SQL file migration units
//!
//! A unit file is named `<index>_<name>.sql` and split into sections by
//! `-- migrate` and `-- finalize` comment markers. Shadow tables are declared
//! with `-- replace: <collection> => <shadow_table>` directives anywhere in
//! the file.

use crate::error::{MigrationError, MigrationResult, UnitResult};
use crate::progress::ProgressWriter;
use crate::unit::MigrationUnit;
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use strata_store::{Identifier, MigrationIndex, StoreTransaction};

static FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)_([A-Za-z0-9_]+)$").expect("file name pattern is valid")
});

static REPLACE_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^--\s*replace:\s*(\S+)\s*=>\s*(\S+)\s*$").expect("replace pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Migrate,
    Finalize,
}

/// A migration unit backed by plain SQL
#[derive(Debug, Clone)]
pub struct SqlMigration {
    index: MigrationIndex,
    name: String,
    migrate_statements: Vec<String>,
    finalize_statements: Vec<String>,
    replace_tables: BTreeMap<Identifier, Identifier>,
    path: Option<PathBuf>,
}

impl SqlMigration {
    /// Parse unit content
    pub fn parse(index: MigrationIndex, name: &str, content: &str) -> MigrationResult<Self> {
        let mut migrate_sql = Vec::new();
        let mut finalize_sql = Vec::new();
        let mut replace_tables = BTreeMap::new();
        let mut section = Section::Preamble;

        for line in content.lines() {
            let trimmed = line.trim();
            let lowered = trimmed.to_lowercase();

            if lowered == "-- migrate" {
                section = Section::Migrate;
                continue;
            } else if lowered == "-- finalize" {
                section = Section::Finalize;
                continue;
            }

            if let Some(captures) = REPLACE_DIRECTIVE.captures(trimmed) {
                let collection = Identifier::new(&captures[1]).map_err(|e| {
                    MigrationError::catalog(format!("Migration {}: {}", index, e))
                })?;
                let shadow = Identifier::new(&captures[2]).map_err(|e| {
                    MigrationError::catalog(format!("Migration {}: {}", index, e))
                })?;
                replace_tables.insert(collection, shadow);
                continue;
            }

            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }

            match section {
                Section::Migrate => migrate_sql.push(line),
                Section::Finalize => finalize_sql.push(line),
                Section::Preamble => {
                    return Err(MigrationError::catalog(format!(
                        "Migration {}: SQL found before the '-- migrate' marker",
                        index
                    )))
                }
            }
        }

        let migrate_statements = split_sql_statements(&migrate_sql.join("\n"));
        if migrate_statements.is_empty() {
            return Err(MigrationError::catalog(format!(
                "Migration {} has an empty migrate section",
                index
            )));
        }

        Ok(Self {
            index,
            name: name.to_string(),
            migrate_statements,
            finalize_statements: split_sql_statements(&finalize_sql.join("\n")),
            replace_tables,
            path: None,
        })
    }

    /// Load a unit from a `<index>_<name>.sql` file
    pub fn from_file(path: &Path) -> MigrationResult<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MigrationError::catalog("Invalid migration filename"))?;
        let (index, name) = parse_file_name(stem)?;

        let content = fs::read_to_string(path).map_err(|e| {
            MigrationError::catalog(format!(
                "Failed to read migration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut unit = Self::parse(index, &name, &content)?;
        unit.path = Some(path.to_path_buf());
        Ok(unit)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn migrate_statements(&self) -> &[String] {
        &self.migrate_statements
    }

    pub fn finalize_statements(&self) -> &[String] {
        &self.finalize_statements
    }

    async fn run_statements(
        &self,
        statements: &[String],
        tx: &mut dyn StoreTransaction,
        out: &ProgressWriter,
    ) -> UnitResult<()> {
        let mut affected = 0;
        for statement in statements {
            affected += tx.execute(statement).await?;
        }
        out.write_verbose(format!(
            "executed {} statements ({} rows affected)",
            statements.len(),
            affected
        ));
        Ok(())
    }
}

#[async_trait]
impl MigrationUnit for SqlMigration {
    fn target_index(&self) -> MigrationIndex {
        self.index
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_finalize(&self) -> bool {
        !self.finalize_statements.is_empty()
    }

    fn replace_tables(&self) -> BTreeMap<Identifier, Identifier> {
        self.replace_tables.clone()
    }

    async fn migrate(&self, tx: &mut dyn StoreTransaction, out: &ProgressWriter) -> UnitResult<()> {
        self.run_statements(&self.migrate_statements, tx, out).await
    }

    async fn finalize(&self, tx: &mut dyn StoreTransaction, out: &ProgressWriter) -> UnitResult<()> {
        self.run_statements(&self.finalize_statements, tx, out).await
    }
}

/// Split `<index>_<name>` into its index and a readable name
pub fn parse_file_name(stem: &str) -> MigrationResult<(MigrationIndex, String)> {
    let captures = FILE_NAME.captures(stem).ok_or_else(|| {
        MigrationError::catalog(format!(
            "Migration filename '{}' must follow the format <index>_<name>",
            stem
        ))
    })?;
    let index = captures[1].parse::<MigrationIndex>().map_err(|e| {
        MigrationError::catalog(format!("Invalid migration index in '{}': {}", stem, e))
    })?;
    Ok((index, captures[2].replace('_', " ")))
}

/// Split SQL into individual statements
///
/// SQL the parser does not understand is kept whole as a single statement;
/// the server then splits it with its own lexer.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }

    match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(parsed) => parsed.iter().map(|stmt| stmt.to_string()).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, executing the section as one batch: {}", e);
            vec![sql.trim().to_string()]
        }
    }
}

/// Next index after the largest one in `dir`, or `min_index + 1`
pub fn next_index(dir: &Path, min_index: MigrationIndex) -> MigrationResult<MigrationIndex> {
    let mut highest = min_index;
    if dir.exists() {
        let entries = fs::read_dir(dir).map_err(|e| {
            MigrationError::catalog(format!("Failed to read migrations directory: {}", e))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "sql") {
                if let Some((index, _)) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|stem| parse_file_name(stem).ok())
                {
                    highest = highest.max(index);
                }
            }
        }
    }
    Ok(highest + 1)
}

/// Write a new unit template and return its path
pub fn create_migration_file(
    dir: &Path,
    name: &str,
    min_index: MigrationIndex,
) -> MigrationResult<PathBuf> {
    let slug = name.trim().replace([' ', '-'], "_").to_lowercase();
    if slug.is_empty() || !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MigrationError::catalog(format!(
            "Invalid migration name '{}'",
            name
        )));
    }

    fs::create_dir_all(dir).map_err(|e| {
        MigrationError::catalog(format!("Failed to create migrations directory: {}", e))
    })?;

    let index = next_index(dir, min_index)?;
    let path = dir.join(format!("{:04}_{}.sql", index, slug));
    let template = format!(
        "-- Migration {}: {}\n\
         -- Created: {}\n\
         -- Declare shadow tables with lines like '-- replace: collection => collection_m'\n\n\
         -- migrate\n\
         SELECT 1;\n\n\
         -- finalize\n",
        index,
        name.trim(),
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );

    fs::write(&path, template)
        .map_err(|e| MigrationError::catalog(format!("Failed to write migration file: {}", e)))?;
    Ok(path)
}
