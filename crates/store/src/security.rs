//! Identifier validation and quoting
//!
//! Collection and table names reach SQL only as validated, double-quoted
//! identifiers. Values always travel as bind parameters.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// PostgreSQL truncates identifiers beyond this many bytes
const MAX_IDENTIFIER_LEN: usize = 63;

/// Escape a SQL identifier (table name, column name, etc.)
///
/// Doubles embedded double quotes and wraps the result in double quotes,
/// which also preserves case.
///
/// # Examples
/// ```
/// use strata_store::escape_identifier;
///
/// assert_eq!(escape_identifier("user_t"), "\"user_t\"");
/// assert_eq!(escape_identifier("table\"name"), "\"table\"\"name\"");
/// ```
pub fn escape_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Validate that an identifier is safe to use as a collection or table name
pub fn validate_identifier(identifier: &str) -> StoreResult<()> {
    let mut chars = identifier.chars();

    let first = chars
        .next()
        .ok_or_else(|| StoreError::InvalidIdentifier("identifier cannot be empty".to_string()))?;

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(StoreError::InvalidIdentifier(format!(
            "'{}' is too long (max {} characters)",
            identifier, MAX_IDENTIFIER_LEN
        )));
    }

    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(StoreError::InvalidIdentifier(format!(
            "'{}' must start with a letter or underscore",
            identifier
        )));
    }

    if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$')) {
        return Err(StoreError::InvalidIdentifier(format!(
            "'{}' contains invalid character '{}'",
            identifier, c
        )));
    }

    Ok(())
}

/// A validated SQL identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validate and wrap a name
    pub fn new(name: impl Into<String>) -> StoreResult<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self(name))
    }

    /// The raw, unquoted name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name quoted for direct use in SQL text
    pub fn quoted(&self) -> String {
        escape_identifier(&self.0)
    }

    /// `name || suffix`, e.g. `user` + `_t`
    pub fn with_suffix(&self, suffix: &str) -> StoreResult<Self> {
        Self::new(format!("{}{}", self.0, suffix))
    }

    /// The name with `suffix` removed, if it ends with it
    pub fn strip_suffix(&self, suffix: &str) -> Option<Self> {
        self.0
            .strip_suffix(suffix)
            .filter(|stem| !stem.is_empty())
            .map(|stem| Self(stem.to_string()))
    }

    pub fn ends_with(&self, suffix: &str) -> bool {
        self.0.ends_with(suffix)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("motion_t"), "\"motion_t\"");
        assert_eq!(escape_identifier("Mixed"), "\"Mixed\"");
        assert_eq!(escape_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("user").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("price$1").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("user; DROP TABLE x").is_err());
        assert!(validate_identifier("a-b").is_err());
        assert!(validate_identifier(&"x".repeat(64)).is_err());
        assert!(validate_identifier(&"x".repeat(63)).is_ok());
    }

    #[test]
    fn test_identifier_suffixes() {
        let shadow = Identifier::new("motion_m").unwrap();
        assert!(shadow.ends_with("_m"));

        let stem = shadow.strip_suffix("_m").unwrap();
        assert_eq!(stem.as_str(), "motion");
        assert_eq!(stem.with_suffix("_t").unwrap().quoted(), "\"motion_t\"");

        assert!(Identifier::new("_m").unwrap().strip_suffix("_m").is_none());
        assert!(shadow.strip_suffix("_t").is_none());
    }

    #[test]
    fn test_identifier_serde() {
        let id: Identifier = serde_json::from_str("\"user_t\"").unwrap();
        assert_eq!(id.as_str(), "user_t");
        assert!(serde_json::from_str::<Identifier>("\"bad name\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"user_t\"");
    }
}
