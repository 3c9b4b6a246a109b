//! # strata-store
//!
//! Persistence layer of the migration orchestrator: the `version`
//! bookkeeping table, the backend seam every command and migration body
//! runs through, and the PostgreSQL and in-memory implementations of it.

pub mod backends;
pub mod error;
pub mod security;
pub mod version;

#[cfg(feature = "postgres")]
pub mod database;

pub use backends::*;
pub use error::*;
pub use security::{escape_identifier, validate_identifier, Identifier};
pub use version::*;

#[cfg(feature = "postgres")]
pub use database::*;
