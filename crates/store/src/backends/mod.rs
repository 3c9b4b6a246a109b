//! Database backend implementations

pub mod core;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use self::core::*;

#[cfg(feature = "memory")]
pub use memory::MemoryDatabase;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresDatabase, PostgresTransaction};
