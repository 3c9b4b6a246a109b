//! # strata-migrate
//!
//! Moves a PostgreSQL database forward across a linearly indexed sequence
//! of migration units while serving status and progress queries.
//!
//! ## Features
//!
//! - **Durable state machine**: per-index states live in the `version` table
//! - **Background workers**: at most one worker per process, with a bounded
//!   wait for early completion
//! - **Two-phase units**: `migrate` and an optional `finalize`
//! - **SQL file units**: `<index>_<name>.sql` files with section markers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata_migrate::{Catalog, CommandRequest, Orchestrator, OrchestratorConfig};
//! use strata_store::MemoryDatabase;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::load("migrations", 100)?;
//! let orchestrator = Orchestrator::new(
//!     Arc::new(MemoryDatabase::new()),
//!     catalog,
//!     OrchestratorConfig::default(),
//! );
//! orchestrator.initialize().await?;
//!
//! let response = orchestrator
//!     .handle_command(&CommandRequest::new("migrate"))
//!     .await?;
//! println!("{}", serde_json::to_string(&response)?);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod progress;
pub mod sql_unit;
pub mod state;
pub mod stats;
pub mod unit;

pub use catalog::*;
pub use command::*;
pub use config::*;
pub use error::*;
pub use executor::{Executor, RunMode};
pub use orchestrator::Orchestrator;
pub use progress::*;
pub use sql_unit::{create_migration_file, next_index, SqlMigration};
pub use state::{aggregate_state, index_states};
pub use stats::*;
pub use unit::*;
