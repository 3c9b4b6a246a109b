//! # strata-http
//!
//! JSON command surface for the migration orchestrator.
//!
//! - `POST /internal/migrations` accepts `{"cmd": ..., "verbose": ...}` and
//!   answers with the orchestrator's command response
//! - `GET /health` reports service and database health

pub mod error;
pub mod logging;
pub mod server;

pub use error::{HttpError, HttpResult};
pub use logging::{init_logging, LoggingConfig};
pub use server::{build_router, start_server, AppState, HEALTH_PATH, MIGRATIONS_PATH};
