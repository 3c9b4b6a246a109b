//! # strata-core
//!
//! Shared foundation for the strata workspace: environment driven
//! application configuration, validation errors and config-source
//! introspection used by the store, orchestrator, HTTP and CLI crates.

pub mod config;

pub use config::validation::ConfigError;
pub use config::{AppConfig, AppConfigTrait, ConfigSource, LogFormat};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name used in logs and health responses
pub const SERVICE_NAME: &str = "strata";

/// Get the workspace version
pub fn version() -> &'static str {
    VERSION
}
