//! Orchestrator configuration types and builders

use serde::{Deserialize, Serialize};
use service_builder::builder;
use std::time::Duration;
use strata_core::AppConfig;

/// Configuration for the command orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct OrchestratorConfig {
    /// How long a mutating command waits for its worker before answering
    #[builder(default = "Duration::from_millis(100)", getter)]
    pub wait_timeout: Duration,

    /// Interval at which clients poll `progress`
    #[builder(default = "Duration::from_millis(500)", getter)]
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            wait_timeout: Duration::from_millis(config.migration_wait_ms),
            ..Self::default()
        }
    }
}

impl OrchestratorConfigBuilder {
    /// Create a development configuration with fast polling
    pub fn development() -> Self {
        OrchestratorConfigBuilder::new()
            .wait_timeout(Duration::from_millis(200))
            .poll_interval(Duration::from_millis(250))
    }

    /// Create a production configuration with conservative defaults
    pub fn production() -> Self {
        OrchestratorConfigBuilder::new()
            .wait_timeout(Duration::from_millis(100))
            .poll_interval(Duration::from_secs(1))
    }

    /// Create a testing configuration with minimal waiting
    pub fn testing() -> Self {
        OrchestratorConfigBuilder::new()
            .wait_timeout(Duration::from_millis(50))
            .poll_interval(Duration::from_millis(10))
    }
}
