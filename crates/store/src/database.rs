//! Database pool creation

use crate::backends::PostgresDatabase;
use crate::error::{StoreError, StoreResult};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds to wait for a free connection
    pub acquire_timeout: u64,
    pub idle_timeout: Option<u64>,
    pub max_lifetime: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 0,
            acquire_timeout: 30,
            idle_timeout: Some(600),
            max_lifetime: Some(1800),
            test_before_acquire: true,
        }
    }
}

impl PoolConfig {
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, seconds: u64) -> Self {
        self.acquire_timeout = seconds;
        self
    }

    fn validate(&self) -> StoreResult<()> {
        if self.max_connections == 0 {
            return Err(StoreError::Configuration(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(StoreError::Configuration(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Connect to PostgreSQL and wrap the pool in a [`PostgresDatabase`]
pub async fn connect_postgres(database_url: &str, config: &PoolConfig) -> StoreResult<PostgresDatabase> {
    config.validate()?;
    tracing::debug!(
        "Creating database pool with config: max={}, min={}, timeout={}s",
        config.max_connections,
        config.min_connections,
        config.acquire_timeout
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout))
        .test_before_acquire(config.test_before_acquire);

    if let Some(idle_timeout) = config.idle_timeout {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }
    if let Some(max_lifetime) = config.max_lifetime {
        options = options.max_lifetime(Duration::from_secs(max_lifetime));
    }

    let pool = options.connect(database_url).await.map_err(|e| {
        tracing::error!("Failed to create database pool: {}", e);
        StoreError::Connection(format!("Failed to create database pool: {}", e))
    })?;

    tracing::info!(
        "Database pool created with {} max connections",
        config.max_connections
    );
    Ok(PostgresDatabase::new(pool))
}
