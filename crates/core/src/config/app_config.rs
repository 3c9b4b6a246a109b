use crate::config::{
    ConfigError, ConfigSource, ConfigValidator, DatabaseUrlValidator, PortValidator,
    RangeValidator,
};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration trait for application configuration
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Plain,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "plain" | "text" => Ok(LogFormat::Plain),
            _ => Err(ConfigError::invalid_value(
                "log_format",
                s,
                "pretty, json, or plain",
            )),
        }
    }
}

/// Application configuration shared by the orchestrator service and CLI
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub database_acquire_timeout: u64,
    pub migrations_dir: PathBuf,
    /// Bounded wait for early worker completion, in milliseconds
    pub migration_wait_ms: u64,
    /// Oldest migration index the orchestrator can reason about
    pub min_migration_index: i32,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub const DEFAULT_PORT: u16 = 9011;
    pub const DEFAULT_WAIT_MS: u64 = 100;
    pub const DEFAULT_MIN_MIGRATION_INDEX: i32 = 100;

    /// Create a new default configuration
    pub fn new() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            database_acquire_timeout: 30,
            migrations_dir: PathBuf::from("migrations"),
            migration_wait_ms: Self::DEFAULT_WAIT_MS,
            min_migration_index: Self::DEFAULT_MIN_MIGRATION_INDEX,
            host: "127.0.0.1".to_string(),
            port: Self::DEFAULT_PORT,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }

    /// Create configuration for testing
    pub fn testing() -> Self {
        Self {
            database_url: Some("postgres://localhost/strata_test".to_string()),
            database_max_connections: 2,
            migration_wait_ms: 50,
            log_level: "warn".to_string(),
            log_format: LogFormat::Plain,
            ..Self::new()
        }
    }

    /// Get the bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if database is configured
    pub fn has_database(&self) -> bool {
        self.database_url.is_some()
    }

    /// Database URL, or an error naming the missing variable
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or_else(|| {
            ConfigError::missing_required(
                "database_url",
                "DATABASE_URL environment variable is required",
            )
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T: FromStr>(var: &str, field: &str, expected: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_value(field, raw, expected)),
        Err(_) => Ok(None),
    }
}

fn source_of(var: &str, default: &str) -> ConfigSource {
    if env::var(var).is_ok() {
        ConfigSource::EnvVar(var.to_string())
    } else {
        ConfigSource::Default(default.to_string())
    }
}

impl AppConfigTrait for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        config.database_url = env::var("DATABASE_URL").ok();

        if let Some(max) = parse_env("DATABASE_MAX_CONNECTIONS", "database_max_connections", "positive integer")? {
            config.database_max_connections = max;
        }

        if let Some(timeout) = parse_env("DATABASE_ACQUIRE_TIMEOUT", "database_acquire_timeout", "seconds as integer")? {
            config.database_acquire_timeout = timeout;
        }

        if let Ok(dir) = env::var("MIGRATIONS_DIR") {
            config.migrations_dir = PathBuf::from(dir);
        }

        if let Some(wait) = parse_env("MIGRATION_WAIT_MS", "migration_wait_ms", "milliseconds as integer")? {
            config.migration_wait_ms = wait;
        }

        if let Some(index) = parse_env("MIN_MIGRATION_INDEX", "min_migration_index", "integer migration index")? {
            config.min_migration_index = index;
        }

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }

        if let Some(port) = parse_env("PORT", "port", "valid port number (1-65535)")? {
            config.port = port;
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.log_level = log_level.to_lowercase();
        }

        if let Ok(log_format) = env::var("LOG_FORMAT") {
            config.log_format = log_format.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        PortValidator::default().validate(&self.port)?;

        if let Some(url) = &self.database_url {
            DatabaseUrlValidator::default().validate(url)?;
        }

        RangeValidator::new("database_max_connections", 1, 1000)
            .validate(&u64::from(self.database_max_connections))?;
        RangeValidator::new("migration_wait_ms", 1, 10_000).validate(&self.migration_wait_ms)?;

        if self.min_migration_index < 0 {
            return Err(ConfigError::invalid_value(
                "min_migration_index",
                self.min_migration_index.to_string(),
                "non-negative migration index",
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid_value(
                "log_level",
                self.log_level.clone(),
                format!("one of: {}", valid_levels.join(", ")),
            ));
        }

        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::validation_failed(
                "migrations_dir must not be empty",
            ));
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();

        sources.insert("database_url".to_string(), source_of("DATABASE_URL", "unset"));
        sources.insert(
            "database_max_connections".to_string(),
            source_of("DATABASE_MAX_CONNECTIONS", "5"),
        );
        sources.insert("migrations_dir".to_string(), source_of("MIGRATIONS_DIR", "migrations"));
        sources.insert("migration_wait_ms".to_string(), source_of("MIGRATION_WAIT_MS", "100"));
        sources.insert(
            "min_migration_index".to_string(),
            source_of("MIN_MIGRATION_INDEX", "100"),
        );
        sources.insert("host".to_string(), source_of("HOST", "127.0.0.1"));
        sources.insert("port".to_string(), source_of("PORT", "9011"));
        sources.insert("log_level".to_string(), source_of("LOG_LEVEL", "info"));
        sources.insert("log_format".to_string(), source_of("LOG_FORMAT", "pretty"));

        sources
    }
}
