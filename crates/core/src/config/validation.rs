use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Port number validator
pub struct PortValidator {
    pub min: u16,
    pub max: u16,
}

impl Default for PortValidator {
    fn default() -> Self {
        Self { min: 1, max: 65535 }
    }
}

impl ConfigValidator<u16> for PortValidator {
    fn validate(&self, value: &u16) -> Result<(), ConfigError> {
        if *value < self.min || *value > self.max {
            return Err(ConfigError::invalid_value(
                "port",
                value.to_string(),
                format!("port between {} and {}", self.min, self.max),
            ));
        }
        Ok(())
    }
}

/// Inclusive numeric range validator for a named field
pub struct RangeValidator {
    pub field: &'static str,
    pub min: u64,
    pub max: u64,
}

impl RangeValidator {
    pub fn new(field: &'static str, min: u64, max: u64) -> Self {
        Self { field, min, max }
    }
}

impl ConfigValidator<u64> for RangeValidator {
    fn validate(&self, value: &u64) -> Result<(), ConfigError> {
        if *value < self.min || *value > self.max {
            return Err(ConfigError::invalid_value(
                self.field,
                value.to_string(),
                format!("value between {} and {}", self.min, self.max),
            ));
        }
        Ok(())
    }
}

/// Database URL validator
pub struct DatabaseUrlValidator {
    pub schemes: Vec<String>,
}

impl Default for DatabaseUrlValidator {
    fn default() -> Self {
        Self {
            schemes: vec!["postgres".to_string(), "postgresql".to_string()],
        }
    }
}

impl ConfigValidator<String> for DatabaseUrlValidator {
    fn validate(&self, value: &String) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(value).map_err(|e| {
            ConfigError::invalid_value("database_url", value.clone(), format!("valid URL ({})", e))
        })?;

        if !self.schemes.iter().any(|scheme| scheme == parsed.scheme()) {
            return Err(ConfigError::invalid_value(
                "database_url",
                value.clone(),
                format!("URL with scheme: {}", self.schemes.join(", ")),
            ));
        }

        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::invalid_value(
                "database_url",
                value.clone(),
                "URL with host",
            ));
        }

        if parsed.path().trim_start_matches('/').is_empty() {
            return Err(ConfigError::invalid_value(
                "database_url",
                value.clone(),
                "URL with database name",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_validator() {
        let validator = PortValidator::default();

        assert!(validator.validate(&80).is_ok());
        assert!(validator.validate(&65535).is_ok());
        assert!(validator.validate(&0).is_err());
    }

    #[test]
    fn test_range_validator() {
        let validator = RangeValidator::new("wait_ms", 1, 10_000);

        assert!(validator.validate(&100).is_ok());
        assert!(validator.validate(&0).is_err());
        match validator.validate(&20_000) {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "wait_ms"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_database_url_validator() {
        let validator = DatabaseUrlValidator::default();

        assert!(validator
            .validate(&"postgres://user:pw@localhost:5432/app".to_string())
            .is_ok());
        assert!(validator
            .validate(&"postgresql://localhost/app".to_string())
            .is_ok());
        assert!(validator
            .validate(&"mysql://localhost/app".to_string())
            .is_err());
        assert!(validator
            .validate(&"postgres://localhost/".to_string())
            .is_err());
        assert!(validator.validate(&"not-a-url".to_string()).is_err());
    }
}
