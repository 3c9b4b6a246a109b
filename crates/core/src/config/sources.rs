use std::fmt;

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from the named environment variable
    EnvVar(String),
    /// Built-in default, rendered as text
    Default(String),
    /// Overridden by the named command-line flag
    Flag(String),
}

impl ConfigSource {
    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, ConfigSource::Flag(_))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::EnvVar(var) => write!(f, "env {}", var),
            ConfigSource::Default(value) => write!(f, "default ({})", value),
            ConfigSource::Flag(flag) => write!(f, "flag {}", flag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ConfigSource::EnvVar("PORT".into()).to_string(), "env PORT");
        assert_eq!(ConfigSource::Default("100".into()).to_string(), "default (100)");
        assert_eq!(ConfigSource::Flag("--port".into()).to_string(), "flag --port");
        assert!(ConfigSource::Flag("--host".into()).is_flag());
    }
}
