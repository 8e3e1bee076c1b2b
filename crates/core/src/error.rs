//! Error types shared by the resolution pipeline

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unparseable config value for key '{key}' as {target}, supported formats: [{}]", .formats.join(", "))]
    Conversion {
        key: String,
        target: String,
        formats: Vec<String>,
    },

    #[error("Unknown combination policy: {0}")]
    UnknownPolicy(String),

    #[error("Property source error: {0}")]
    Source(#[from] SourceError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Whether this error reports a present but unconvertible value
    pub fn is_conversion(&self) -> bool {
        matches!(self, ConfigError::Conversion { .. })
    }
}

/// Failure raised by a property source while producing its entries
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{name}' unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("failed to parse '{name}': {reason}")]
    Parse { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::Parse {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_error_lists_formats() {
        let err = ConfigError::Conversion {
            key: "server.port".to_string(),
            target: "u16".to_string(),
            formats: vec!["123 (IntegerConverter)".to_string(), "0x7B".to_string()],
        };

        let message = err.to_string();
        assert!(message.contains("server.port"));
        assert!(message.contains("u16"));
        assert!(message.contains("123 (IntegerConverter), 0x7B"));
        assert!(err.is_conversion());
    }

    #[test]
    fn test_source_error_wraps_into_config_error() {
        let err: ConfigError = SourceError::unavailable("etcd", "connection refused").into();
        assert!(!err.is_conversion());
        assert!(err.to_string().contains("etcd"));
    }
}
