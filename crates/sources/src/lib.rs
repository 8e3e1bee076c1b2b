//! Property sources for the tamaya resolution pipeline
//!
//! This crate provides the sources a typical application layers:
//! - System properties, a process-wide store settable at runtime
//! - Environment variables
//! - Command line arguments
//! - `.properties`, TOML, YAML and JSON files
//! - Application defaults shipped in `tamaya-defaults.properties`

mod cli;
mod defaults;
mod environment;
mod format;
mod properties;
mod system;

pub use cli::{parse_args, CliPropertySource, MAIN_ARGS_KEY, PREFIX_KEY as CLI_PREFIX_KEY};
pub use defaults::{DefaultsPropertySource, DEFAULTS_FILE, DISABLE_KEY as DEFAULTS_DISABLE_KEY};
pub use environment::{
    EnvironmentPropertySource, DISABLE_KEY as ENV_DISABLE_KEY, PREFIX_KEY as ENV_PREFIX_KEY,
};
pub use format::{file_source, flatten, FileFormat, StructuredFileSource};
pub use properties::{parse_properties, PropertiesFileSource};
pub use system::{
    system_properties, SystemPropertySource, DISABLE_KEY as SYSPROPS_DISABLE_KEY,
    PREFIX_KEY as SYSPROPS_PREFIX_KEY,
};

use std::path::Path;

pub const SYSTEM_PROPERTIES_ORDINAL: i32 = 1000;
pub const CLI_ORDINAL: i32 = 400;
pub const ENVIRONMENT_ORDINAL: i32 = 300;
pub const FILE_ORDINAL: i32 = 200;
pub const DEFAULTS_ORDINAL: i32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("Properties syntax error at line {line}: {reason}")]
    Properties { line: usize, reason: String },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Whether a switch value turns a feature on
pub(crate) fn is_enabled_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "on"
    )
}

pub(crate) fn file_source_name(path: &Path) -> String {
    format!("file:{}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_flags() {
        assert!(is_enabled_flag("true"));
        assert!(is_enabled_flag(" YES "));
        assert!(!is_enabled_flag("false"));
        assert!(!is_enabled_flag(""));
    }
}
