//! Bootstrap settings controlling the default composition

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tamaya_sources::FileFormat as SourceFormat;

/// Default prefix for settings taken from environment variables
pub const ENV_PREFIX: &str = "TAMAYA";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(String),

    #[error("Settings validation failed: {0}")]
    Validation(String),

    #[error("Failed to build configuration: {0}")]
    Build(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config library error: {0}")]
    ConfigLib(#[from] ::config::ConfigError),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Which of the standard sources take part in the default configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub system_properties: bool,
    pub environment: bool,
    pub cli: bool,
    pub defaults: bool,
    /// Prefix stripped from keys before looking up environment variables
    pub env_prefix: Option<String>,
    /// Prefix prepended to system property keys, overriding `tamaya.sysprops.prefix`
    pub sysprops_prefix: Option<String>,
    /// Prefix prepended to command line keys, overriding `main.args.prefix`
    pub cli_prefix: Option<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            system_properties: true,
            environment: true,
            cli: true,
            defaults: true,
            env_prefix: None,
            sysprops_prefix: None,
            cli_prefix: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub sources: SourceSettings,
    /// Configuration files layered between the defaults and the environment, also the files watched
    pub files: Vec<PathBuf>,
    /// Directories searched for `tamaya-defaults.properties`
    pub defaults_search_paths: Vec<PathBuf>,
    /// Install the adaptive combination policy instead of plain overriding
    pub adaptive_policy: bool,
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            sources: SourceSettings::default(),
            files: Vec::new(),
            defaults_search_paths: vec![PathBuf::from(".")],
            adaptive_policy: false,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Loads `BootstrapSettings` from files, strings and the environment
pub struct SettingsLoader;

impl SettingsLoader {
    /// Load settings from a file whose extension names a structured format
    ///
    /// Extensions are resolved like those of configuration files; `.properties` holds flat
    /// entries only and is rejected.
    pub fn from_file(path: &Path) -> Result<BootstrapSettings> {
        let format = settings_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse settings written in `format`
    pub fn parse(content: &str, format: SourceFormat) -> Result<BootstrapSettings> {
        let settings = match format {
            SourceFormat::Toml => toml::from_str(content)?,
            SourceFormat::Yaml => serde_yaml::from_str(content)?,
            SourceFormat::Json => serde_json::from_str(content)?,
            SourceFormat::Properties => return Err(flat_format()),
        };
        Ok(settings)
    }

    /// Load settings from environment variables with the default `TAMAYA` prefix
    pub fn from_env() -> Result<BootstrapSettings> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Load settings from environment variables with a custom prefix
    ///
    /// Nested fields are separated by a double underscore, for example
    /// `TAMAYA_SOURCES__ENVIRONMENT=false` or `TAMAYA_ADAPTIVE_POLICY=true`.
    pub fn from_env_with_prefix(prefix: &str) -> Result<BootstrapSettings> {
        let config = Config::builder()
            .add_source(environment(prefix))
            .build()?;

        config.try_deserialize().map_err(SettingsError::from)
    }

    /// Load settings from a file, overridden by environment variables with the given prefix
    pub fn from_file_with_env(path: &Path, env_prefix: &str) -> Result<BootstrapSettings> {
        let format = match settings_format(path)? {
            SourceFormat::Toml => FileFormat::Toml,
            SourceFormat::Yaml => FileFormat::Yaml,
            SourceFormat::Json => FileFormat::Json,
            SourceFormat::Properties => return Err(flat_format()),
        };

        let config = Config::builder()
            .add_source(File::from(path).format(format).required(true))
            .add_source(environment(env_prefix))
            .build()?;

        config.try_deserialize().map_err(SettingsError::from)
    }

    /// Merge two settings, with overlay taking precedence
    ///
    /// File lists are concatenated without duplicates; every other field comes from the overlay.
    pub fn merge(base: BootstrapSettings, overlay: BootstrapSettings) -> BootstrapSettings {
        BootstrapSettings {
            files: concat_unique(base.files, overlay.files),
            defaults_search_paths: concat_unique(
                base.defaults_search_paths,
                overlay.defaults_search_paths,
            ),
            ..overlay
        }
    }
}

fn settings_format(path: &Path) -> Result<SourceFormat> {
    match SourceFormat::from_path(path) {
        Ok(SourceFormat::Properties) => Err(flat_format()),
        Ok(format) => Ok(format),
        Err(e) => Err(SettingsError::Load(e.to_string())),
    }
}

fn flat_format() -> SettingsError {
    SettingsError::Load("settings need a structured format: toml, yaml or json".to_string())
}

fn environment(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn concat_unique(base: Vec<PathBuf>, overlay: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    base.into_iter()
        .chain(overlay)
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

/// A single validation finding
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate bootstrap settings, reporting every finding at once
pub fn validate_settings(settings: &BootstrapSettings) -> Result<()> {
    let mut errors = Vec::new();

    if let Err(e) = validate_log_level(&settings.log_level) {
        errors.push(e);
    }

    let sources = &settings.sources;
    let any_source = sources.system_properties
        || sources.environment
        || sources.cli
        || sources.defaults
        || !settings.files.is_empty();
    if !any_source {
        errors.push(ValidationError::new(
            "sources",
            "at least one source must be enabled or a file configured",
        ));
    }

    let prefixes = [
        ("sources.env_prefix", &sources.env_prefix),
        ("sources.sysprops_prefix", &sources.sysprops_prefix),
        ("sources.cli_prefix", &sources.cli_prefix),
    ];
    for (field, prefix) in prefixes {
        if prefix.as_deref().is_some_and(|p| p.trim().is_empty()) {
            errors.push(ValidationError::new(field, "prefix must not be blank"));
        }
    }

    for (i, file) in settings.files.iter().enumerate() {
        if let Err(e) = SourceFormat::from_path(file) {
            errors.push(ValidationError::new(format!("files[{i}]"), e.to_string()));
        }
    }

    let unique: HashSet<_> = settings.files.iter().collect();
    if unique.len() != settings.files.len() {
        errors.push(ValidationError::new("files", "duplicate files found"));
    }

    if sources.defaults && settings.defaults_search_paths.is_empty() {
        errors.push(ValidationError::new(
            "defaults_search_paths",
            "defaults source enabled without search paths",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(SettingsError::Validation(message))
    }
}

fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    tracing_subscriber::EnvFilter::try_new(level)
        .map(|_| ())
        .map_err(|e| ValidationError::new("log_level", format!("invalid filter directive: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = BootstrapSettings::default();
        assert!(settings.sources.environment);
        assert!(!settings.adaptive_policy);
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let settings = SettingsLoader::parse(
            r#"
adaptive_policy = true
files = ["app.toml"]

[sources]
cli = false
"#,
            SourceFormat::Toml,
        )
        .unwrap();

        assert!(settings.adaptive_policy);
        assert!(!settings.sources.cli);
        assert!(settings.sources.environment);
        assert_eq!(settings.files, vec![PathBuf::from("app.toml")]);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_yaml_and_json() {
        let yaml =
            SettingsLoader::parse("log_level: debug\njson_logs: true\n", SourceFormat::Yaml)
                .unwrap();
        assert_eq!(yaml.log_level, "debug");
        assert!(yaml.json_logs);

        let json = SettingsLoader::parse(
            r#"{"sources": {"env_prefix": "APP_"}}"#,
            SourceFormat::Json,
        )
        .unwrap();
        assert_eq!(json.sources.env_prefix.as_deref(), Some("APP_"));
    }

    #[test]
    fn test_from_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(b"adaptive_policy: true\n").unwrap();
        file.flush().unwrap();
        assert!(SettingsLoader::from_file(file.path()).unwrap().adaptive_policy);

        let ini = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            SettingsLoader::from_file(ini.path()),
            Err(SettingsError::Load(_))
        ));

        let flat = tempfile::Builder::new().suffix(".properties").tempfile().unwrap();
        assert!(matches!(
            SettingsLoader::from_file(flat.path()),
            Err(SettingsError::Load(_))
        ));
        assert!(matches!(
            SettingsLoader::from_file_with_env(flat.path(), "TAMAYATEST"),
            Err(SettingsError::Load(_))
        ));
        assert!(matches!(
            SettingsLoader::parse("a=b", SourceFormat::Properties),
            Err(SettingsError::Load(_))
        ));
    }

    #[test]
    #[serial]
    fn test_file_with_env_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"log_level = \"warn\"\n[sources]\ncli = true\n")
            .unwrap();
        file.flush().unwrap();

        std::env::set_var("TAMAYATEST_SOURCES__CLI", "false");
        std::env::set_var("TAMAYATEST_ADAPTIVE_POLICY", "true");
        let settings = SettingsLoader::from_file_with_env(file.path(), "TAMAYATEST").unwrap();
        std::env::remove_var("TAMAYATEST_SOURCES__CLI");
        std::env::remove_var("TAMAYATEST_ADAPTIVE_POLICY");

        assert_eq!(settings.log_level, "warn");
        assert!(!settings.sources.cli);
        assert!(settings.adaptive_policy);
    }

    #[test]
    fn test_merge() {
        let base = BootstrapSettings {
            files: vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")],
            ..Default::default()
        };
        let overlay = BootstrapSettings {
            files: vec![PathBuf::from("b.toml"), PathBuf::from("c.json")],
            adaptive_policy: true,
            ..Default::default()
        };
        let merged = SettingsLoader::merge(base, overlay);

        assert!(merged.adaptive_policy);
        assert_eq!(
            merged.files,
            vec![
                PathBuf::from("a.toml"),
                PathBuf::from("b.toml"),
                PathBuf::from("c.json")
            ]
        );
        assert_eq!(merged.defaults_search_paths, vec![PathBuf::from(".")]);
    }

    #[test]
    fn test_validation_collects_all_findings() {
        let settings = BootstrapSettings {
            sources: SourceSettings {
                system_properties: false,
                environment: false,
                cli: false,
                defaults: false,
                env_prefix: Some("  ".to_string()),
                sysprops_prefix: Some(String::new()),
                cli_prefix: Some("cli.".to_string()),
            },
            log_level: "tamaya=verbose".to_string(),
            ..Default::default()
        };

        let Err(SettingsError::Validation(message)) = validate_settings(&settings) else {
            panic!("expected validation failure");
        };
        assert!(message.contains("log_level"));
        assert!(message.contains("sources:"));
        assert!(message.contains("sources.env_prefix"));
        assert!(message.contains("sources.sysprops_prefix"));
        assert!(!message.contains("sources.cli_prefix"));
    }

    #[test]
    fn test_source_prefixes_from_toml() {
        let settings = SettingsLoader::parse(
            "[sources]\nsysprops_prefix = \"sys.\"\ncli_prefix = \"cli.\"\n",
            SourceFormat::Toml,
        )
        .unwrap();
        assert_eq!(settings.sources.sysprops_prefix.as_deref(), Some("sys."));
        assert_eq!(settings.sources.cli_prefix.as_deref(), Some("cli."));
        assert_eq!(settings.sources.env_prefix, None);
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_validation_rejects_unknown_file_format() {
        let settings = BootstrapSettings {
            files: vec![PathBuf::from("app.ini"), PathBuf::from("app.ini")],
            ..Default::default()
        };
        let err = validate_settings(&settings).unwrap_err().to_string();
        assert!(err.contains("files[0]"));
        assert!(err.contains("duplicate files"));
    }
}
