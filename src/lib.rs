//! Layered, pluggable configuration access
//!
//! The `tamaya` crate ties the workspace together:
//! - `tamaya_core`: the resolution pipeline of sources, combination policies, filters and converters
//! - `tamaya_sources`: system properties, environment, command line, files and defaults
//! - `tamaya_events`: frozen snapshots, change sets and hot reload
//! - `settings`: bootstrap settings deciding how the default configuration is composed
//! - `logging`: tracing initialisation
//!
//! `configuration()` returns the process-wide configuration, composing the default one on first
//! access.

pub mod logging;
pub mod settings;

pub use tamaya_core;
pub use tamaya_events;
pub use tamaya_sources;

pub use settings::{
    validate_settings, BootstrapSettings, SettingsError, SettingsLoader, SourceSettings,
    ValidationError,
};
pub use tamaya_core::{
    provider, Configuration, ConfigurationContext, ConfigurationContextBuilder, ConfigError,
    PropertySource, PropertyValue,
};

use std::sync::Arc;
use tamaya_events::{ConfigurationFactory, ConfigurationWatcher, EventBus};
use tamaya_sources::{
    file_source, CliPropertySource, DefaultsPropertySource, EnvironmentPropertySource,
    SystemPropertySource,
};
use tracing::{debug, info};

/// The process-wide configuration, composed from the default settings on first access
pub fn configuration() -> Configuration {
    provider::get_or_init(default_configuration)
}

/// Compose the standard sources with the default settings
///
/// Sources are ordered by ordinal: defaults, files, environment, command line, system properties.
pub fn default_configuration() -> Configuration {
    compose(&BootstrapSettings::default(), Vec::new())
}

/// Compose the sources enabled by `settings`, loading every configured file
pub fn default_configuration_with(settings: &BootstrapSettings) -> settings::Result<Configuration> {
    let files = settings
        .files
        .iter()
        .map(|path| file_source(path).map_err(|e| SettingsError::Build(e.to_string())))
        .collect::<settings::Result<Vec<_>>>()?;
    Ok(compose(settings, files))
}

/// A watcher rebuilding the configuration from `settings` whenever one of its files changes
///
/// Watching starts with `ConfigurationWatcher::start_watching`.
pub fn configuration_watcher(
    settings: BootstrapSettings,
    bus: Arc<EventBus>,
) -> settings::Result<ConfigurationWatcher> {
    let paths = settings.files.clone();
    let factory: ConfigurationFactory =
        Arc::new(move || default_configuration_with(&settings).map_err(anyhow::Error::from));
    ConfigurationWatcher::new(paths, factory, bus).map_err(|e| SettingsError::Build(e.to_string()))
}

fn compose(settings: &BootstrapSettings, files: Vec<Arc<dyn PropertySource>>) -> Configuration {
    let enabled = &settings.sources;
    let mut sources: Vec<Arc<dyn PropertySource>> = files;

    if enabled.system_properties {
        let system = match &enabled.sysprops_prefix {
            Some(prefix) => SystemPropertySource::new().with_prefix(prefix.clone()),
            None => SystemPropertySource::new(),
        };
        sources.push(Arc::new(system));
    }
    if enabled.cli {
        let cli = match &enabled.cli_prefix {
            Some(prefix) => CliPropertySource::with_prefix(std::env::args().skip(1), prefix),
            None => CliPropertySource::from_process_args(),
        };
        sources.push(Arc::new(cli));
    }
    if enabled.environment {
        let environment = match &enabled.env_prefix {
            Some(prefix) => EnvironmentPropertySource::new().with_prefix(prefix.clone()),
            None => EnvironmentPropertySource::new(),
        };
        sources.push(Arc::new(environment));
    }
    if enabled.defaults {
        sources.push(Arc::new(DefaultsPropertySource::load(
            &settings.defaults_search_paths,
        )));
    }
    debug!("Composing configuration from {} sources", sources.len());

    let mut builder = ConfigurationContext::builder()
        .add_property_sources(sources)
        .sort_property_sources_by_ordinal()
        .add_default_converters();
    if settings.adaptive_policy {
        builder = builder.use_adaptive_policy();
    }

    let context = builder.build();
    info!(
        "Configuration composed with sources: {:?}",
        context
            .property_sources()
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
    );
    Configuration::new(context)
}
