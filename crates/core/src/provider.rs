//! Configuration providers and the process-wide configuration cell
//!
//! Components should receive their [`Configuration`] explicitly where possible. The global cell
//! exists for code paths without an injection point and can be replaced at runtime, e.g. by a
//! file watcher after a reload or by tests via [`with_configuration`].

use crate::{Configuration, ConfigurationContext, ConfigurationContextBuilder};
use arc_swap::{ArcSwap, ArcSwapOption};
use std::sync::Arc;
use tracing::{debug, info};

/// Creates and holds the configuration of an application
pub trait ConfigurationProvider: Send + Sync {
    /// The current configuration
    fn configuration(&self) -> Configuration;

    fn create_configuration(&self, context: ConfigurationContext) -> Configuration {
        Configuration::new(context)
    }

    fn configuration_context(&self) -> Arc<ConfigurationContext> {
        self.configuration().shared_context()
    }

    /// Replace the current configuration by one backed by `context`
    fn set_configuration_context(&self, context: ConfigurationContext);

    /// A builder preloaded with the current context
    fn configuration_builder(&self) -> ConfigurationContextBuilder {
        self.configuration_context().to_builder()
    }
}

/// Provider holding its configuration in an atomically swappable cell
pub struct DefaultConfigurationProvider {
    current: ArcSwap<Configuration>,
}

impl DefaultConfigurationProvider {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            current: ArcSwap::from_pointee(configuration),
        }
    }

    pub fn set_configuration(&self, configuration: Configuration) {
        self.current.store(Arc::new(configuration));
    }
}

impl Default for DefaultConfigurationProvider {
    fn default() -> Self {
        Self::new(empty_configuration())
    }
}

impl ConfigurationProvider for DefaultConfigurationProvider {
    fn configuration(&self) -> Configuration {
        self.current.load().as_ref().clone()
    }

    fn set_configuration_context(&self, context: ConfigurationContext) {
        debug!(
            "Replacing configuration context with {} property sources",
            context.property_sources().len()
        );
        self.set_configuration(self.create_configuration(context));
    }
}

/// Configuration without sources, able to convert values of the built-in types
pub fn empty_configuration() -> Configuration {
    Configuration::new(
        ConfigurationContext::builder()
            .add_default_converters()
            .build(),
    )
}

static CURRENT: ArcSwapOption<Configuration> = ArcSwapOption::const_empty();

/// The installed configuration, or `None` when nothing was installed yet
pub fn current() -> Option<Configuration> {
    CURRENT.load_full().map(|c| c.as_ref().clone())
}

/// The installed configuration, installing the result of `init` if there is none
///
/// When several threads race, exactly one result is installed and returned to all of them.
pub fn get_or_init<F>(init: F) -> Configuration
where
    F: FnOnce() -> Configuration,
{
    if let Some(installed) = current() {
        return installed;
    }

    let candidate = Arc::new(init());
    let previous = CURRENT.rcu(|installed| match installed {
        Some(existing) => Some(Arc::clone(existing)),
        None => Some(Arc::clone(&candidate)),
    });
    match previous {
        Some(existing) => existing.as_ref().clone(),
        None => {
            info!("Installed global configuration");
            candidate.as_ref().clone()
        }
    }
}

/// The installed configuration, falling back to [`empty_configuration`]
pub fn configuration() -> Configuration {
    get_or_init(empty_configuration)
}

/// Install `configuration` as the process-wide configuration
pub fn set_configuration(configuration: Configuration) {
    CURRENT.store(Some(Arc::new(configuration)));
}

/// Remove the installed configuration
pub fn reset() {
    CURRENT.store(None);
}

/// Run `f` with `configuration` installed, restoring the previous state afterwards
///
/// The previous state is restored even if `f` panics.
pub fn with_configuration<R, F>(configuration: Configuration, f: F) -> R
where
    F: FnOnce() -> R,
{
    struct Restore(Option<Arc<Configuration>>);

    impl Drop for Restore {
        fn drop(&mut self) {
            CURRENT.store(self.0.take());
        }
    }

    let _restore = Restore(CURRENT.swap(Some(Arc::new(configuration))));
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapPropertySource;
    use serial_test::serial;

    fn config_with(key: &str, value: &str) -> Configuration {
        Configuration::new(
            ConfigurationContext::builder()
                .add_property_source(MapPropertySource::from_pairs("test", [(key, value)]))
                .build(),
        )
    }

    #[test]
    fn test_provider_replaces_context() {
        let provider = DefaultConfigurationProvider::default();
        assert_eq!(provider.configuration().get("k"), None);

        let context = provider
            .configuration_builder()
            .add_property_source(MapPropertySource::from_pairs("m", [("k", "v")]))
            .build();
        provider.set_configuration_context(context);

        assert_eq!(provider.configuration().get("k").as_deref(), Some("v"));
        assert_eq!(provider.configuration_context().property_sources().len(), 1);
    }

    #[test]
    #[serial]
    fn test_global_cell_lifecycle() {
        reset();
        assert!(current().is_none());

        let installed = get_or_init(|| config_with("k", "first"));
        assert_eq!(installed.get("k").as_deref(), Some("first"));

        // already installed, init is not used
        let again = get_or_init(|| config_with("k", "second"));
        assert_eq!(again.get("k").as_deref(), Some("first"));

        set_configuration(config_with("k", "third"));
        assert_eq!(configuration().get("k").as_deref(), Some("third"));

        reset();
        assert!(current().is_none());
    }

    #[test]
    #[serial]
    fn test_with_configuration_restores() {
        set_configuration(config_with("k", "outer"));

        let inner = with_configuration(config_with("k", "inner"), || configuration().get("k"));
        assert_eq!(inner.as_deref(), Some("inner"));
        assert_eq!(configuration().get("k").as_deref(), Some("outer"));

        let result = std::panic::catch_unwind(|| {
            with_configuration(config_with("k", "panicking"), || panic!("boom"))
        });
        assert!(result.is_err());
        assert_eq!(configuration().get("k").as_deref(), Some("outer"));

        reset();
    }
}
