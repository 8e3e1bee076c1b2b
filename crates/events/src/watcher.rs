//! Hot reload of file backed configuration

use crate::{ConfigurationChange, EventBus, EventError, FrozenConfiguration, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tamaya_core::{provider, Configuration};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Builds a fresh configuration, typically by re-reading the watched files
pub type ConfigurationFactory = Arc<dyn Fn() -> anyhow::Result<Configuration> + Send + Sync>;

struct Current {
    configuration: Configuration,
    snapshot: FrozenConfiguration,
}

/// Rebuilds the configuration whenever one of the watched files changes
///
/// After a successful rebuild the difference to the previous snapshot is published on the
/// event bus and, unless disabled, the new configuration is installed as the process-wide one.
/// A failed rebuild keeps the previous configuration.
pub struct ConfigurationWatcher {
    current: Arc<RwLock<Current>>,
    factory: ConfigurationFactory,
    paths: Vec<PathBuf>,
    bus: Arc<EventBus>,
    install_globally: Arc<AtomicBool>,
}

impl ConfigurationWatcher {
    /// Build the initial configuration through `factory`
    pub fn new(
        paths: Vec<PathBuf>,
        factory: ConfigurationFactory,
        bus: Arc<EventBus>,
    ) -> Result<Self> {
        let configuration = factory().map_err(|e| EventError::Rebuild(e.to_string()))?;
        let snapshot = FrozenConfiguration::of(&configuration);

        Ok(Self {
            current: Arc::new(RwLock::new(Current {
                configuration,
                snapshot,
            })),
            factory,
            paths,
            bus,
            install_globally: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Whether reloads replace the process-wide configuration, enabled by default
    pub fn install_globally(self, install: bool) -> Self {
        self.install_globally.store(install, Ordering::Relaxed);
        self
    }

    pub fn configuration(&self) -> Configuration {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .configuration
            .clone()
    }

    pub fn snapshot(&self) -> FrozenConfiguration {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot
            .clone()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Rebuild now, returning the published change, or `None` if nothing changed
    pub fn reload(&self) -> Result<Option<ConfigurationChange>> {
        reload(&self.current, &self.factory, &self.bus, &self.install_globally)
    }

    /// Start watching the files for changes
    ///
    /// Returns a join handle for the watcher task, which runs until the event channel closes.
    pub fn start_watching(&self) -> Result<JoinHandle<()>> {
        let current = Arc::clone(&self.current);
        let factory = Arc::clone(&self.factory);
        let bus = Arc::clone(&self.bus);
        let install_globally = Arc::clone(&self.install_globally);

        let (tx, mut rx) = mpsc::channel(100);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Err(e) = tx.blocking_send(event) {
                        error!("Failed to send file event: {}", e);
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| EventError::Watch(e.to_string()))?;

        for path in &self.paths {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| EventError::Watch(e.to_string()))?;
            info!("Started watching configuration file: {:?}", path);
        }

        let handle = tokio::spawn(async move {
            // the watcher stops when dropped
            let _watcher = watcher;

            while let Some(event) = rx.recv().await {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }
                debug!("Configuration file changed: {:?}", event.paths);

                match reload(&current, &factory, &bus, &install_globally) {
                    Ok(Some(change)) => info!(
                        "Configuration reloaded, {} keys changed (v{} -> v{})",
                        change.len(),
                        change.old_version(),
                        change.new_version()
                    ),
                    Ok(None) => debug!("Configuration reloaded without changes"),
                    Err(e) => warn!("Failed to reload configuration: {}. Keeping old configuration.", e),
                }
            }

            debug!("Configuration watcher task stopped");
        });

        Ok(handle)
    }

    /// Create a watcher and start watching immediately
    pub fn watch(
        paths: Vec<PathBuf>,
        factory: ConfigurationFactory,
        bus: Arc<EventBus>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let watcher = Self::new(paths, factory, bus)?;
        let handle = watcher.start_watching()?;
        Ok((watcher, handle))
    }
}

fn reload(
    current: &RwLock<Current>,
    factory: &ConfigurationFactory,
    bus: &EventBus,
    install_globally: &AtomicBool,
) -> Result<Option<ConfigurationChange>> {
    let configuration = factory().map_err(|e| EventError::Rebuild(e.to_string()))?;
    let snapshot = FrozenConfiguration::of(&configuration);

    let change = {
        let mut guard = current.write().unwrap_or_else(|e| e.into_inner());
        let change = ConfigurationChange::between(&guard.snapshot, &snapshot);
        *guard = Current {
            configuration: configuration.clone(),
            snapshot,
        };
        change
    };

    if install_globally.load(Ordering::Relaxed) {
        provider::set_configuration(configuration);
    }
    if change.is_empty() {
        return Ok(None);
    }
    bus.publish(&change);
    Ok(Some(change))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tamaya_core::{ConfigurationContext, MapPropertySource};

    fn switching_factory(flag: Arc<AtomicBool>) -> ConfigurationFactory {
        Arc::new(move || -> anyhow::Result<Configuration> {
            if flag.load(Ordering::SeqCst) {
                anyhow::bail!("source unavailable");
            }
            Ok(Configuration::new(
                ConfigurationContext::builder()
                    .add_property_source(MapPropertySource::from_pairs(
                        "static",
                        [("k", "v")],
                    ))
                    .build(),
            ))
        })
    }

    #[test]
    fn test_reload_without_changes() {
        let failing = Arc::new(AtomicBool::new(false));
        let watcher = ConfigurationWatcher::new(
            vec![],
            switching_factory(Arc::clone(&failing)),
            Arc::new(EventBus::new()),
        )
        .unwrap()
        .install_globally(false);

        assert!(watcher.reload().unwrap().is_none());
        assert_eq!(watcher.configuration().get("k").as_deref(), Some("v"));
    }

    #[test]
    #[serial]
    fn test_failed_reload_keeps_configuration() {
        let failing = Arc::new(AtomicBool::new(false));
        let watcher = ConfigurationWatcher::new(
            vec![],
            switching_factory(Arc::clone(&failing)),
            Arc::new(EventBus::new()),
        )
        .unwrap();
        let version = watcher.snapshot().version();

        failing.store(true, Ordering::SeqCst);
        assert!(matches!(watcher.reload(), Err(EventError::Rebuild(_))));
        assert_eq!(watcher.snapshot().version(), version);
        assert_eq!(watcher.configuration().get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_initial_build_failure() {
        let failing = Arc::new(AtomicBool::new(true));
        let result = ConfigurationWatcher::new(
            vec![],
            switching_factory(failing),
            Arc::new(EventBus::new()),
        );
        assert!(result.is_err());
    }
}
