//! Process-wide system properties and the property source exposing them

use crate::{is_enabled_flag, SYSTEM_PROPERTIES_ORDINAL};
use arc_swap::ArcSwapOption;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tamaya_core::{PropertyMap, PropertySource, PropertyValue, SourceError};
use tracing::debug;

/// Switch disabling the system properties source
pub const DISABLE_KEY: &str = "tamaya.sysprops.disable";

/// Prefix prepended to every system property key
pub const PREFIX_KEY: &str = "tamaya.sysprops.prefix";

/// The process-wide system property store
///
/// Every mutation bumps a generation counter that sources use as a cheap change fingerprint.
pub mod system_properties {
    use super::*;

    static STORE: RwLock<BTreeMap<String, String>> = RwLock::new(BTreeMap::new());
    static GENERATION: AtomicU64 = AtomicU64::new(0);

    fn touch() {
        GENERATION.fetch_add(1, Ordering::AcqRel);
    }

    /// Set a property, returning the previous value
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let previous = STORE
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into());
        touch();
        previous
    }

    pub fn get(key: &str) -> Option<String> {
        STORE
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn remove(key: &str) -> Option<String> {
        let previous = STORE
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        touch();
        previous
    }

    pub fn clear() {
        STORE.write().unwrap_or_else(|e| e.into_inner()).clear();
        touch();
    }

    /// Copy of all properties
    pub fn snapshot() -> BTreeMap<String, String> {
        STORE.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Value changing whenever the store is modified
    pub fn fingerprint() -> u64 {
        GENERATION.load(Ordering::Acquire)
    }
}

struct Scan {
    fingerprint: u64,
    entries: Arc<PropertyMap>,
}

/// Exposes [`system_properties`] with ordinal 1000
///
/// The scanned map is cached and only recomputed when the store fingerprint changes. Under
/// concurrent modification a scan may be repeated, but readers always see a complete map.
pub struct SystemPropertySource {
    name: String,
    ordinal: i32,
    prefix: Option<String>,
    cache: ArcSwapOption<Scan>,
}

impl SystemPropertySource {
    pub fn new() -> Self {
        Self {
            name: "system-properties".to_string(),
            ordinal: SYSTEM_PROPERTIES_ORDINAL,
            prefix: None,
            cache: ArcSwapOption::empty(),
        }
    }

    /// Prepend `prefix` to every key, taking precedence over the `tamaya.sysprops.prefix` switch
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    fn is_disabled(&self) -> bool {
        system_properties::get(DISABLE_KEY)
            .as_deref()
            .map(is_enabled_flag)
            .unwrap_or(false)
    }

    fn scan(&self) -> Arc<PropertyMap> {
        let fingerprint = system_properties::fingerprint();
        if let Some(scan) = self.cache.load_full() {
            if scan.fingerprint == fingerprint {
                return Arc::clone(&scan.entries);
            }
        }

        let prefix = self
            .prefix
            .clone()
            .or_else(|| system_properties::get(PREFIX_KEY))
            .unwrap_or_default();
        let entries: PropertyMap = system_properties::snapshot()
            .into_iter()
            .map(|(k, v)| (format!("{prefix}{k}"), v))
            .collect();
        debug!("Rescanned {} system properties", entries.len());

        let entries = Arc::new(entries);
        self.cache.store(Some(Arc::new(Scan {
            fingerprint,
            entries: Arc::clone(&entries),
        })));
        entries
    }
}

impl Default for SystemPropertySource {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertySource for SystemPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Result<Option<PropertyValue>, SourceError> {
        if self.is_disabled() {
            return Ok(Some(
                PropertyValue::builder(key)
                    .source(format!("{}(disabled)", self.name))
                    .build(),
            ));
        }
        Ok(PropertyValue::from_map(key, &self.scan()).map(|value| {
            value
                .to_builder()
                .meta_defaults([("source", self.name.as_str())])
                .build()
        }))
    }

    fn properties(&self) -> Result<PropertyMap, SourceError> {
        if self.is_disabled() {
            return Ok(PropertyMap::new());
        }
        Ok(self.scan().as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_store_fingerprint_changes() {
        let before = system_properties::fingerprint();
        system_properties::set("fp.key", "1");
        assert_ne!(system_properties::fingerprint(), before);
        assert_eq!(system_properties::get("fp.key").as_deref(), Some("1"));
        assert_eq!(system_properties::remove("fp.key").as_deref(), Some("1"));
    }

    #[test]
    #[serial]
    fn test_source_rescans_on_change() {
        system_properties::clear();
        let source = SystemPropertySource::new();
        system_properties::set("app.name", "first");
        assert_eq!(
            source.get("app.name").unwrap().unwrap().value(),
            Some("first")
        );

        system_properties::set("app.name", "second");
        assert_eq!(
            source.get("app.name").unwrap().unwrap().value(),
            Some("second")
        );
        assert_eq!(
            source.get("app.name").unwrap().unwrap().source(),
            Some("system-properties")
        );
        system_properties::clear();
    }

    #[test]
    #[serial]
    fn test_disabled_source_reports_itself() {
        system_properties::clear();
        system_properties::set("app.name", "x");
        system_properties::set(DISABLE_KEY, "true");
        let source = SystemPropertySource::new();

        let value = source.get("app.name").unwrap().unwrap();
        assert!(!value.is_present());
        assert_eq!(value.source(), Some("system-properties(disabled)"));
        assert!(source.properties().unwrap().is_empty());
        system_properties::clear();
    }

    #[test]
    #[serial]
    fn test_prefix_applies_to_keys() {
        system_properties::clear();
        system_properties::set(PREFIX_KEY, "sys.");
        system_properties::set("home", "/root");
        let source = SystemPropertySource::new();

        assert_eq!(
            source.get("sys.home").unwrap().and_then(|v| v.value().map(String::from)),
            Some("/root".to_string())
        );
        assert!(source.get("home").unwrap().is_none());
        system_properties::clear();
    }

    #[test]
    #[serial]
    fn test_explicit_prefix_beats_switch() {
        system_properties::clear();
        system_properties::set(PREFIX_KEY, "sys.");
        system_properties::set("home", "/root");
        let source = SystemPropertySource::new().with_prefix("jvm.");

        assert_eq!(
            source.get("jvm.home").unwrap().and_then(|v| v.value().map(String::from)),
            Some("/root".to_string())
        );
        assert!(source.get("sys.home").unwrap().is_none());
        system_properties::clear();
    }
}
