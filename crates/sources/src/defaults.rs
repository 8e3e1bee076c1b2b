//! Application defaults shipped in `tamaya-defaults.properties`

use crate::properties::parse_properties;
use crate::{is_enabled_flag, system::system_properties, DEFAULTS_ORDINAL};
use std::path::{Path, PathBuf};
use tamaya_core::{PropertyMap, PropertySource, PropertyValue, SourceError};
use tracing::{debug, warn};

/// File name looked up in every search path
pub const DEFAULTS_FILE: &str = "tamaya-defaults.properties";

/// Switch disabling the defaults source
pub const DISABLE_KEY: &str = "tamaya.defaults.disable";

/// Entries of the first `tamaya-defaults.properties` found, with ordinal 100
///
/// A missing file is not an error; the source is simply empty. A file that cannot be parsed
/// is logged and ignored.
pub struct DefaultsPropertySource {
    name: String,
    ordinal: i32,
    origin: Option<PathBuf>,
    entries: PropertyMap,
}

impl DefaultsPropertySource {
    pub fn load<P: AsRef<Path>>(search_paths: &[P]) -> Self {
        let mut source = Self {
            name: "defaults".to_string(),
            ordinal: DEFAULTS_ORDINAL,
            origin: None,
            entries: PropertyMap::new(),
        };

        if Self::is_disabled() {
            debug!("Defaults property source disabled by {}", DISABLE_KEY);
            return source;
        }

        for dir in search_paths {
            let candidate = dir.as_ref().join(DEFAULTS_FILE);
            let Ok(content) = std::fs::read_to_string(&candidate) else {
                continue;
            };
            match parse_properties(&content) {
                Ok(entries) => {
                    debug!("Loaded defaults from {}", candidate.display());
                    source.entries = entries;
                    source.origin = Some(candidate);
                    break;
                }
                Err(e) => warn!("Ignoring defaults file {}: {}", candidate.display(), e),
            }
        }
        source
    }

    fn is_disabled() -> bool {
        system_properties::get(DISABLE_KEY)
            .or_else(|| std::env::var("TAMAYA_DEFAULTS_DISABLE").ok())
            .as_deref()
            .map(is_enabled_flag)
            .unwrap_or(false)
    }

    /// File the defaults were read from, if any
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }
}

impl PropertySource for DefaultsPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Result<Option<PropertyValue>, SourceError> {
        Ok(PropertyValue::from_map(key, &self.entries).map(|value| {
            value
                .to_builder()
                .meta_defaults([("source", self.name.as_str())])
                .build()
        }))
    }

    fn properties(&self) -> Result<PropertyMap, SourceError> {
        Ok(self.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_first_match_wins() {
        let empty = TempDir::new().unwrap();
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(first.path().join(DEFAULTS_FILE), "app.name=first\n").unwrap();
        std::fs::write(second.path().join(DEFAULTS_FILE), "app.name=second\n").unwrap();

        let source = DefaultsPropertySource::load(&[empty.path(), first.path(), second.path()]);
        assert_eq!(source.origin(), Some(first.path().join(DEFAULTS_FILE).as_path()));
        assert_eq!(
            source.get("app.name").unwrap().unwrap().value(),
            Some("first")
        );
        assert_eq!(source.ordinal(), DEFAULTS_ORDINAL);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let source = DefaultsPropertySource::load(&[dir.path()]);
        assert!(source.origin().is_none());
        assert!(source.properties().unwrap().is_empty());
    }

    #[test]
    #[serial]
    fn test_disable_switch() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEFAULTS_FILE), "a=1\n").unwrap();

        system_properties::set(DISABLE_KEY, "true");
        let source = DefaultsPropertySource::load(&[dir.path()]);
        system_properties::remove(DISABLE_KEY);

        assert!(source.properties().unwrap().is_empty());
    }
}
