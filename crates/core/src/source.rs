//! Property source contract

use crate::{PropertyMap, PropertyValue, SourceError};
use tracing::warn;

/// Entry a source may carry to override its default ordinal
pub const ORDINAL_KEY: &str = "tamaya.ordinal";

/// A named, prioritized provider of raw configuration entries
///
/// Implementations may block (files, network) and may fail; the pipeline logs failures and
/// treats the source as contributing nothing for that resolution.
pub trait PropertySource: Send + Sync {
    /// Unique, human-readable name
    fn name(&self) -> &str;

    /// Ordinal used when no `tamaya.ordinal` entry is present
    fn default_ordinal(&self) -> i32 {
        0
    }

    /// Priority of this source, higher is more significant when sources are sorted
    fn ordinal(&self) -> i32 {
        match self.get(ORDINAL_KEY) {
            Ok(Some(value)) => match value.value().map(|v| v.trim().parse::<i32>()) {
                Some(Ok(ordinal)) => ordinal,
                Some(Err(_)) => {
                    warn!(
                        "Invalid {} value in property source {}, using default ordinal",
                        ORDINAL_KEY,
                        self.name()
                    );
                    self.default_ordinal()
                }
                None => self.default_ordinal(),
            },
            _ => self.default_ordinal(),
        }
    }

    /// Look up a single entry including its meta entries
    fn get(&self, key: &str) -> Result<Option<PropertyValue>, SourceError>;

    /// All entries, including any `_key.<suffix>` meta rows
    fn properties(&self) -> Result<PropertyMap, SourceError>;

    /// Whether `properties()` returns the complete data set
    fn is_scannable(&self) -> bool {
        true
    }
}

/// In-memory property source
#[derive(Debug, Clone)]
pub struct MapPropertySource {
    name: String,
    ordinal: i32,
    entries: PropertyMap,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>, entries: PropertyMap) -> Self {
        Self {
            name: name.into(),
            ordinal: 0,
            entries,
        }
    }

    /// Build a source from key/value pairs
    pub fn from_pairs<I, K, V>(name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            name,
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn entries(&self) -> &PropertyMap {
        &self.entries
    }
}

impl PropertySource for MapPropertySource {
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

    #[test]
    fn test_map_source_get_records_origin() {
        let source = MapPropertySource::from_pairs("test", [("a", "1")]);

        let value = source.get("a").unwrap().unwrap();
        assert_eq!(value.value(), Some("1"));
        assert_eq!(value.source(), Some("test"));
        assert!(source.get("b").unwrap().is_none());
    }

    #[test]
    fn test_ordinal_from_entries() {
        let source =
            MapPropertySource::from_pairs("test", [(ORDINAL_KEY, " 250 ")]).with_ordinal(10);
        assert_eq!(source.ordinal(), 250);
    }

    #[test]
    fn test_invalid_ordinal_falls_back() {
        let source =
            MapPropertySource::from_pairs("test", [(ORDINAL_KEY, "high")]).with_ordinal(10);
        assert_eq!(source.ordinal(), 10);

        let plain = MapPropertySource::from_pairs("plain", [("x", "y")]).with_ordinal(7);
        assert_eq!(plain.ordinal(), 7);
    }
}
