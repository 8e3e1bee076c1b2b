//! Resolved property values and their meta entries

use std::collections::{BTreeMap, HashMap};

/// Raw key/value entries as produced by sources and combination policies
pub type PropertyMap = HashMap<String, String>;

/// Build the meta-key `_<key>.<suffix>` carrying metadata about `key`
pub fn meta_key(key: &str, suffix: &str) -> String {
    format!("_{key}.{suffix}")
}

/// Meta-keys start with an underscore
pub fn is_meta_key(key: &str) -> bool {
    key.starts_with('_')
}

/// One resolved configuration entry
///
/// The value may be absent while meta entries are still populated, e.g. a disabled source
/// reporting itself through the `source` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    key: String,
    value: Option<String>,
    meta: BTreeMap<String, String>,
}

impl PropertyValue {
    /// Create a value with no meta entries
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::builder(key).value(value).build()
    }

    /// Create an entry without a value
    pub fn absent(key: impl Into<String>) -> Self {
        Self::builder(key).build()
    }

    pub fn builder(key: impl Into<String>) -> PropertyValueBuilder {
        PropertyValueBuilder {
            key: key.into(),
            value: None,
            meta: BTreeMap::new(),
        }
    }

    /// Build the value for `key` from a raw map, merging matching `_key.<suffix>` rows
    ///
    /// Returns `None` when the map holds neither the key nor any meta row for it.
    pub fn from_map(key: &str, map: &PropertyMap) -> Option<Self> {
        let prefix = format!("_{key}.");
        let meta: BTreeMap<String, String> = map
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .filter(|suffix| !suffix.is_empty())
                    .map(|suffix| (suffix.to_string(), v.clone()))
            })
            .collect();
        let value = map.get(key).cloned();

        if value.is_none() && meta.is_empty() {
            return None;
        }

        Some(Self {
            key: key.to_string(),
            value,
            meta,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    pub fn meta_entries(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    pub fn meta_entry(&self, suffix: &str) -> Option<&str> {
        self.meta.get(suffix).map(String::as_str)
    }

    /// Name of the source this value originates from, if recorded
    pub fn source(&self) -> Option<&str> {
        self.meta_entry("source")
    }

    /// Render the value and its meta entries as raw map rows
    pub fn to_map(&self) -> PropertyMap {
        let mut map = PropertyMap::with_capacity(self.meta.len() + 1);
        if let Some(value) = &self.value {
            map.insert(self.key.clone(), value.clone());
        }
        for (suffix, value) in &self.meta {
            map.insert(meta_key(&self.key, suffix), value.clone());
        }
        map
    }

    pub fn to_builder(&self) -> PropertyValueBuilder {
        PropertyValueBuilder {
            key: self.key.clone(),
            value: self.value.clone(),
            meta: self.meta.clone(),
        }
    }
}

/// Builder for [`PropertyValue`]
#[derive(Debug, Clone)]
pub struct PropertyValueBuilder {
    key: String,
    value: Option<String>,
    meta: BTreeMap<String, String>,
}

impl PropertyValueBuilder {
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn meta(mut self, suffix: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(suffix.into(), value.into());
        self
    }

    /// Add meta entries, keeping existing ones with the same suffix
    pub fn meta_defaults<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in entries {
            self.meta.entry(k.into()).or_insert_with(|| v.into());
        }
        self
    }

    pub fn source(self, name: impl Into<String>) -> Self {
        self.meta("source", name)
    }

    pub fn build(self) -> PropertyValue {
        PropertyValue {
            key: self.key,
            value: self.value,
            meta: self.meta,
        }
    }
}
