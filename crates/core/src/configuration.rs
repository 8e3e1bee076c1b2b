//! The `Configuration` facade

use crate::convert::convert_value;
use crate::filter::{apply_filter, apply_filters};
use crate::{
    is_meta_key, ConfigurationContext, MapPropertySource, PropertyMap, PropertySource, PropertyValue, Result,
    TypeDescriptor,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{error, trace};

/// Read access to configuration resolved from a [`ConfigurationContext`]
///
/// Cheap to clone; clones share the same context.
#[derive(Clone)]
pub struct Configuration {
    context: Arc<ConfigurationContext>,
}

impl Configuration {
    pub fn new(context: ConfigurationContext) -> Self {
        Self::from_arc(Arc::new(context))
    }

    pub fn from_arc(context: Arc<ConfigurationContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ConfigurationContext {
        &self.context
    }

    pub fn shared_context(&self) -> Arc<ConfigurationContext> {
        Arc::clone(&self.context)
    }

    /// Walk all sources in registration order through the combination policy
    pub(crate) fn evaluate_raw(&self, key: &str) -> Option<PropertyMap> {
        let policy = self.context.combination_policy();
        self.context
            .property_sources()
            .iter()
            .fold(None, |current, source| {
                policy.collect(current, key, source.as_ref(), self)
            })
    }

    /// Resolved and filtered value of `key`, `None` when absent or filtered out
    pub fn get(&self, key: &str) -> Option<String> {
        let raw = self.evaluate_raw(key)?;
        apply_filter(
            key,
            raw.get(key).map(String::as_str),
            &raw,
            self.context.property_filters(),
        )
    }

    pub fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Resolved value of `key` together with the meta entries of the winning source(s)
    ///
    /// When no source has a value but one reported meta entries, e.g. a disabled source naming
    /// itself, an absent value carrying those entries is returned.
    pub fn get_value(&self, key: &str) -> Option<PropertyValue> {
        let raw = self.evaluate_raw(key)?;
        let Some(value) = raw.get(key) else {
            return PropertyValue::from_map(key, &raw);
        };
        let filtered = apply_filter(
            key,
            Some(value.as_str()),
            &raw,
            self.context.property_filters(),
        )?;
        let mut builder = PropertyValue::builder(key).value(filtered);
        if let Some(resolved) = PropertyValue::from_map(key, &raw) {
            for (suffix, value) in resolved.meta_entries() {
                builder = builder.meta(suffix.as_str(), value.as_str());
            }
        }
        Some(builder.build())
    }

    /// Meta entries of `key`, empty when no source reported any
    pub fn meta_entries(&self, key: &str) -> BTreeMap<String, String> {
        self.get_value(key)
            .map(|value| value.meta_entries().clone())
            .unwrap_or_default()
    }

    /// Resolve `key` and convert it to `T`
    ///
    /// Returns `Ok(None)` for an absent key and [`crate::ConfigError::Conversion`] when the key
    /// is present but no converter accepts its value.
    pub fn get_as<T: 'static>(&self, key: &str) -> Result<Option<T>> {
        self.get_with_type(key, &TypeDescriptor::of::<T>())
    }

    /// Like [`Self::get_as`] with an explicit descriptor, e.g. one carrying type parameters
    pub fn get_with_type<T: 'static>(&self, key: &str, target: &TypeDescriptor) -> Result<Option<T>> {
        let value = self.get(key);
        convert_value(self, key, value.as_deref(), target)
    }

    pub fn get_as_or_default<T: 'static>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get_as(key)?.unwrap_or(default))
    }

    /// All resolved and filtered entries, including the meta rows of each winning value
    ///
    /// Every source is read once, starting with the most significant one; a source failing to
    /// produce its entries is logged and skipped. Each key is then combined over the snapshots
    /// in registration order, so the result agrees with [`Self::get_value`] for every key. Meta
    /// rows of a key are taken from the combined result of that key only; rows whose key has no
    /// value anywhere are combined on their own.
    pub fn properties(&self) -> PropertyMap {
        let sources = self.context.property_sources();
        let mut snapshots = Vec::with_capacity(sources.len());
        for source in sources.iter().rev() {
            match source.properties() {
                Ok(entries) => snapshots.push(MapPropertySource::new(source.name(), entries)),
                Err(e) => error!(
                    "Error evaluating properties of property source {}, ignoring it: {}",
                    source.name(),
                    e
                ),
            }
        }
        snapshots.reverse();

        let keys: BTreeSet<&str> = snapshots
            .iter()
            .flat_map(|s| s.entries().keys())
            .map(String::as_str)
            .collect();
        let (meta, ordinary): (BTreeSet<&str>, BTreeSet<&str>) =
            keys.into_iter().partition(|key| is_meta_key(key));
        let policy = self.context.combination_policy();
        let combine = |key: &str| {
            snapshots.iter().fold(None, |current, snapshot| {
                policy.collect(current, key, snapshot as &dyn PropertySource, self)
            })
        };

        let mut raw = PropertyMap::with_capacity(ordinary.len() + meta.len());
        for key in &ordinary {
            // the winner's meta rows travel with the value
            if let Some(combined) = combine(*key).filter(|map| map.contains_key(*key)) {
                raw.extend(combined);
            }
        }
        for key in meta.iter().filter(|key| !owned_by(key, &ordinary)) {
            if let Some(value) = combine(*key).and_then(|mut map| map.remove(*key)) {
                raw.insert(key.to_string(), value);
            }
        }
        trace!("Evaluated {} raw properties", raw.len());

        apply_filters(raw, self.context.property_filters())
    }

    /// Apply an operator producing a derived configuration
    pub fn with<F>(&self, operator: F) -> Configuration
    where
        F: FnOnce(&Configuration) -> Configuration,
    {
        operator(self)
    }

    /// Run a query against this configuration
    pub fn query<R, F>(&self, query: F) -> R
    where
        F: FnOnce(&Configuration) -> R,
    {
        query(self)
    }
}

/// Whether `meta` is a `_key.suffix` row of one of the `ordinary` keys
fn owned_by(meta: &str, ordinary: &BTreeSet<&str>) -> bool {
    let Some(rest) = meta.strip_prefix('_') else {
        return false;
    };
    rest.match_indices('.')
        .any(|(index, _)| ordinary.contains(&rest[..index]))
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("context", &self.context)
            .finish()
    }
}
