//! Combination policies merging the contributions of successive property sources

use crate::{
    is_meta_key, meta_key, ConfigError, Configuration, PropertyMap, PropertySource,
    PropertyValue, Result,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Meta-key suffix selecting the combination policy of a key
pub const POLICY_SUFFIX: &str = "combination-policy";

/// Meta-key suffix holding the item separator of a key
pub const ITEM_SEPARATOR_SUFFIX: &str = "item-separator";

pub const DEFAULT_ITEM_SEPARATOR: &str = ",";

/// Merges one source's contribution for `key` into the accumulated raw map
///
/// Called once per source in registration order. The accumulated map holds the key and its
/// `_key.<suffix>` meta rows; `None` means no value so far.
pub trait CombinationPolicy: Send + Sync {
    fn collect(
        &self,
        current: Option<PropertyMap>,
        key: &str,
        source: &dyn PropertySource,
        configuration: &Configuration,
    ) -> Option<PropertyMap>;
}

/// Read `key` from `source`, logging and swallowing source failures
///
/// An absent value is kept when it carries meta entries, such as the `source` entry of a
/// disabled source.
pub(crate) fn lookup(source: &dyn PropertySource, key: &str) -> Option<PropertyValue> {
    match source.get(key) {
        Ok(Some(value)) if value.is_present() || !value.meta_entries().is_empty() => Some(value),
        Ok(_) => None,
        Err(e) => {
            error!(
                "Error reading key {} from property source {}: {}",
                key,
                source.name(),
                e
            );
            None
        }
    }
}

/// Merge an absent value: its meta rows are only kept while no source has provided `key`
fn carry_meta(
    current: Option<PropertyMap>,
    key: &str,
    absent: &PropertyValue,
) -> Option<PropertyMap> {
    match current {
        Some(map) if map.contains_key(key) => Some(map),
        _ => Some(absent.to_map()),
    }
}

/// Default policy: a source providing the key replaces the accumulated entry entirely
#[derive(Debug, Clone, Copy, Default)]
pub struct OverridingPolicy;

impl CombinationPolicy for OverridingPolicy {
    fn collect(
        &self,
        current: Option<PropertyMap>,
        key: &str,
        source: &dyn PropertySource,
        _configuration: &Configuration,
    ) -> Option<PropertyMap> {
        match lookup(source, key) {
            Some(value) if value.is_present() => Some(value.to_map()),
            Some(absent) => carry_meta(current, key, &absent),
            None => current,
        }
    }
}

/// Concatenates the values of all sources providing the key
#[derive(Debug, Clone)]
pub struct CollectingPolicy {
    separator: String,
}

impl CollectingPolicy {
    /// Join values with `separator`
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl Default for CollectingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ITEM_SEPARATOR)
    }
}

impl CombinationPolicy for CollectingPolicy {
    fn collect(
        &self,
        current: Option<PropertyMap>,
        key: &str,
        source: &dyn PropertySource,
        _configuration: &Configuration,
    ) -> Option<PropertyMap> {
        let Some(value) = lookup(source, key) else {
            return current;
        };
        if !value.is_present() {
            return carry_meta(current, key, &value);
        }
        let mut collected = value.to_map();

        if let (Some(existing), Some(added)) =
            (current.as_ref().and_then(|m| m.get(key)), value.value())
        {
            collected.insert(
                key.to_string(),
                format!("{existing}{}{added}", self.separator),
            );
        }

        Some(collected)
    }
}

/// Factory producing a combination policy registered under a symbolic name
pub type PolicyFactory = Arc<dyn Fn() -> Arc<dyn CombinationPolicy> + Send + Sync>;

/// Named combination policies, populated at startup
#[derive(Clone)]
pub struct PolicyRegistry {
    factories: HashMap<String, PolicyFactory>,
}

impl PolicyRegistry {
    /// Registry without any entries
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the built-in `override` and `collect` policies
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("override", Arc::new(|| Arc::new(OverridingPolicy)));
        registry.register("collect", Arc::new(|| Arc::new(CollectingPolicy::default())));
        registry
    }

    /// Register `factory` under `name`, replacing an earlier registration
    pub fn register(&mut self, name: impl Into<String>, factory: PolicyFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Whether a policy is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the policy registered under `name`
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn CombinationPolicy>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownPolicy(name.to_string()))
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Chooses the policy per key from its `_key.combination-policy` meta entry
///
/// Meta-keys always use override semantics, so resolving the selector key never recurses.
pub struct AdaptivePolicy {
    registry: PolicyRegistry,
    cache: DashMap<String, Arc<dyn CombinationPolicy>>,
}

impl AdaptivePolicy {
    /// Resolve named policies from `registry`, instantiating each name once
    pub fn new(registry: PolicyRegistry) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
        }
    }

    fn named_policy(&self, name: &str) -> Option<Arc<dyn CombinationPolicy>> {
        if let Some(policy) = self.cache.get(name) {
            return Some(Arc::clone(policy.value()));
        }

        match self.registry.resolve(name) {
            Ok(policy) => {
                let cached = self.cache.entry(name.to_string()).or_insert(policy);
                Some(Arc::clone(cached.value()))
            }
            Err(e) => {
                error!("{}, falling back to overriding policy", e);
                None
            }
        }
    }
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self::new(PolicyRegistry::with_defaults())
    }
}

impl CombinationPolicy for AdaptivePolicy {
    fn collect(
        &self,
        current: Option<PropertyMap>,
        key: &str,
        source: &dyn PropertySource,
        configuration: &Configuration,
    ) -> Option<PropertyMap> {
        if is_meta_key(key) {
            return OverridingPolicy.collect(current, key, source, configuration);
        }

        let selector = configuration.get(&meta_key(key, POLICY_SUFFIX));
        match selector.as_deref().map(str::trim) {
            None | Some("") | Some("override") => {
                OverridingPolicy.collect(current, key, source, configuration)
            }
            Some("collect") => {
                let separator = configuration
                    .get(&meta_key(key, ITEM_SEPARATOR_SUFFIX))
                    .unwrap_or_else(|| DEFAULT_ITEM_SEPARATOR.to_string());
                CollectingPolicy::new(separator).collect(current, key, source, configuration)
            }
            Some(name) => {
                debug!("Using combination policy {} for key {}", name, key);
                match self.named_policy(name) {
                    Some(policy) => policy.collect(current, key, source, configuration),
                    None => OverridingPolicy.collect(current, key, source, configuration),
                }
            }
        }
    }
}
