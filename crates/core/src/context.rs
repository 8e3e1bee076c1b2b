//! Registry of sources, filters, converters and the combination policy

use crate::convert::{
    BoolConverter, CharConverter, ConversionContext, ConverterEntry, ConverterRegistry, DecimalConverter,
    DurationConverter, EntriesConverter, FloatConverter, IntegerConverter, ItemsConverter,
    NumberConverter, PathConverter, PropertyConverter, StringConverter,
};
use crate::filter::{sort_filters, FilterRegistration};
use crate::{
    AdaptivePolicy, CombinationPolicy, OverridingPolicy, PolicyFactory, PolicyRegistry,
    PropertyFilter, PropertySource, Result, TypeDescriptor,
};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, warn};

/// Priority of the built-in converters; user converters registered with a higher value win
pub const BUILTIN_CONVERTER_PRIORITY: i32 = -100;

/// The immutable set of components a [`crate::Configuration`] evaluates against
///
/// Built through [`ConfigurationContextBuilder`]; use [`ConfigurationContext::to_builder`] to
/// derive a modified copy.
#[derive(Clone)]
pub struct ConfigurationContext {
    sources: Vec<Arc<dyn PropertySource>>,
    filters: Vec<FilterRegistration>,
    converters: ConverterRegistry,
    policy: Arc<dyn CombinationPolicy>,
    policies: PolicyRegistry,
}

impl ConfigurationContext {
    pub fn builder() -> ConfigurationContextBuilder {
        ConfigurationContextBuilder::new()
    }

    /// Sources in significance order, the last one overrides the others
    pub fn property_sources(&self) -> &[Arc<dyn PropertySource>] {
        &self.sources
    }

    pub fn property_source(&self, name: &str) -> Option<&Arc<dyn PropertySource>> {
        self.sources.iter().find(|s| s.name() == name)
    }

    /// Filters in execution order
    pub fn property_filters(&self) -> &[FilterRegistration] {
        &self.filters
    }

    /// Converters applicable to `target`, highest priority first
    pub fn converters_for(&self, target: &TypeDescriptor) -> &[ConverterEntry] {
        self.converters.converters_for(target)
    }

    /// All directly registered converters by target type
    pub fn property_converters(&self) -> &HashMap<TypeDescriptor, Vec<ConverterEntry>> {
        self.converters.exact()
    }

    pub fn named_converter(&self, name: &str) -> Option<&ConverterEntry> {
        self.converters.named(name)
    }

    pub fn combination_policy(&self) -> &Arc<dyn CombinationPolicy> {
        &self.policy
    }

    pub fn policy_registry(&self) -> &PolicyRegistry {
        &self.policies
    }

    pub fn to_builder(&self) -> ConfigurationContextBuilder {
        ConfigurationContextBuilder {
            sources: self.sources.clone(),
            filters: self.filters.clone(),
            converters: self.converters.clone(),
            policy: Arc::clone(&self.policy),
            policies: self.policies.clone(),
        }
    }
}

impl fmt::Debug for ConfigurationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<_> = self.sources.iter().map(|s| s.name().to_string()).collect();
        f.debug_struct("ConfigurationContext")
            .field("sources", &sources)
            .field("filters", &self.filters.len())
            .field("converter_types", &self.converters.exact().len())
            .finish()
    }
}

/// Assembles a [`ConfigurationContext`]
#[derive(Clone)]
pub struct ConfigurationContextBuilder {
    sources: Vec<Arc<dyn PropertySource>>,
    filters: Vec<FilterRegistration>,
    converters: ConverterRegistry,
    policy: Arc<dyn CombinationPolicy>,
    policies: PolicyRegistry,
}

impl ConfigurationContextBuilder {
    /// Empty builder using the overriding policy and the built-in policy names
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            filters: Vec::new(),
            converters: ConverterRegistry::default(),
            policy: Arc::new(OverridingPolicy),
            policies: PolicyRegistry::with_defaults(),
        }
    }

    /// Append a source; sources added later override earlier ones
    ///
    /// A source whose name is already registered is ignored.
    pub fn add_property_source<S>(self, source: S) -> Self
    where
        S: PropertySource + 'static,
    {
        self.add_shared_property_source(Arc::new(source))
    }

    /// Append a source already shared elsewhere; duplicate names are ignored
    pub fn add_shared_property_source(mut self, source: Arc<dyn PropertySource>) -> Self {
        if self.sources.iter().any(|s| s.name() == source.name()) {
            warn!("Property source {} already registered, ignoring", source.name());
            return self;
        }
        debug!("Adding property source {}", source.name());
        self.sources.push(source);
        self
    }

    /// Append several sources in iteration order
    pub fn add_property_sources<I>(self, sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PropertySource>>,
    {
        sources
            .into_iter()
            .fold(self, |builder, source| builder.add_shared_property_source(source))
    }

    /// Drop the source registered under `name`, if any
    pub fn remove_property_source(mut self, name: &str) -> Self {
        self.sources.retain(|s| s.name() != name);
        self
    }

    /// Drop all sources
    pub fn remove_property_sources(mut self) -> Self {
        self.sources.clear();
        self
    }

    /// Move a source one step towards the end, making it more significant
    pub fn increase_priority(mut self, name: &str) -> Self {
        if let Some(index) = self.sources.iter().position(|s| s.name() == name) {
            if index + 1 < self.sources.len() {
                self.sources.swap(index, index + 1);
            }
        }
        self
    }

    /// Move a source one step towards the front, making it less significant
    pub fn decrease_priority(mut self, name: &str) -> Self {
        if let Some(index) = self.sources.iter().position(|s| s.name() == name) {
            if index > 0 {
                self.sources.swap(index, index - 1);
            }
        }
        self
    }

    /// Order sources by ascending ordinal, keeping registration order for equal ordinals
    pub fn sort_property_sources_by_ordinal(mut self) -> Self {
        self.sources.sort_by_key(|s| s.ordinal());
        self
    }

    /// Sources in their current order, least significant first
    pub fn property_sources(&self) -> &[Arc<dyn PropertySource>] {
        &self.sources
    }

    /// Append a filter that runs in registration order
    pub fn add_property_filter<F>(self, filter: F) -> Self
    where
        F: PropertyFilter + 'static,
    {
        self.add_filter_registration(FilterRegistration::new(Arc::new(filter), None))
    }

    /// Append a filter with an explicit priority; higher priorities run first
    pub fn add_prioritized_filter<F>(self, filter: F, priority: i32) -> Self
    where
        F: PropertyFilter + 'static,
    {
        self.add_filter_registration(FilterRegistration::new(Arc::new(filter), Some(priority)))
    }

    /// Append a prepared registration
    pub fn add_filter_registration(mut self, registration: FilterRegistration) -> Self {
        self.filters.push(registration);
        self
    }

    /// Drop all filters
    pub fn remove_property_filters(mut self) -> Self {
        self.filters.clear();
        self
    }

    /// Register `converter` for `T`; higher priorities are tried first
    pub fn add_converter<T, C>(mut self, name: &str, priority: i32, converter: C) -> Self
    where
        T: 'static,
        C: PropertyConverter<T> + 'static,
    {
        self.converters
            .add(ConverterEntry::new::<T, C>(name, priority, converter));
        self
    }

    /// Register a closure as converter for `T`
    pub fn add_converter_fn<T, F>(self, name: &str, priority: i32, converter: F) -> Self
    where
        T: 'static,
        F: Fn(&str, &mut ConversionContext<'_>) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    {
        self.add_converter::<T, F>(name, priority, converter)
    }

    /// Register a converter whose target type is carried by the entry
    pub fn add_erased_converter(mut self, entry: ConverterEntry) -> Self {
        self.converters.add(entry);
        self
    }

    /// Register a converter selectable through a key's `item-converter` meta entry
    pub fn add_named_converter<T, C>(mut self, name: &str, converter: C) -> Self
    where
        T: 'static,
        C: PropertyConverter<T> + 'static,
    {
        self.converters
            .add_named(name, ConverterEntry::new::<T, C>(name, 0, converter));
        self
    }

    /// Drop every converter registered for `T`
    pub fn remove_converters<T: 'static>(mut self) -> Self {
        self.converters.remove_all(&TypeDescriptor::of::<T>());
        self
    }

    /// Declare types whose converters serve `T` when it has none of its own, in lookup order
    pub fn declare_supertypes<T: 'static>(mut self, supertypes: Vec<TypeDescriptor>) -> Self {
        self.converters
            .declare_supertypes(TypeDescriptor::of::<T>(), supertypes);
        self
    }

    /// Declare interface-like types consulted after supertypes, in lookup order
    pub fn declare_interfaces<T: 'static>(mut self, interfaces: Vec<TypeDescriptor>) -> Self {
        self.converters
            .declare_interfaces(TypeDescriptor::of::<T>(), interfaces);
        self
    }

    /// Register list and set converters for element type `T`
    pub fn add_collection_converters<T>(self) -> Self
    where
        T: Eq + Hash + Ord + 'static,
    {
        self.add_list_converter::<T>()
            .add_converter::<HashSet<T>, _>(
                "HashSetConverter",
                BUILTIN_CONVERTER_PRIORITY,
                ItemsConverter::<HashSet<T>, T>::new(),
            )
            .add_converter::<BTreeSet<T>, _>(
                "BTreeSetConverter",
                BUILTIN_CONVERTER_PRIORITY,
                ItemsConverter::<BTreeSet<T>, T>::new(),
            )
    }

    /// Register a `Vec<T>` converter
    pub fn add_list_converter<T: 'static>(self) -> Self {
        self.add_converter::<Vec<T>, _>(
            "VecConverter",
            BUILTIN_CONVERTER_PRIORITY,
            ItemsConverter::<Vec<T>, T>::new(),
        )
    }

    /// Register `HashMap`, `BTreeMap` and `DashMap` converters for `K`/`V`
    pub fn add_map_converters<K, V>(self) -> Self
    where
        K: Eq + Hash + Ord + 'static,
        V: 'static,
    {
        self.add_converter::<HashMap<K, V>, _>(
            "HashMapConverter",
            BUILTIN_CONVERTER_PRIORITY,
            EntriesConverter::<HashMap<K, V>, K, V>::new(),
        )
        .add_converter::<BTreeMap<K, V>, _>(
            "BTreeMapConverter",
            BUILTIN_CONVERTER_PRIORITY,
            EntriesConverter::<BTreeMap<K, V>, K, V>::new(),
        )
        .add_converter::<DashMap<K, V>, _>(
            "DashMapConverter",
            BUILTIN_CONVERTER_PRIORITY,
            EntriesConverter::<DashMap<K, V>, K, V>::new(),
        )
    }

    /// Register the built-in scalar converters and collections of every built-in element type
    pub fn add_default_converters(self) -> Self {
        let p = BUILTIN_CONVERTER_PRIORITY;
        self.add_converter::<bool, _>("BoolConverter", p, BoolConverter)
            .add_converter::<i8, _>("IntegerConverter", p, IntegerConverter::<i8>::new())
            .add_converter::<i16, _>("IntegerConverter", p, IntegerConverter::<i16>::new())
            .add_converter::<i32, _>("IntegerConverter", p, IntegerConverter::<i32>::new())
            .add_converter::<i64, _>("IntegerConverter", p, IntegerConverter::<i64>::new())
            .add_converter::<i128, _>("IntegerConverter", p, IntegerConverter::<i128>::new())
            .add_converter::<isize, _>("IntegerConverter", p, IntegerConverter::<isize>::new())
            .add_converter::<u8, _>("IntegerConverter", p, IntegerConverter::<u8>::new())
            .add_converter::<u16, _>("IntegerConverter", p, IntegerConverter::<u16>::new())
            .add_converter::<u32, _>("IntegerConverter", p, IntegerConverter::<u32>::new())
            .add_converter::<u64, _>("IntegerConverter", p, IntegerConverter::<u64>::new())
            .add_converter::<usize, _>("IntegerConverter", p, IntegerConverter::<usize>::new())
            .add_converter::<f32, _>("FloatConverter", p, FloatConverter::<f32>::new())
            .add_converter::<f64, _>("FloatConverter", p, FloatConverter::<f64>::new())
            .add_converter::<char, _>("CharConverter", p, CharConverter)
            .add_converter::<String, _>("StringConverter", p, StringConverter)
            .add_converter::<std::path::PathBuf, _>("PathConverter", p, PathConverter)
            .add_converter::<std::time::Duration, _>("DurationConverter", p, DurationConverter)
            .add_converter::<rust_decimal::Decimal, _>("DecimalConverter", p, DecimalConverter)
            .add_converter::<crate::convert::Number, _>("NumberConverter", p, NumberConverter)
            .add_collection_converters::<bool>()
            .add_collection_converters::<i8>()
            .add_collection_converters::<i16>()
            .add_collection_converters::<i32>()
            .add_collection_converters::<i64>()
            .add_collection_converters::<i128>()
            .add_collection_converters::<isize>()
            .add_collection_converters::<u8>()
            .add_collection_converters::<u16>()
            .add_collection_converters::<u32>()
            .add_collection_converters::<u64>()
            .add_collection_converters::<usize>()
            .add_collection_converters::<char>()
            .add_collection_converters::<String>()
            .add_collection_converters::<std::path::PathBuf>()
            .add_collection_converters::<std::time::Duration>()
            .add_collection_converters::<rust_decimal::Decimal>()
            // floats have no total order, so lists only
            .add_list_converter::<f32>()
            .add_list_converter::<f64>()
            .add_list_converter::<crate::convert::Number>()
            .add_map_converters::<String, String>()
            .add_map_converters::<String, i64>()
            .add_map_converters::<String, bool>()
    }

    /// Replace the combination policy
    pub fn set_combination_policy(mut self, policy: Arc<dyn CombinationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Make a named policy available to [`Self::use_policy`] and the adaptive policy
    pub fn register_policy(mut self, name: &str, factory: PolicyFactory) -> Self {
        self.policies.register(name, factory);
        self
    }

    /// Select a registered policy by name
    pub fn use_policy(mut self, name: &str) -> Result<Self> {
        self.policy = self.policies.resolve(name)?;
        Ok(self)
    }

    /// Select the policy per key through `_key.combination-policy` meta entries
    pub fn use_adaptive_policy(mut self) -> Self {
        self.policy = Arc::new(AdaptivePolicy::new(self.policies.clone()));
        self
    }

    /// Freeze the builder, sorting filters and resolving the converter lookup order
    pub fn build(mut self) -> ConfigurationContext {
        sort_filters(&mut self.filters);
        self.converters.resolve_all();
        ConfigurationContext {
            sources: self.sources,
            filters: self.filters,
            converters: self.converters,
            policy: self.policy,
            policies: self.policies,
        }
    }
}

impl Default for ConfigurationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
