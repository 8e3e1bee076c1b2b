//! Type conversion of resolved values
//!
//! Converters are registered per target type with a priority. A lookup tries every converter
//! for the requested type, highest priority first, and accepts the first non-`None` result.
//! When a type has no converters of its own, converters registered for its declared
//! supertypes and then its declared interfaces are consulted.

mod collections;
mod scalar;

pub use collections::{
    split_items, split_map_entry, EntriesConverter, ItemsConverter, DEFAULT_MAP_ENTRY_SEPARATOR,
    ITEM_CONVERTER_SUFFIX, MAP_ENTRY_SEPARATOR_SUFFIX,
};
pub use scalar::{
    decode_integer, BoolConverter, CharConverter, DecimalConverter, DecodeFloat, DecodeInteger,
    DurationConverter, EnumConverter, FloatConverter, IntegerConverter, Number, NumberConverter,
    PathConverter, StringConverter,
};

use crate::{ConfigError, Configuration, ConfigurationContext, Result, TypeDescriptor};
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Converts a raw string into a `T`
///
/// `Ok(None)` means the converter does not handle this value. An `Err` is logged and treated
/// the same way, so the next converter gets its chance.
pub trait PropertyConverter<T>: Send + Sync {
    fn convert(&self, value: &str, context: &mut ConversionContext<'_>)
        -> anyhow::Result<Option<T>>;
}

impl<T, F> PropertyConverter<T> for F
where
    F: Fn(&str, &mut ConversionContext<'_>) -> anyhow::Result<Option<T>> + Send + Sync,
{
    fn convert(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<T>> {
        self(value, context)
    }
}

/// Per-lookup state handed to converters
///
/// Created for each typed lookup; converters append human-readable format descriptions that
/// end up in the conversion error if no converter succeeds.
pub struct ConversionContext<'a> {
    key: &'a str,
    target: TypeDescriptor,
    configuration: &'a Configuration,
    supported_formats: Vec<String>,
}

impl<'a> ConversionContext<'a> {
    pub fn new(key: &'a str, target: TypeDescriptor, configuration: &'a Configuration) -> Self {
        Self {
            key,
            target,
            configuration,
            supported_formats: Vec::new(),
        }
    }

    pub fn key(&self) -> &'a str {
        self.key
    }

    pub fn target_type(&self) -> &TypeDescriptor {
        &self.target
    }

    /// Configuration being evaluated, for looking up sibling keys such as `_key.item-separator`
    pub fn configuration(&self) -> &'a Configuration {
        self.configuration
    }

    pub fn configuration_context(&self) -> &'a ConfigurationContext {
        self.configuration.context()
    }

    /// Record formats understood by `converter`
    pub fn add_supported_formats(&mut self, converter: &str, formats: &[&str]) {
        for format in formats {
            let entry = format!("{format} ({converter})");
            if !self.supported_formats.contains(&entry) {
                self.supported_formats.push(entry);
            }
        }
    }

    pub fn supported_formats(&self) -> &[String] {
        &self.supported_formats
    }

    fn into_supported_formats(self) -> Vec<String> {
        self.supported_formats
    }
}

/// Type-erased converter as stored in the registry
pub trait AnyConverter: Send + Sync {
    fn convert_any(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<Box<dyn Any>>>;
}

struct Typed<T, C> {
    converter: C,
    _target: PhantomData<fn() -> T>,
}

impl<T, C> AnyConverter for Typed<T, C>
where
    T: 'static,
    C: PropertyConverter<T>,
{
    fn convert_any(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<Box<dyn Any>>> {
        Ok(self
            .converter
            .convert(value, context)?
            .map(|v| Box::new(v) as Box<dyn Any>))
    }
}

/// A registered converter with its priority and display name
#[derive(Clone)]
pub struct ConverterEntry {
    name: String,
    target: TypeDescriptor,
    priority: i32,
    converter: Arc<dyn AnyConverter>,
}

impl ConverterEntry {
    pub fn new<T, C>(name: impl Into<String>, priority: i32, converter: C) -> Self
    where
        T: 'static,
        C: PropertyConverter<T> + 'static,
    {
        Self {
            name: name.into(),
            target: TypeDescriptor::of::<T>(),
            priority,
            converter: Arc::new(Typed {
                converter,
                _target: PhantomData,
            }),
        }
    }

    /// Register an already type-erased converter for `target`
    ///
    /// Used for converters serving a declared supertype or interface, which may produce values
    /// of the concrete type being requested.
    pub fn erased(
        name: impl Into<String>,
        target: TypeDescriptor,
        priority: i32,
        converter: Arc<dyn AnyConverter>,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            priority,
            converter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type this converter was registered for
    pub fn target(&self) -> &TypeDescriptor {
        &self.target
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn converter(&self) -> &Arc<dyn AnyConverter> {
        &self.converter
    }
}

#[derive(Clone, Default)]
struct Lineage {
    supertypes: Vec<TypeDescriptor>,
    interfaces: Vec<TypeDescriptor>,
}

/// Converters keyed by target type, with explicitly declared type lineage
#[derive(Clone, Default)]
pub(crate) struct ConverterRegistry {
    exact: HashMap<TypeDescriptor, Vec<ConverterEntry>>,
    lineage: HashMap<TypeDescriptor, Lineage>,
    named: HashMap<String, ConverterEntry>,
    resolved: HashMap<TypeDescriptor, Vec<ConverterEntry>>,
}

impl ConverterRegistry {
    pub(crate) fn add(&mut self, entry: ConverterEntry) {
        let entries = self.exact.entry(entry.target.clone()).or_default();
        entries.push(entry);
        // stable, so equal priorities keep registration order
        entries.sort_by_key(|e| std::cmp::Reverse(e.priority));
        self.resolved.clear();
    }

    pub(crate) fn add_named(&mut self, name: impl Into<String>, entry: ConverterEntry) {
        self.named.insert(name.into(), entry);
    }

    pub(crate) fn remove_all(&mut self, target: &TypeDescriptor) {
        self.exact.remove(target);
        self.resolved.clear();
    }

    pub(crate) fn declare_supertypes(&mut self, ty: TypeDescriptor, supertypes: Vec<TypeDescriptor>) {
        self.lineage.entry(ty).or_default().supertypes.extend(supertypes);
        self.resolved.clear();
    }

    pub(crate) fn declare_interfaces(&mut self, ty: TypeDescriptor, interfaces: Vec<TypeDescriptor>) {
        self.lineage.entry(ty).or_default().interfaces.extend(interfaces);
        self.resolved.clear();
    }

    /// Flatten the lookup table: exact converters, else the first supertype with converters,
    /// else the first interface with converters
    pub(crate) fn resolve_all(&mut self) {
        let mut resolved: HashMap<TypeDescriptor, Vec<ConverterEntry>> = self.exact.clone();
        for (ty, lineage) in &self.lineage {
            if self.exact.contains_key(ty) {
                continue;
            }
            let inherited = lineage
                .supertypes
                .iter()
                .chain(lineage.interfaces.iter())
                .find_map(|parent| self.exact.get(parent).filter(|c| !c.is_empty()));
            if let Some(converters) = inherited {
                resolved.insert(ty.clone(), converters.clone());
            }
        }
        self.resolved = resolved;
    }

    pub(crate) fn converters_for(&self, target: &TypeDescriptor) -> &[ConverterEntry] {
        self.resolved
            .get(target)
            .or_else(|| self.exact.get(target))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn named(&self, name: &str) -> Option<&ConverterEntry> {
        self.named.get(name)
    }

    pub(crate) fn exact(&self) -> &HashMap<TypeDescriptor, Vec<ConverterEntry>> {
        &self.exact
    }
}

/// Try `converters` in order on `value`, returning the first result that is a `T`
fn try_converters<T: 'static>(
    converters: &[ConverterEntry],
    value: &str,
    context: &mut ConversionContext<'_>,
) -> Option<T> {
    for entry in converters {
        match entry.converter.convert_any(value, context) {
            Ok(Some(converted)) => match converted.downcast::<T>() {
                Ok(v) => return Some(*v),
                Err(_) => debug!(
                    "Converter {} produced a value of the wrong type for key {}",
                    entry.name,
                    context.key()
                ),
            },
            Ok(None) => {}
            Err(e) => debug!(
                "Converter {} failed for key {}: {}",
                entry.name,
                context.key(),
                e
            ),
        }
    }
    None
}

/// Convert `value` to `T` with the converters registered for `target`
///
/// An absent value is not an error and yields `Ok(None)` without consulting converters.
pub(crate) fn convert_value<T: 'static>(
    configuration: &Configuration,
    key: &str,
    value: Option<&str>,
    target: &TypeDescriptor,
) -> Result<Option<T>> {
    let Some(value) = value else {
        return Ok(None);
    };

    let converters = configuration.context().converters_for(target);
    let mut context = ConversionContext::new(key, target.clone(), configuration);
    if let Some(converted) = try_converters::<T>(converters, value, &mut context) {
        return Ok(Some(converted));
    }

    Err(ConfigError::Conversion {
        key: key.to_string(),
        target: target.to_string(),
        formats: context.into_supported_formats(),
    })
}

/// Convert one element of a container value
///
/// Tries the converter named by the key's `item-converter` meta entry, then the converters
/// registered for `T`, and finally hands the raw piece over when `T` is `String`.
pub(crate) fn convert_item<T: 'static>(
    item: &str,
    item_converter: Option<&str>,
    parent: &mut ConversionContext<'_>,
) -> Option<T> {
    let configuration = parent.configuration();
    let target = TypeDescriptor::of::<T>();
    let mut context = ConversionContext::new(parent.key(), target.clone(), configuration);

    if let Some(name) = item_converter {
        match configuration.context().named_converter(name) {
            Some(entry) => {
                if let Some(converted) =
                    try_converters::<T>(std::slice::from_ref(entry), item, &mut context)
                {
                    return Some(converted);
                }
            }
            None => debug!("No converter registered under name {}", name),
        }
    }

    let converters = configuration.context().converters_for(&target);
    let converted = try_converters::<T>(converters, item, &mut context).or_else(|| {
        (Box::new(item.to_string()) as Box<dyn Any>)
            .downcast::<T>()
            .ok()
            .map(|v| *v)
    });

    for format in context.into_supported_formats() {
        if !parent.supported_formats.contains(&format) {
            parent.supported_formats.push(format);
        }
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Millis(u64);

    struct DurationLike;

    fn context_with(builder: crate::ConfigurationContextBuilder) -> Configuration {
        Configuration::new(builder.build())
    }

    #[test]
    fn test_priority_orders_converters() {
        let config = context_with(
            crate::ConfigurationContext::builder()
                .add_converter_fn::<i32, _>("low", 1, |_: &str, _: &mut ConversionContext<'_>| {
                    Ok(Some(1))
                })
                .add_converter_fn::<i32, _>("high", 10, |_: &str, _: &mut ConversionContext<'_>| {
                    Ok(Some(10))
                }),
        );

        let names: Vec<_> = config
            .context()
            .converters_for(&TypeDescriptor::of::<i32>())
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["high", "low"]);
        assert_eq!(
            convert_value::<i32>(&config, "k", Some("x"), &TypeDescriptor::of::<i32>()).unwrap(),
            Some(10)
        );
    }

    #[test]
    fn test_failing_converter_falls_through() {
        let config = context_with(
            crate::ConfigurationContext::builder()
                .add_converter_fn::<i32, _>("broken", 10, |_: &str, _: &mut ConversionContext<'_>| {
                    Err(anyhow::anyhow!("broken"))
                })
                .add_converter_fn::<i32, _>("working", 1, |v: &str, _: &mut ConversionContext<'_>| {
                    Ok(v.parse().ok())
                }),
        );

        let target = TypeDescriptor::of::<i32>();
        assert_eq!(
            convert_value::<i32>(&config, "k", Some("7"), &target).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn test_absent_value_skips_conversion() {
        let config = context_with(crate::ConfigurationContext::builder());
        let target = TypeDescriptor::of::<i32>();
        assert_eq!(
            convert_value::<i32>(&config, "k", None, &target).unwrap(),
            None
        );
        assert!(convert_value::<i32>(&config, "k", Some("1"), &target)
            .unwrap_err()
            .is_conversion());
    }

    #[test]
    fn test_lineage_prefers_supertypes_over_interfaces() {
        let config = context_with(
            crate::ConfigurationContext::builder()
                .add_converter_fn::<DurationLike, _>(
                    "interface",
                    0,
                    |_: &str, ctx: &mut ConversionContext<'_>| {
                        // produces whatever concrete type was asked for
                        assert!(ctx.target_type().is::<Millis>());
                        Ok(None)
                    },
                )
                .add_converter_fn::<u64, _>("supertype", 0, |v: &str, _: &mut ConversionContext<'_>| {
                    Ok(v.parse::<u64>().ok())
                })
                .declare_interfaces::<Millis>(vec![TypeDescriptor::of::<DurationLike>()])
                .declare_supertypes::<Millis>(vec![TypeDescriptor::of::<u64>()]),
        );

        let resolved = config
            .context()
            .converters_for(&TypeDescriptor::of::<Millis>());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name(), "supertype");
    }

    struct MillisFromInterface;

    impl AnyConverter for MillisFromInterface {
        fn convert_any(
            &self,
            value: &str,
            ctx: &mut ConversionContext<'_>,
        ) -> anyhow::Result<Option<Box<dyn Any>>> {
            ctx.add_supported_formats("MillisFromInterface", &["<n>ms"]);
            if !ctx.target_type().is::<Millis>() {
                return Ok(None);
            }
            let Some(n) = value.strip_suffix("ms") else {
                return Ok(None);
            };
            Ok(Some(Box::new(Millis(n.parse()?))))
        }
    }

    #[test]
    fn test_interface_converter_builds_target() {
        let config = context_with(
            crate::ConfigurationContext::builder()
                .add_erased_converter(ConverterEntry::erased(
                    "MillisFromInterface",
                    TypeDescriptor::of::<DurationLike>(),
                    0,
                    Arc::new(MillisFromInterface),
                ))
                .declare_interfaces::<Millis>(vec![TypeDescriptor::of::<DurationLike>()]),
        );

        let target = TypeDescriptor::of::<Millis>();
        assert_eq!(
            convert_value::<Millis>(&config, "k", Some("250ms"), &target).unwrap(),
            Some(Millis(250))
        );

        let err = convert_value::<Millis>(&config, "k", Some("soon"), &target).unwrap_err();
        assert!(err.to_string().contains("<n>ms (MillisFromInterface)"));

        // asked for something else, the interface converter declines
        let other = TypeDescriptor::of::<DurationLike>();
        assert!(convert_value::<DurationLike>(&config, "k", Some("250ms"), &other).is_err());
    }
}
