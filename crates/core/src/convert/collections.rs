//! Converters for list, set and map containers
//!
//! Values are split into items on a per-key separator (`_key.item-separator`, default `,`);
//! a backslash-escaped separator is kept literally. Map items are further split into key and
//! value on `_key.map-entry-separator` (default `::`). Each piece is converted with the
//! converters of the element type.

use super::{convert_item, ConversionContext, PropertyConverter};
use crate::policy::{DEFAULT_ITEM_SEPARATOR, ITEM_SEPARATOR_SUFFIX};
use crate::meta_key;
use std::marker::PhantomData;

pub const MAP_ENTRY_SEPARATOR_SUFFIX: &str = "map-entry-separator";
pub const ITEM_CONVERTER_SUFFIX: &str = "item-converter";
pub const DEFAULT_MAP_ENTRY_SEPARATOR: &str = "::";

/// Split `value` on `separator`, honouring `\` escapes of the separator
///
/// Items are trimmed; a blank value yields no items.
pub fn split_items(value: &str, separator: &str) -> Vec<String> {
    if value.trim().is_empty() {
        return Vec::new();
    }
    if separator.is_empty() {
        return vec![value.trim().to_string()];
    }

    let escaped = format!("\\{separator}");
    let mut items = Vec::new();
    let mut current = String::new();
    let mut rest = value;

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix(escaped.as_str()) {
            current.push_str(separator);
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix(separator) {
            items.push(current.trim().to_string());
            current.clear();
            rest = tail;
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                current.push(c);
            }
            rest = chars.as_str();
        }
    }
    items.push(current.trim().to_string());
    items
}

/// Split a map item into key and value
///
/// One enclosing `[`/`]` pair is stripped. An item without separator maps to itself.
pub fn split_map_entry(item: &str, separator: &str) -> (String, String) {
    let trimmed = item.trim();
    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    match unbracketed.split_once(separator) {
        Some((key, value)) if !separator.is_empty() => {
            (key.trim().to_string(), value.trim().to_string())
        }
        _ => (unbracketed.to_string(), unbracketed.to_string()),
    }
}

fn separator_for(context: &ConversionContext<'_>, suffix: &str, default: &str) -> String {
    context
        .configuration()
        .get(&meta_key(context.key(), suffix))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Converts into any collection built from its items, e.g. `Vec<T>`, `HashSet<T>`, `BTreeSet<T>`
pub struct ItemsConverter<C, T> {
    _types: PhantomData<fn() -> (C, T)>,
}

impl<C, T> ItemsConverter<C, T> {
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<C, T> Default for ItemsConverter<C, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, T> PropertyConverter<C> for ItemsConverter<C, T>
where
    C: FromIterator<T> + 'static,
    T: 'static,
{
    fn convert(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<C>> {
        context.add_supported_formats("ItemsConverter", &["a,b,c", "a\\,b,c (escaped separator)"]);
        let separator = separator_for(context, ITEM_SEPARATOR_SUFFIX, DEFAULT_ITEM_SEPARATOR);
        let item_converter = context
            .configuration()
            .get(&meta_key(context.key(), ITEM_CONVERTER_SUFFIX));

        let mut converted = Vec::new();
        for item in split_items(value, &separator) {
            match convert_item::<T>(&item, item_converter.as_deref(), context) {
                Some(v) => converted.push(v),
                None => anyhow::bail!("cannot convert item '{}'", item),
            }
        }
        Ok(Some(converted.into_iter().collect()))
    }
}

/// Converts into any map built from entries, e.g. `HashMap<K, V>`, `BTreeMap<K, V>`, `DashMap<K, V>`
pub struct EntriesConverter<C, K, V> {
    _types: PhantomData<fn() -> (C, K, V)>,
}

impl<C, K, V> EntriesConverter<C, K, V> {
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<C, K, V> Default for EntriesConverter<C, K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, K, V> PropertyConverter<C> for EntriesConverter<C, K, V>
where
    C: FromIterator<(K, V)> + 'static,
    K: 'static,
    V: 'static,
{
    fn convert(
        &self,
        value: &str,
        context: &mut ConversionContext<'_>,
    ) -> anyhow::Result<Option<C>> {
        context.add_supported_formats("EntriesConverter", &["k1::v1,k2::v2", "[k1::v1],[k2::v2]"]);
        let separator = separator_for(context, ITEM_SEPARATOR_SUFFIX, DEFAULT_ITEM_SEPARATOR);
        let entry_separator = separator_for(
            context,
            MAP_ENTRY_SEPARATOR_SUFFIX,
            DEFAULT_MAP_ENTRY_SEPARATOR,
        );
        let item_converter = context
            .configuration()
            .get(&meta_key(context.key(), ITEM_CONVERTER_SUFFIX));

        let mut entries = Vec::new();
        for item in split_items(value, &separator) {
            let (raw_key, raw_value) = split_map_entry(&item, &entry_separator);
            let Some(key) = convert_item::<K>(&raw_key, None, context) else {
                anyhow::bail!("cannot convert map key '{}'", raw_key);
            };
            let Some(value) = convert_item::<V>(&raw_value, item_converter.as_deref(), context)
            else {
                anyhow::bail!("cannot convert map value '{}'", raw_value);
            };
            entries.push((key, value));
        }
        Ok(Some(entries.into_iter().collect()))
    }
}
