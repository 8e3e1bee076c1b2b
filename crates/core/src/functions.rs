//! Operators and queries for [`Configuration::with`] and [`Configuration::query`]
//!
//! Operators evaluate the configuration once and return a new configuration backed by a
//! snapshot of the selected entries. The derived configuration keeps the converters of the
//! original but no filters, since the snapshot already holds filtered values.

use crate::{
    is_meta_key, Configuration, MapPropertySource, OverridingPolicy, PropertyMap,
};
use std::collections::BTreeSet;
use std::sync::Arc;

fn snapshot(configuration: &Configuration, name: String, entries: PropertyMap) -> Configuration {
    Configuration::new(
        configuration
            .context()
            .to_builder()
            .remove_property_sources()
            .remove_property_filters()
            .set_combination_policy(Arc::new(OverridingPolicy))
            .add_property_source(MapPropertySource::new(name, entries))
            .build(),
    )
}

/// Strip the leading underscore of a meta-key, leaving ordinary keys unchanged
fn target_key(key: &str) -> (&str, bool) {
    match key.strip_prefix('_') {
        Some(rest) => (rest, true),
        None => (key, false),
    }
}

/// Select the entries below `prefix`, together with their meta rows
///
/// With `strip` the prefix is removed, so `db.url` becomes `url` in section `db`.
pub fn section(prefix: &str, strip: bool) -> impl Fn(&Configuration) -> Configuration {
    let area = format!("{}.", prefix.trim_end_matches('.'));
    move |configuration| {
        let entries = configuration
            .properties()
            .into_iter()
            .filter_map(|(key, value)| {
                let (name, meta) = target_key(&key);
                let rest = name.strip_prefix(area.as_str())?;
                if !strip {
                    return Some((key.clone(), value));
                }
                let stripped = if meta { format!("_{rest}") } else { rest.to_string() };
                Some((stripped, value))
            })
            .collect();
        snapshot(configuration, format!("section({area})"), entries)
    }
}

/// Drop all `_key.<suffix>` rows
pub fn without_meta_entries(configuration: &Configuration) -> Configuration {
    let entries = configuration
        .properties()
        .into_iter()
        .filter(|(key, _)| !is_meta_key(key))
        .collect();
    snapshot(configuration, "without-meta-entries".to_string(), entries)
}

/// Rename keys; a mapping returning `None` drops the entry
pub fn map_keys<F>(mapping: F) -> impl Fn(&Configuration) -> Configuration
where
    F: Fn(&str) -> Option<String>,
{
    move |configuration| {
        let entries = configuration
            .properties()
            .into_iter()
            .filter_map(|(key, value)| mapping(&key).map(|mapped| (mapped, value)))
            .collect();
        snapshot(configuration, "mapped-keys".to_string(), entries)
    }
}

/// Keep the entries whose key matches `predicate`
pub fn filter_keys<P>(predicate: P) -> impl Fn(&Configuration) -> Configuration
where
    P: Fn(&str) -> bool,
{
    move |configuration| {
        let entries = configuration
            .properties()
            .into_iter()
            .filter(|(key, _)| predicate(key))
            .collect();
        snapshot(configuration, "filtered-keys".to_string(), entries)
    }
}

/// All section names, i.e. every dotted prefix of an ordinary key
pub fn section_names(configuration: &Configuration) -> BTreeSet<String> {
    let mut sections = BTreeSet::new();
    for key in configuration.properties().keys().filter(|k| !is_meta_key(k)) {
        let mut end = 0;
        while let Some(pos) = key[end..].find('.') {
            end += pos;
            sections.insert(key[..end].to_string());
            end += 1;
        }
    }
    sections
}

/// All ordinary keys, sorted
pub fn keys(configuration: &Configuration) -> BTreeSet<String> {
    configuration
        .properties()
        .into_keys()
        .filter(|k| !is_meta_key(k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigurationContext;

    fn sample() -> Configuration {
        Configuration::new(
            ConfigurationContext::builder()
                .add_property_source(MapPropertySource::from_pairs(
                    "sample",
                    [
                        ("db.url", "jdbc:h2:mem"),
                        ("db.pool.size", "8"),
                        ("_db.url.source", "file"),
                        ("server.port", "8080"),
                        ("dbx", "nope"),
                    ],
                ))
                .add_default_converters()
                .build(),
        )
    }

    #[test]
    fn test_section_with_strip() {
        let db = sample().with(section("db", true));
        assert_eq!(db.get("url").as_deref(), Some("jdbc:h2:mem"));
        assert_eq!(db.get("_url.source").as_deref(), Some("file"));
        assert_eq!(db.get_as::<u32>("pool.size").unwrap(), Some(8));
        assert_eq!(db.get("dbx"), None);
        assert_eq!(db.get("server.port"), None);
    }

    #[test]
    fn test_section_without_strip() {
        let db = sample().with(section("db", false));
        assert_eq!(db.get("db.url").as_deref(), Some("jdbc:h2:mem"));
        assert_eq!(db.get("_db.url.source").as_deref(), Some("file"));
        assert_eq!(db.get("url"), None);
    }

    #[test]
    fn test_without_meta_entries() {
        let plain = sample().with(without_meta_entries);
        assert_eq!(plain.query(keys).len(), 4);
        assert_eq!(
            plain.get_value("db.url").unwrap().source(),
            Some("without-meta-entries")
        );
        assert_eq!(plain.get("_db.url.source"), None);
    }

    #[test]
    fn test_map_and_filter_keys() {
        let upper = sample().with(map_keys(|k| (!is_meta_key(k)).then(|| k.to_uppercase())));
        assert_eq!(upper.get("SERVER.PORT").as_deref(), Some("8080"));
        assert_eq!(upper.query(keys).len(), 4);

        let servers = sample().with(filter_keys(|k| k.starts_with("server.")));
        assert_eq!(servers.query(keys), BTreeSet::from(["server.port".to_string()]));
    }

    #[test]
    fn test_queries() {
        let config = sample();
        let names = config.query(section_names);
        let expected: BTreeSet<String> = ["db", "db.pool", "server"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names, expected);
        assert_eq!(config.query(keys).len(), 4);
    }
}
