//! Environment variables as a property source

use crate::{is_enabled_flag, system::system_properties, ENVIRONMENT_ORDINAL};
use std::collections::BTreeMap;
use tamaya_core::{PropertyMap, PropertySource, PropertyValue, SourceError};

/// Switch disabling the environment source
pub const DISABLE_KEY: &str = "tamaya.envprops.disable";

/// Prefix prepended to every environment variable name
pub const PREFIX_KEY: &str = "tamaya.envprops.prefix";

/// Exposes environment variables with ordinal 300
///
/// A lookup of `app.db-url` tries `app.db-url`, then `app_db-url`, then `APP_DB-URL`.
/// Switches are read from the system properties first, then from the environment itself.
pub struct EnvironmentPropertySource {
    name: String,
    ordinal: i32,
    prefix: Option<String>,
    variables: Option<BTreeMap<String, String>>,
}

impl EnvironmentPropertySource {
    /// Source reading the live process environment
    pub fn new() -> Self {
        Self {
            name: "environment-properties".to_string(),
            ordinal: ENVIRONMENT_ORDINAL,
            prefix: None,
            variables: None,
        }
    }

    /// Source over a fixed set of variables instead of the process environment
    pub fn with_variables<I, K, V>(variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            variables: Some(
                variables
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            ..Self::new()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    fn variable(&self, name: &str) -> Option<String> {
        match &self.variables {
            Some(variables) => variables.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    fn variables(&self) -> BTreeMap<String, String> {
        match &self.variables {
            Some(variables) => variables.clone(),
            None => std::env::vars().collect(),
        }
    }

    fn switch(&self, key: &str) -> Option<String> {
        system_properties::get(key)
            .or_else(|| self.variable(key))
            .or_else(|| self.variable(&key.replace('.', "_").to_uppercase()))
    }

    fn is_disabled(&self) -> bool {
        self.switch(DISABLE_KEY)
            .as_deref()
            .map(is_enabled_flag)
            .unwrap_or(false)
    }

    fn prefix(&self) -> String {
        self.prefix
            .clone()
            .or_else(|| self.switch(PREFIX_KEY))
            .unwrap_or_default()
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(value) = self.variable(name) {
            return Some(value);
        }
        let underscored = name.replace('.', "_");
        if let Some(value) = self.variable(&underscored) {
            return Some(value);
        }
        self.variable(&underscored.to_uppercase())
    }
}

impl Default for EnvironmentPropertySource {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertySource for EnvironmentPropertySource {
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

        let prefix = self.prefix();
        let Some(name) = key.strip_prefix(prefix.as_str()) else {
            return Ok(None);
        };
        Ok(self.lookup(name).map(|value| {
            PropertyValue::builder(key)
                .value(value)
                .source(self.name.as_str())
                .build()
        }))
    }

    fn properties(&self) -> Result<PropertyMap, SourceError> {
        if self.is_disabled() {
            return Ok(PropertyMap::new());
        }
        let prefix = self.prefix();
        Ok(self
            .variables()
            .into_iter()
            .map(|(k, v)| (format!("{prefix}{k}"), v))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn value_of(source: &EnvironmentPropertySource, key: &str) -> Option<String> {
        source
            .get(key)
            .unwrap()
            .and_then(|v| v.value().map(String::from))
    }

    #[test]
    #[serial]
    fn test_key_variants() {
        let source = EnvironmentPropertySource::with_variables([
            ("exact.key", "1"),
            ("under_score", "2"),
            ("UPPER_CASE", "3"),
        ]);

        assert_eq!(value_of(&source, "exact.key").as_deref(), Some("1"));
        assert_eq!(value_of(&source, "under.score").as_deref(), Some("2"));
        assert_eq!(value_of(&source, "upper.case").as_deref(), Some("3"));
        assert_eq!(value_of(&source, "missing"), None);
    }

    #[test]
    #[serial]
    fn test_prefix() {
        let source = EnvironmentPropertySource::with_variables([("HOME", "/root")])
            .with_prefix("env.");

        assert_eq!(value_of(&source, "env.HOME").as_deref(), Some("/root"));
        assert_eq!(value_of(&source, "HOME"), None);
        assert!(source.properties().unwrap().contains_key("env.HOME"));
    }

    #[test]
    #[serial]
    fn test_disable_switch() {
        let source = EnvironmentPropertySource::with_variables([
            ("HOME", "/root"),
            ("TAMAYA_ENVPROPS_DISABLE", "true"),
        ]);

        let value = source.get("HOME").unwrap().unwrap();
        assert!(!value.is_present());
        assert_eq!(value.source(), Some("environment-properties(disabled)"));
        assert!(source.properties().unwrap().is_empty());
    }
}
