//! Immutable configuration snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tamaya_core::{
    Configuration, MapPropertySource, OverridingPolicy, PropertyMap, PropertySource,
    PropertyValue, SourceError,
};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// All entries of a configuration at one point in time
///
/// Versions increase monotonically within a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenConfiguration {
    name: String,
    version: u64,
    frozen_at: DateTime<Utc>,
    properties: PropertyMap,
}

impl FrozenConfiguration {
    /// Evaluate `configuration` and freeze the result
    pub fn of(configuration: &Configuration) -> Self {
        Self::from_properties(configuration.properties())
    }

    pub fn from_properties(properties: PropertyMap) -> Self {
        let version = NEXT_VERSION.fetch_add(1, Ordering::Relaxed);
        Self {
            name: format!("frozen-configuration-v{version}"),
            version,
            frozen_at: Utc::now(),
            properties,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn frozen_at(&self) -> DateTime<Utc> {
        self.frozen_at
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// A configuration answering from this snapshot, converting with the converters of `template`
    pub fn to_configuration(&self, template: &Configuration) -> Configuration {
        Configuration::new(
            template
                .context()
                .to_builder()
                .remove_property_sources()
                .remove_property_filters()
                .set_combination_policy(std::sync::Arc::new(OverridingPolicy))
                .add_property_source(MapPropertySource::new(
                    self.name.clone(),
                    self.properties.clone(),
                ))
                .build(),
        )
    }
}

impl PropertySource for FrozenConfiguration {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<PropertyValue>, SourceError> {
        Ok(PropertyValue::from_map(key, &self.properties))
    }

    fn properties(&self) -> Result<PropertyMap, SourceError> {
        Ok(self.properties.clone())
    }
}
