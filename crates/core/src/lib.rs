//! Configuration resolution pipeline
//!
//! This crate resolves configuration keys across an ordered list of property sources:
//! - `PropertySource`: named, prioritized providers of raw string entries
//! - `CombinationPolicy`: merges the contributions of successive sources for one key
//! - `PropertyFilter`: transforms resolved values until a fixed point is reached
//! - `PropertyConverter`: turns resolved strings into typed values
//! - `Configuration`: the facade tying the chain together
//!
//! A `ConfigurationContext` is assembled once through `ConfigurationContextBuilder` and then
//! treated as immutable; rebuilding produces a new `Configuration`.

mod configuration;
mod context;
pub mod convert;
mod error;
mod filter;
pub mod functions;
mod policy;
pub mod provider;
mod source;
mod types;
mod value;

pub use configuration::Configuration;
pub use context::{ConfigurationContext, ConfigurationContextBuilder, BUILTIN_CONVERTER_PRIORITY};
pub use convert::{AnyConverter, ConversionContext, ConverterEntry, PropertyConverter};
pub use error::{ConfigError, Result, SourceError};
pub use filter::{
    apply_filter, apply_filters, FilterContext, FilterRegistration, PropertyFilter,
    MAX_FILTER_LOOPS,
};
pub use policy::{
    AdaptivePolicy, CollectingPolicy, CombinationPolicy, OverridingPolicy, PolicyFactory,
    PolicyRegistry, DEFAULT_ITEM_SEPARATOR, ITEM_SEPARATOR_SUFFIX, POLICY_SUFFIX,
};
pub use provider::{ConfigurationProvider, DefaultConfigurationProvider};
pub use source::{MapPropertySource, PropertySource, ORDINAL_KEY};
pub use types::TypeDescriptor;
pub use value::{is_meta_key, meta_key, PropertyMap, PropertyValue, PropertyValueBuilder};
