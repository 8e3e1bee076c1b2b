//! TOML, YAML and JSON files flattened into dotted keys

use crate::properties::{parse_properties, PropertiesFileSource};
use crate::{file_source_name, FormatError, FILE_ORDINAL};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tamaya_core::{PropertyMap, PropertySource, PropertyValue, SourceError};
use tracing::info;

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Properties,
    Toml,
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, FormatError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| FormatError::UnsupportedExtension(path.display().to_string()))?;

        match extension {
            "properties" => Ok(FileFormat::Properties),
            "toml" => Ok(FileFormat::Toml),
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            "json" => Ok(FileFormat::Json),
            other => Err(FormatError::UnsupportedExtension(other.to_string())),
        }
    }

    /// Parse `content` into flat entries
    pub fn parse(self, content: &str) -> Result<PropertyMap, FormatError> {
        let tree: Value = match self {
            FileFormat::Properties => return parse_properties(content),
            FileFormat::Toml => toml::from_str(content)?,
            FileFormat::Yaml => serde_yaml::from_str(content)?,
            FileFormat::Json => serde_json::from_str(content)?,
        };
        Ok(flatten(&tree))
    }
}

/// Flatten a document into dotted keys
///
/// Arrays of scalars become one comma separated value with commas inside items escaped;
/// arrays holding tables are expanded with the index as key segment.
pub fn flatten(tree: &Value) -> PropertyMap {
    let mut entries = PropertyMap::new();
    flatten_into("", tree, &mut entries);
    entries
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn flatten_into(prefix: &str, value: &Value, entries: &mut PropertyMap) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(&join(prefix, key), child, entries);
            }
        }
        Value::Array(items) if items.iter().all(|i| scalar(i).is_some()) => {
            let joined = items
                .iter()
                .filter_map(scalar)
                .map(|item| item.replace(',', "\\,"))
                .collect::<Vec<_>>()
                .join(",");
            entries.insert(prefix.to_string(), joined);
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(&join(prefix, &index.to_string()), child, entries);
            }
        }
        Value::Null => {}
        other => {
            if let Some(value) = scalar(other) {
                entries.insert(prefix.to_string(), value);
            }
        }
    }
}

/// Entries of a TOML, YAML or JSON file, loaded once
pub struct StructuredFileSource {
    name: String,
    path: PathBuf,
    format: FileFormat,
    ordinal: i32,
    entries: PropertyMap,
}

impl StructuredFileSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path).map_err(parse_error(path))?;
        let content = std::fs::read_to_string(path)?;
        let entries = format.parse(&content).map_err(parse_error(path))?;
        info!(
            "Loaded {} entries from {} ({:?})",
            entries.len(),
            path.display(),
            format
        );

        Ok(Self {
            name: file_source_name(path),
            path: path.to_path_buf(),
            format,
            ordinal: FILE_ORDINAL,
            entries,
        })
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }
}

impl PropertySource for StructuredFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Result<Option<PropertyValue>, SourceError> {
        Ok(PropertyValue::from_map(key, &self.entries).map(|value| {
            value
                .to_builder()
                .meta_defaults([("source", self.name.as_str())])
                .build()
        }))
    }

    fn properties(&self) -> Result<PropertyMap, SourceError> {
        Ok(self.entries.clone())
    }
}

/// Load any supported file as a property source, choosing the parser by extension
pub fn file_source(path: impl AsRef<Path>) -> Result<Arc<dyn PropertySource>, SourceError> {
    let path = path.as_ref();
    match FileFormat::from_path(path).map_err(parse_error(path))? {
        FileFormat::Properties => Ok(Arc::new(PropertiesFileSource::from_path(path)?)),
        _ => Ok(Arc::new(StructuredFileSource::from_path(path)?)),
    }
}

fn parse_error(path: &Path) -> impl Fn(FormatError) -> SourceError + '_ {
    move |e| SourceError::parse(path.display().to_string(), e.to_string())
}
