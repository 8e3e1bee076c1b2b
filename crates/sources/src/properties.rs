//! `.properties` files

use crate::{file_source_name, FormatError, FILE_ORDINAL};
use std::path::{Path, PathBuf};
use tamaya_core::{PropertyMap, PropertySource, PropertyValue, SourceError};
use tracing::info;

/// Parse the contents of a `.properties` file
///
/// Supports `#` and `!` comments, `=`, `:` or whitespace between key and value, line
/// continuations with a trailing backslash and the `\t \n \r \f \uXXXX` escapes.
pub fn parse_properties(content: &str) -> Result<PropertyMap, FormatError> {
    let mut entries = PropertyMap::new();
    for (line_no, line) in logical_lines(content) {
        let (raw_key, raw_value) = split_entry(&line);
        let key = unescape(raw_key).map_err(|reason| FormatError::Properties {
            line: line_no,
            reason,
        })?;
        let value = unescape(raw_value).map_err(|reason| FormatError::Properties {
            line: line_no,
            reason,
        })?;
        entries.insert(key, value);
    }
    Ok(entries)
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Join continued lines, dropping blanks and comments; yields the starting line number
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        let (start, mut logical) = match current.take() {
            Some(open) => open,
            None => {
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                (index + 1, String::new())
            }
        };

        if ends_with_continuation(trimmed) {
            logical.push_str(&trimmed[..trimmed.len() - 1]);
            current = Some((start, logical));
        } else {
            logical.push_str(trimmed);
            lines.push((start, logical));
        }
    }
    if let Some(open) = current {
        lines.push(open);
    }
    lines
}

/// Split a logical line at the first unescaped separator
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                end = i;
                break;
            }
            c if c.is_whitespace() => {
                end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..end];
    let rest = line[end..].trim_start();
    let rest = rest
        .strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest)
        .trim_start();
    (key, rest)
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .ok_or_else(|| format!("malformed \\u escape '\\u{hex}'"))?;
                let decoded = char::from_u32(code)
                    .ok_or_else(|| format!("invalid code point \\u{hex}"))?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

/// Entries of a `.properties` file, loaded once
pub struct PropertiesFileSource {
    name: String,
    path: PathBuf,
    ordinal: i32,
    entries: PropertyMap,
}

impl PropertiesFileSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let entries = parse_properties(&content)
            .map_err(|e| SourceError::parse(path.display().to_string(), e.to_string()))?;
        info!("Loaded {} entries from {}", entries.len(), path.display());
        Ok(Self::from_entries(path, entries))
    }

    pub(crate) fn from_entries(path: &Path, entries: PropertyMap) -> Self {
        Self {
            name: file_source_name(path),
            path: path.to_path_buf(),
            ordinal: FILE_ORDINAL,
            entries,
        }
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PropertySource for PropertiesFileSource {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tamaya_core::ORDINAL_KEY;
    use tempfile::NamedTempFile;

    fn parse(content: &str) -> PropertyMap {
        parse_properties(content).unwrap()
    }

    #[test]
    fn test_separators_and_comments() {
        let entries = parse(
            "# comment\n! also comment\n\na=1\nb : 2\nc 3\nd=\n  e = spaced value  \n",
        );
        assert_eq!(entries.get("a").map(String::as_str), Some("1"));
        assert_eq!(entries.get("b").map(String::as_str), Some("2"));
        assert_eq!(entries.get("c").map(String::as_str), Some("3"));
        assert_eq!(entries.get("d").map(String::as_str), Some(""));
        assert_eq!(entries.get("e").map(String::as_str), Some("spaced value  "));
        assert_eq!(entries.len(), 5);
    }

    #[test]
    fn test_continuations() {
        let entries = parse("list=a,\\\n    b,\\\n    c\nnext=1\nodd=x\\\\\n");
        assert_eq!(entries.get("list").map(String::as_str), Some("a,b,c"));
        assert_eq!(entries.get("next").map(String::as_str), Some("1"));
        assert_eq!(entries.get("odd").map(String::as_str), Some("x\\"));
    }

    #[test]
    fn test_escapes() {
        let entries = parse("key\\=with\\:seps=tab\\there\nunicode=\\u00e9t\\u00e9\n");
        assert_eq!(
            entries.get("key=with:seps").map(String::as_str),
            Some("tab\there")
        );
        assert_eq!(entries.get("unicode").map(String::as_str), Some("été"));
    }

    #[test]
    fn test_malformed_unicode_escape() {
        let err = parse_properties("a=1\nbad=\\u12\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_file_source() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}=250", ORDINAL_KEY).unwrap();
        writeln!(file, "db.url=jdbc:h2:mem").unwrap();
        writeln!(file, "_db.url.note=in memory").unwrap();

        let source = PropertiesFileSource::from_path(file.path()).unwrap();
        assert_eq!(source.ordinal(), 250);

        let value = source.get("db.url").unwrap().unwrap();
        assert_eq!(value.value(), Some("jdbc:h2:mem"));
        assert_eq!(value.meta_entry("note"), Some("in memory"));
        assert!(value.source().unwrap().contains(&*file.path().display().to_string()));
    }

    #[test]
    fn test_missing_file() {
        assert!(PropertiesFileSource::from_path("/nonexistent/app.properties").is_err());
    }
}
