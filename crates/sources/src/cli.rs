//! Command line arguments as a property source

use crate::{system::system_properties, CLI_ORDINAL};
use tamaya_core::{PropertyMap, PropertySource, PropertyValue, SourceError};
use tracing::debug;

/// System property holding whitespace separated arguments, used when none are passed in
pub const MAIN_ARGS_KEY: &str = "main.args";

/// Prefix prepended to every parsed key
pub const PREFIX_KEY: &str = "main.args.prefix";

/// Parse arguments into entries
///
/// `--key=value` and `-key value` set `key`; a bare `--flag` or trailing `-flag` maps the flag
/// onto itself, as does a value without preceding option.
pub fn parse_args<I, S>(args: I, prefix: &str) -> PropertyMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut entries = PropertyMap::new();
    let mut pending: Option<String> = None;

    for arg in args {
        let arg = arg.as_ref().trim();
        if arg.is_empty() {
            continue;
        }
        if let Some(option) = arg.strip_prefix("--") {
            if let Some(flag) = pending.take() {
                entries.insert(format!("{prefix}{flag}"), flag);
            }
            match option.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    entries.insert(format!("{prefix}{}", key.trim()), value.trim().to_string());
                }
                _ => {
                    entries.insert(format!("{prefix}{option}"), option.to_string());
                }
            }
        } else if let Some(option) = arg.strip_prefix('-') {
            if let Some(flag) = pending.replace(option.to_string()) {
                entries.insert(format!("{prefix}{flag}"), flag);
            }
        } else {
            match pending.take() {
                Some(key) => entries.insert(format!("{prefix}{key}"), arg.to_string()),
                None => entries.insert(format!("{prefix}{arg}"), arg.to_string()),
            };
        }
    }

    if let Some(flag) = pending {
        entries.insert(format!("{prefix}{flag}"), flag);
    }
    entries
}

/// Exposes parsed command line arguments with ordinal 400
pub struct CliPropertySource {
    name: String,
    ordinal: i32,
    entries: PropertyMap,
}

impl CliPropertySource {
    /// Parse `args`, falling back to the `main.args` system property when `args` is empty
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::parse(args, None)
    }

    /// Like [`Self::new`], prepending `prefix` instead of the `main.args.prefix` switch
    pub fn with_prefix<I, S>(args: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::parse(args, Some(prefix))
    }

    /// Parse the arguments of the running process, skipping the program name
    pub fn from_process_args() -> Self {
        Self::new(std::env::args().skip(1))
    }

    fn parse<I, S>(args: I, prefix: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        if args.is_empty() {
            if let Some(main_args) = system_properties::get(MAIN_ARGS_KEY) {
                args = main_args.split_whitespace().map(String::from).collect();
            }
        }
        let prefix = match prefix {
            Some(prefix) => prefix.to_string(),
            None => system_properties::get(PREFIX_KEY).unwrap_or_default(),
        };
        let entries = parse_args(&args, &prefix);
        debug!("Parsed {} command line entries", entries.len());

        Self {
            name: "cli-properties".to_string(),
            ordinal: CLI_ORDINAL,
            entries,
        }
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }
}

impl PropertySource for CliPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Result<Option<PropertyValue>, SourceError> {
        Ok(self.entries.get(key).map(|value| {
            PropertyValue::builder(key)
                .value(value.as_str())
                .source(self.name.as_str())
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
    use serial_test::serial;

    fn get<'a>(entries: &'a PropertyMap, key: &str) -> Option<&'a str> {
        entries.get(key).map(String::as_str)
    }

    #[test]
    fn test_parse_option_forms() {
        let entries = parse_args(
            ["--port=8080", "--verbose", "-c", "app.toml", "-q", "plain"],
            "",
        );

        assert_eq!(get(&entries, "port"), Some("8080"));
        assert_eq!(get(&entries, "verbose"), Some("verbose"));
        assert_eq!(get(&entries, "c"), Some("app.toml"));
        assert_eq!(get(&entries, "q"), Some("plain"));
    }

    #[test]
    fn test_parse_trailing_and_consecutive_flags() {
        let entries = parse_args(["-a", "-b", "standalone", "-z"], "");
        assert_eq!(get(&entries, "a"), Some("a"));
        assert_eq!(get(&entries, "b"), Some("standalone"));
        assert_eq!(get(&entries, "z"), Some("z"));

        let lone = parse_args(["standalone"], "");
        assert_eq!(get(&lone, "standalone"), Some("standalone"));
    }

    #[test]
    fn test_parse_with_prefix() {
        let entries = parse_args(["--port=1"], "cli.");
        assert_eq!(get(&entries, "cli.port"), Some("1"));
    }

    #[test]
    #[serial]
    fn test_main_args_fallback() {
        system_properties::set(MAIN_ARGS_KEY, "--mode=batch -n 4");
        system_properties::set(PREFIX_KEY, "args.");
        let source = CliPropertySource::new(Vec::<String>::new());
        system_properties::remove(MAIN_ARGS_KEY);
        system_properties::remove(PREFIX_KEY);

        let entries = source.properties().unwrap();
        assert_eq!(get(&entries, "args.mode"), Some("batch"));
        assert_eq!(get(&entries, "args.n"), Some("4"));
        assert_eq!(
            source.get("args.mode").unwrap().unwrap().source(),
            Some("cli-properties")
        );
    }

    #[test]
    #[serial]
    fn test_explicit_prefix_beats_switch() {
        system_properties::set(PREFIX_KEY, "args.");
        let source = CliPropertySource::with_prefix(["--mode=batch"], "cli.");
        system_properties::remove(PREFIX_KEY);

        let entries = source.properties().unwrap();
        assert_eq!(get(&entries, "cli.mode"), Some("batch"));
        assert_eq!(get(&entries, "args.mode"), None);
    }
}
