//! Property filter chain applied after combination and before conversion

use crate::PropertyMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum number of full passes over the filter chain
pub const MAX_FILTER_LOOPS: usize = 10;

/// What a filter can see while filtering one entry
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    key: &'a str,
    entries: &'a PropertyMap,
    single_property: bool,
}

impl<'a> FilterContext<'a> {
    pub fn new(key: &'a str, entries: &'a PropertyMap, single_property: bool) -> Self {
        Self {
            key,
            entries,
            single_property,
        }
    }

    pub fn key(&self) -> &str {
        self.key
    }

    /// Raw entries collected so far: the key's rows for a single lookup, the whole map otherwise
    pub fn entries(&self) -> &PropertyMap {
        self.entries
    }

    /// Whether the filter runs for a single key lookup rather than a full evaluation
    pub fn is_single_property(&self) -> bool {
        self.single_property
    }
}

/// Transforms a resolved value
///
/// Returning `Ok(None)` removes the property. An `Err` is logged and the value is left unchanged.
pub trait PropertyFilter: Send + Sync {
    fn filter_property(
        &self,
        key: &str,
        value: &str,
        context: &FilterContext<'_>,
    ) -> anyhow::Result<Option<String>>;
}

impl<F> PropertyFilter for F
where
    F: Fn(&str, &str, &FilterContext<'_>) -> anyhow::Result<Option<String>> + Send + Sync,
{
    fn filter_property(
        &self,
        key: &str,
        value: &str,
        context: &FilterContext<'_>,
    ) -> anyhow::Result<Option<String>> {
        self(key, value, context)
    }
}

/// A filter together with its optional explicit priority
#[derive(Clone)]
pub struct FilterRegistration {
    filter: Arc<dyn PropertyFilter>,
    priority: Option<i32>,
}

impl FilterRegistration {
    pub fn new(filter: Arc<dyn PropertyFilter>, priority: Option<i32>) -> Self {
        Self { filter, priority }
    }

    pub fn filter(&self) -> &Arc<dyn PropertyFilter> {
        &self.filter
    }

    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    fn run(&self, key: &str, value: &str, context: &FilterContext<'_>) -> Option<String> {
        match self.filter.filter_property(key, value, context) {
            Ok(filtered) => filtered,
            Err(e) => {
                warn!("Property filter failed for key {}: {}", key, e);
                Some(value.to_string())
            }
        }
    }
}

/// Order filters for execution
///
/// Filters with an explicit priority run first, highest priority first; the remaining
/// filters keep their registration order. The sort is stable.
pub(crate) fn sort_filters(filters: &mut [FilterRegistration]) {
    filters.sort_by_key(|f| match f.priority {
        Some(priority) => (0, -(i64::from(priority))),
        None => (1, 0),
    });
}

/// Run the chain over a single key's value until no filter changes it
///
/// A filter returning `None` removes the property. After [`MAX_FILTER_LOOPS`] passes the
/// current value is returned even if filters keep changing it.
pub fn apply_filter(
    key: &str,
    value: Option<&str>,
    entries: &PropertyMap,
    filters: &[FilterRegistration],
) -> Option<String> {
    let mut value = value?.to_string();
    if filters.is_empty() {
        return Some(value);
    }

    let context = FilterContext::new(key, entries, true);
    for _ in 0..MAX_FILTER_LOOPS {
        let mut changed = false;
        for filter in filters {
            match filter.run(key, &value, &context) {
                Some(filtered) => {
                    if filtered != value {
                        changed = true;
                        value = filtered;
                    }
                }
                None => {
                    debug!("Filter removed property {}", key);
                    return None;
                }
            }
        }
        if !changed {
            return Some(value);
        }
    }

    warn!(
        "Maximum filter loop count ({}) reached for key {}, returning current value",
        MAX_FILTER_LOOPS, key
    );
    Some(value)
}

/// Run the chain over every entry of a map until a full pass changes nothing
///
/// The loop bound applies to the whole map, not to each entry.
pub fn apply_filters(raw: PropertyMap, filters: &[FilterRegistration]) -> PropertyMap {
    if filters.is_empty() {
        return raw;
    }

    let mut current = raw;
    for _ in 0..MAX_FILTER_LOOPS {
        let mut changed = false;
        let mut next = PropertyMap::with_capacity(current.len());

        for (key, value) in &current {
            let context = FilterContext::new(key, &current, false);
            let mut filtered = Some(value.clone());

            for filter in filters {
                let Some(input) = filtered.as_deref() else {
                    break;
                };
                match filter.run(key, input, &context) {
                    Some(output) => {
                        if output != input {
                            changed = true;
                            filtered = Some(output);
                        }
                    }
                    None => {
                        debug!("Filter removed property {}", key);
                        changed = true;
                        filtered = None;
                    }
                }
            }

            if let Some(value) = filtered {
                next.insert(key.clone(), value);
            }
        }

        current = next;
        if !changed {
            return current;
        }
    }

    warn!(
        "Maximum filter loop count ({}) reached while filtering all properties",
        MAX_FILTER_LOOPS
    );
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registration<F>(filter: F, priority: Option<i32>) -> FilterRegistration
    where
        F: Fn(&str, &str, &FilterContext<'_>) -> anyhow::Result<Option<String>>
            + Send
            + Sync
            + 'static,
    {
        FilterRegistration::new(Arc::new(filter), priority)
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let entries = PropertyMap::new();
        assert_eq!(
            apply_filter("k", Some("v"), &entries, &[]),
            Some("v".to_string())
        );
        assert_eq!(apply_filter("k", None, &entries, &[]), None);
    }

    #[test]
    fn test_null_terminates_single_lookup() {
        let entries = PropertyMap::new();
        let filters = vec![registration(|_: &str, _: &str, _: &FilterContext<'_>| Ok(None), None)];
        assert_eq!(apply_filter("k", Some("v"), &entries, &filters), None);
    }

    #[test]
    fn test_failing_filter_leaves_value() {
        let entries = PropertyMap::new();
        let filters = vec![
            registration(
                |_: &str, _: &str, _: &FilterContext<'_>| Err(anyhow::anyhow!("boom")),
                None,
            ),
            registration(
                |_: &str, v: &str, _: &FilterContext<'_>| Ok(Some(v.trim().to_string())),
                None,
            ),
        ];
        assert_eq!(
            apply_filter("k", Some(" v "), &entries, &filters),
            Some("v".to_string())
        );
    }

    #[test]
    fn test_non_converging_chain_is_bounded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let filters = vec![registration(
            move |_: &str, v: &str, _: &FilterContext<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(format!("{v}+")))
            },
            None,
        )];

        let result = apply_filter("k", Some("v"), &PropertyMap::new(), &filters).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), MAX_FILTER_LOOPS);
        assert_eq!(result, format!("v{}", "+".repeat(MAX_FILTER_LOOPS)));
    }

    #[test]
    fn test_non_converging_bulk_is_bounded_per_map() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let filters = vec![registration(
            move |_: &str, v: &str, _: &FilterContext<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(format!("{v}+")))
            },
            None,
        )];
        let raw: PropertyMap = [("a", "x"), ("b", "y"), ("c", "z")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let filtered = apply_filters(raw, &filters);
        // one call per entry and pass, the bound counts passes over the whole map
        assert_eq!(calls.load(Ordering::SeqCst), MAX_FILTER_LOOPS * 3);
        assert_eq!(filtered.len(), 3);
        let suffix = "+".repeat(MAX_FILTER_LOOPS);
        assert_eq!(filtered.get("a"), Some(&format!("x{suffix}")));
        assert_eq!(filtered.get("b"), Some(&format!("y{suffix}")));
        assert_eq!(filtered.get("c"), Some(&format!("z{suffix}")));
    }

    #[test]
    fn test_bulk_removes_filtered_entries() {
        let raw: PropertyMap = [("keep", "1"), ("drop", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let filters = vec![registration(
            |k: &str, v: &str, _: &FilterContext<'_>| {
                Ok((k != "drop").then(|| v.to_string()))
            },
            None,
        )];

        let filtered = apply_filters(raw, &filters);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("keep").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_bulk_context_sees_whole_map() {
        let raw: PropertyMap = [("a", "x"), ("b", "y")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let filters = vec![registration(
            |_: &str, v: &str, ctx: &FilterContext<'_>| {
                assert!(!ctx.is_single_property());
                assert_eq!(ctx.entries().len(), 2);
                Ok(Some(v.to_string()))
            },
            None,
        )];

        assert_eq!(apply_filters(raw, &filters).len(), 2);
    }

    #[test]
    fn test_sort_filters_by_priority() {
        let noop = |_: &str, v: &str, _: &FilterContext<'_>| Ok(Some(v.to_string()));
        let mut filters = vec![
            registration(noop, None),
            registration(noop, Some(1)),
            registration(noop, Some(5)),
            registration(noop, None),
        ];
        sort_filters(&mut filters);

        let priorities: Vec<_> = filters.iter().map(FilterRegistration::priority).collect();
        assert_eq!(priorities, vec![Some(5), Some(1), None, None]);
    }
}
