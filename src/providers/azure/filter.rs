use indexmap::IndexMap;

use super::types::BuildSummary;
use crate::error::{Result, TestLensError};
use crate::insights::AggregatedRecord;

/// Filter name that disables filtering.
pub const NO_FILTER: &str = "None";

/// Anything that carries a human-readable build number.
pub trait HasBuildNumber {
    fn build_number(&self) -> &str;
}

impl HasBuildNumber for BuildSummary {
    fn build_number(&self) -> &str {
        &self.build_number
    }
}

impl HasBuildNumber for AggregatedRecord {
    fn build_number(&self) -> &str {
        &self.build
    }
}

/// Keeps the items whose build number contains `pattern` (case-sensitive).
///
/// `None` keeps everything.
pub fn filter_by_build_number<T: HasBuildNumber>(items: Vec<T>, pattern: Option<&str>) -> Vec<T> {
    match pattern {
        Some(pattern) => items
            .into_iter()
            .filter(|item| item.build_number().contains(pattern))
            .collect(),
        None => items,
    }
}

/// Resolves a named build filter to its substring.
///
/// `None` or the `"None"` sentinel resolve to no filter at all.
///
/// # Errors
///
/// Returns a configuration error when the name is not a configured filter.
pub fn resolve_filter<'a>(
    filters: &'a IndexMap<String, String>,
    name: Option<&str>,
) -> Result<Option<&'a str>> {
    match name {
        None | Some(NO_FILTER) => Ok(None),
        Some(name) => filters
            .get(name)
            .map(|pattern| Some(pattern.as_str()))
            .ok_or_else(|| {
                let known: Vec<&str> = filters.keys().map(String::as_str).collect();
                TestLensError::Config(format!(
                    "Unknown build filter '{name}' (known filters: {NO_FILTER}, {})",
                    known.join(", ")
                ))
            }),
    }
}
