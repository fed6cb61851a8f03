use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::links::build_results_url;
use crate::error::{Result, TestLensError};

const DEFAULT_BUILD_NUMBER: &str = "N/A";
const DEFAULT_REASON: &str = "Manual";
const DEFAULT_SOURCE_BRANCH: &str = "Unknown Branch";

/// Build object as returned by the builds listing endpoint.
///
/// Only `id` is mandatory; every other field is defaulted when missing or null.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawBuild {
    pub id: u64,
    #[serde(default)]
    pub build_number: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub source_branch: Option<String>,
}

/// Envelope of the builds listing endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct BuildList {
    #[serde(default)]
    pub value: Vec<RawBuild>,
}

/// One build of a pipeline, normalized from the API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub id: u64,
    pub build_number: String,
    pub start_time: Option<DateTime<Utc>>,
    pub reason: String,
    pub source_branch: String,
    pub description: String,
    pub link: String,
}

impl BuildSummary {
    pub(super) fn from_raw(raw: RawBuild, web_base: &str, organization: &str, project: &str) -> Self {
        let build_number = raw
            .build_number
            .unwrap_or_else(|| DEFAULT_BUILD_NUMBER.to_string());
        let reason = raw.reason.unwrap_or_else(|| DEFAULT_REASON.to_string());
        let source_branch = raw
            .source_branch
            .unwrap_or_else(|| DEFAULT_SOURCE_BRANCH.to_string());

        let description = format!(
            "#{build_number} • {} ({source_branch})",
            capitalize(&reason)
        );

        Self {
            id: raw.id,
            start_time: raw.start_time.as_deref().and_then(parse_timestamp),
            link: build_results_url(web_base, organization, project, raw.id),
            build_number,
            reason,
            source_branch,
            description,
        }
    }
}

/// Pass/fail counts for the test results of a single build.
///
/// `total` counts every outcome, so `passed + failed` can be lower than
/// `total` when some results are inconclusive, skipped, etc.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcomeTally {
    pub passed: u64,
    pub failed: u64,
    pub total: u64,
}

impl TestOutcomeTally {
    /// Tallies a test results response.
    ///
    /// The endpoint answers either with a bare array of results or with an
    /// object wrapping the array under `"value"`. Anything else is rejected.
    pub fn from_response(body: &Value) -> Result<Self> {
        let results = match body {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("value") {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(TestLensError::Shape(
                        "test results \"value\" is not an array".to_string(),
                    ))
                }
                None => {
                    return Err(TestLensError::Shape(
                        "test results object has no \"value\" key".to_string(),
                    ))
                }
            },
            other => {
                return Err(TestLensError::Shape(format!(
                    "expected array or object, got {}",
                    json_kind(other)
                )))
            }
        };

        Ok(Self::from_outcomes(results.iter().map(|result| {
            result
                .get("outcome")
                .and_then(Value::as_str)
                .unwrap_or_default()
        })))
    }

    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a str>) -> Self {
        outcomes
            .into_iter()
            .fold(Self::default(), |mut tally, outcome| {
                if outcome.eq_ignore_ascii_case("passed") {
                    tally.passed += 1;
                } else if outcome.eq_ignore_ascii_case("failed") {
                    tally.failed += 1;
                }
                tally.total += 1;
                tally
            })
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawBuild {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_build_summary_from_complete_raw_build() {
        let build = BuildSummary::from_raw(
            raw(json!({
                "id": 42,
                "buildNumber": "20240101.3",
                "startTime": "2024-01-01T10:30:00.1234567Z",
                "reason": "individualCI",
                "sourceBranch": "refs/heads/main"
            })),
            "https://dev.azure.com",
            "contoso",
            "web",
        );

        assert_eq!(build.id, 42);
        assert_eq!(build.build_number, "20240101.3");
        assert_eq!(
            build.start_time.unwrap().format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-01-01 10:30:00"
        );
        assert_eq!(build.description, "#20240101.3 • Individualci (refs/heads/main)");
        assert_eq!(
            build.link,
            "https://dev.azure.com/contoso/web/_build/results?buildId=42"
        );
    }

    #[test]
    fn test_build_summary_defaults_missing_fields() {
        let build = BuildSummary::from_raw(
            raw(json!({ "id": 7, "startTime": null })),
            "https://dev.azure.com",
            "contoso",
            "web",
        );

        assert_eq!(build.build_number, "N/A");
        assert_eq!(build.reason, "Manual");
        assert_eq!(build.source_branch, "Unknown Branch");
        assert_eq!(build.description, "#N/A • Manual (Unknown Branch)");
        assert!(build.start_time.is_none());
    }

    #[test]
    fn test_build_summary_treats_empty_or_invalid_start_time_as_absent() {
        let empty = BuildSummary::from_raw(raw(json!({ "id": 1, "startTime": "" })), "b", "o", "p");
        let garbage =
            BuildSummary::from_raw(raw(json!({ "id": 2, "startTime": "yesterday" })), "b", "o", "p");

        assert!(empty.start_time.is_none());
        assert!(garbage.start_time.is_none());
    }

    #[test]
    fn test_raw_build_requires_id() {
        let result: std::result::Result<RawBuild, _> =
            serde_json::from_value(json!({ "buildNumber": "1.0" }));

        assert!(result.is_err());
    }

    #[test]
    fn test_build_list_defaults_to_empty_without_value_key() {
        let list: BuildList = serde_json::from_value(json!({ "count": 0 })).unwrap();

        assert!(list.value.is_empty());
    }

    #[test]
    fn test_tally_counts_outcomes_case_insensitively() {
        let tally = TestOutcomeTally::from_outcomes(["Passed", "PASSED", "failed", "Failed"]);

        assert_eq!(
            tally,
            TestOutcomeTally {
                passed: 2,
                failed: 2,
                total: 4
            }
        );
    }

    #[test]
    fn test_tally_counts_other_outcomes_only_in_total() {
        let tally =
            TestOutcomeTally::from_outcomes(["Passed", "Inconclusive", "NotExecuted", "Failed", ""]);

        assert_eq!(tally.passed, 1);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.total, 5);
    }

    #[test]
    fn test_tally_accepts_bare_array_and_value_wrapper_identically() {
        let results = json!([
            { "outcome": "Passed" },
            { "outcome": "Failed" },
            { "outcome": "Passed" },
            { "testCaseTitle": "no outcome" }
        ]);
        let wrapped = json!({ "count": 4, "value": results.clone() });

        let bare = TestOutcomeTally::from_response(&results).unwrap();
        let enveloped = TestOutcomeTally::from_response(&wrapped).unwrap();

        assert_eq!(bare, enveloped);
        assert_eq!(
            bare,
            TestOutcomeTally {
                passed: 2,
                failed: 1,
                total: 4
            }
        );
    }

    #[test]
    fn test_tally_of_empty_results_is_zero() {
        assert_eq!(
            TestOutcomeTally::from_response(&json!([])).unwrap(),
            TestOutcomeTally::default()
        );
    }

    #[test]
    fn test_tally_rejects_unrecognized_shapes() {
        for body in [
            json!("nope"),
            json!(12),
            json!(null),
            json!({ "results": [] }),
            json!({ "value": { "outcome": "Passed" } }),
        ] {
            let err = TestOutcomeTally::from_response(&body).unwrap_err();
            assert!(matches!(err, TestLensError::Shape(_)), "{body}");
        }
    }

    #[test]
    fn test_capitalize_matches_sentence_case() {
        assert_eq!(capitalize("pullRequest"), "Pullrequest");
        assert_eq!(capitalize("MANUAL"), "Manual");
        assert_eq!(capitalize(""), "");
    }
}
