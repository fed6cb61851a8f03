use futures::stream::{self, StreamExt};
use log::warn;

use super::source::BuildSource;
use super::types::{BuildSummary, TestOutcomeTally};
use crate::insights::AggregatedRecord;

/// Upper bound on test result requests in flight for one pipeline.
const MAX_CONCURRENT_FETCHES: usize = 8;

/// Records for a list of builds plus the warnings raised while building them.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub records: Vec<AggregatedRecord>,
    pub warnings: Vec<String>,
}

/// Converts builds into per-build test metrics.
///
/// Fetches the test outcome tally of every build (one request per build,
/// usually served by the cache) and computes pass and fail rates. Output
/// order matches input order. A build whose tally cannot be fetched is
/// reported with zero counts and a warning instead of failing the batch.
///
/// # Arguments
///
/// * `source` - Where tallies come from (normally the cached client)
/// * `organization` - Azure DevOps organization
/// * `project` - Azure DevOps project
/// * `builds` - Builds to aggregate, newest first
pub async fn aggregate<S>(
    source: &S,
    organization: &str,
    project: &str,
    builds: &[BuildSummary],
) -> Aggregation
where
    S: BuildSource + ?Sized,
{
    let results: Vec<(AggregatedRecord, Option<String>)> = stream::iter(builds)
        .map(|build| async move {
            match source
                .fetch_test_outcomes(organization, project, build.id)
                .await
            {
                Ok(tally) => (to_record(build, tally), None),
                Err(e) => {
                    let message =
                        format!("Failed to fetch aggregated test results for build {}: {e}", build.id);
                    warn!("{message}");
                    (to_record(build, TestOutcomeTally::default()), Some(message))
                }
            }
        })
        .buffered(MAX_CONCURRENT_FETCHES)
        .collect()
        .await;

    let mut aggregation = Aggregation::default();
    for (record, warning) in results {
        aggregation.records.push(record);
        aggregation.warnings.extend(warning);
    }
    aggregation
}

/// Builds the record of one build from its tally.
pub fn to_record(build: &BuildSummary, tally: TestOutcomeTally) -> AggregatedRecord {
    AggregatedRecord {
        datetime: build.start_time,
        build: build.build_number.clone(),
        passed: tally.passed,
        failed: tally.failed,
        total: tally.total,
        pass_rate: percentage(tally.passed, tally.total),
        fail_rate: percentage(tally.failed, tally.total),
        link: build.link.clone(),
    }
}

/// `count / total * 100` rounded to two decimals, or 0 when `total` is 0.
///
/// Ties round to even, so 1/32 (3.125%) reports as 3.12.
#[allow(clippy::cast_precision_loss)]
fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = count as f64 / total as f64 * 100.0;
    (rate * 100.0).round_ties_even() / 100.0
}
