use async_trait::async_trait;

use super::types::{BuildSummary, TestOutcomeTally};
use crate::error::Result;

/// Read-only access to the build and test-result data of a CI provider.
///
/// Implemented by the HTTP client and by the caching wrapper around it, so
/// the aggregation and staleness code never care which one they talk to.
#[async_trait]
pub trait BuildSource: Send + Sync {
    /// Lists builds of one pipeline definition, newest first.
    ///
    /// `max_builds` caps the number of builds returned per definition.
    async fn fetch_builds(
        &self,
        organization: &str,
        project: &str,
        pipeline_id: u64,
        max_builds: Option<u32>,
    ) -> Result<Vec<BuildSummary>>;

    /// Tallies the test outcomes recorded for one build.
    async fn fetch_test_outcomes(
        &self,
        organization: &str,
        project: &str,
        build_id: u64,
    ) -> Result<TestOutcomeTally>;

    /// Lists only the ids of the newest builds of a pipeline definition.
    ///
    /// Never served from a cache: this is the probe used to detect that
    /// cached build lists have fallen behind.
    async fn fetch_latest_build_ids(
        &self,
        organization: &str,
        project: &str,
        pipeline_id: u64,
        max_builds: Option<u32>,
    ) -> Result<Vec<u64>> {
        let builds = self
            .fetch_builds(organization, project, pipeline_id, max_builds)
            .await?;
        Ok(builds.into_iter().map(|build| build.id).collect())
    }
}
