use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use log::{error, info, warn};

use super::aggregate::aggregate;
use super::cache::CachedSource;
use super::client::AzureClient;
use super::filter::filter_by_build_number;
use super::links::pipeline_url;
use super::source::BuildSource;
use super::staleness::{StalenessDetector, StalenessMarkers};
use crate::auth::Token;
use crate::config::{Config, ProjectConfig};
use crate::error::Result;
use crate::insights::{DashboardReport, PipelineReport};

/// Azure Pipelines test-results provider for one project.
///
/// Owns the cached client, the staleness markers and the pipeline list, and
/// runs render cycles over them. Fetch failures never abort a cycle: a
/// pipeline whose builds cannot be listed is reported empty with a warning.
pub struct AzureProvider<S = AzureClient> {
    source: CachedSource<S>,
    organization: String,
    project: String,
    pipelines: IndexMap<String, u64>,
    web_base: String,
    markers: StalenessMarkers,
}

impl AzureProvider<AzureClient> {
    /// Creates a provider for a configured project.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API base URLs are invalid.
    pub fn from_config(config: &Config, project: &ProjectConfig, token: &Token) -> Result<Self> {
        let client = AzureClient::new(
            &config.api_base_url,
            &config.test_results_base_url,
            token,
            config.request_timeout(),
        )?;
        let web_base = client.web_base().to_string();

        Ok(Self::new(
            Arc::new(client),
            config.organization.clone(),
            project.project.clone(),
            project.pipelines.clone(),
            web_base,
            config.cache_ttl(),
        ))
    }
}

impl<S> AzureProvider<S>
where
    S: BuildSource + 'static,
{
    pub fn new(
        client: Arc<S>,
        organization: String,
        project: String,
        pipelines: IndexMap<String, u64>,
        web_base: String,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            source: CachedSource::new(client, cache_ttl),
            organization,
            project,
            pipelines,
            web_base,
            markers: StalenessMarkers::new(),
        }
    }

    /// A detector probing this provider's pipelines with the uncached client.
    pub fn staleness_detector(&self) -> StalenessDetector<S> {
        StalenessDetector::new(
            Arc::clone(self.source.inner()),
            self.organization.clone(),
            self.project.clone(),
            self.pipelines.clone(),
            self.markers.clone(),
        )
    }

    /// Drops every cached build listing and test tally.
    pub fn clear_cache(&self) {
        self.source.clear();
    }

    /// Runs one render cycle over every configured pipeline.
    ///
    /// For each pipeline: list builds (cached), compare the newest one with the
    /// staleness marker, apply the build number filter, then aggregate test
    /// results per build. Pipelines keep their configured order and records
    /// keep the order the API returned the builds in.
    ///
    /// # Arguments
    ///
    /// * `max_builds` - Cap on builds listed per pipeline
    /// * `filter` - Substring a build number must contain to be kept
    pub async fn collect_report(
        &self,
        max_builds: Option<u32>,
        filter: Option<&str>,
    ) -> DashboardReport {
        info!(
            "Collecting test results for {} pipelines of {}/{}",
            self.pipelines.len(),
            self.organization,
            self.project
        );

        let reports = self
            .pipelines
            .iter()
            .map(|(name, &pipeline_id)| self.pipeline_report(name, pipeline_id, max_builds, filter));
        let pipelines = futures::future::join_all(reports).await;

        DashboardReport {
            provider: "Azure Pipelines".to_string(),
            organization: self.organization.clone(),
            project: self.project.clone(),
            collected_at: Utc::now(),
            max_builds,
            filter: filter.map(ToString::to_string),
            pipelines,
        }
    }

    async fn pipeline_report(
        &self,
        name: &str,
        pipeline_id: u64,
        max_builds: Option<u32>,
        filter: Option<&str>,
    ) -> PipelineReport {
        let mut warnings = Vec::new();

        let builds = match self
            .source
            .fetch_builds(&self.organization, &self.project, pipeline_id, max_builds)
            .await
        {
            Ok(builds) => builds,
            Err(e) => {
                let message = format!("Error fetching builds for pipeline {pipeline_id}: {e}");
                error!("{message}");
                warnings.push(message);
                Vec::new()
            }
        };

        let stale = self
            .markers
            .is_stale(name, builds.first().map(|build| build.id));
        if stale {
            warn!("New pipeline run available for {name}; cached data is outdated");
        }

        let builds = filter_by_build_number(builds, filter);
        let aggregation = aggregate(&self.source, &self.organization, &self.project, &builds).await;
        warnings.extend(aggregation.warnings);

        PipelineReport {
            name: name.to_string(),
            pipeline_id,
            link: pipeline_url(&self.web_base, &self.organization, &self.project, pipeline_id),
            stale,
            records: aggregation.records,
            warnings,
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::providers::azure::cache::DEFAULT_TTL;
    use crate::providers::azure::testing::{build, StubSource};

    fn provider(stub: StubSource) -> AzureProvider<StubSource> {
        AzureProvider::new(
            Arc::new(stub),
            "contoso".to_string(),
            "web".to_string(),
            IndexMap::from([("CI".to_string(), 12), ("Nightly".to_string(), 13)]),
            "https://dev.azure.com".to_string(),
            DEFAULT_TTL,
        )
    }

    fn sample_stub() -> StubSource {
        StubSource::new()
            .with_builds(
                12,
                vec![
                    build(3, "release_1.2", "2024-01-03T00:00:00Z"),
                    build(2, "nightly_1.1", "2024-01-02T00:00:00Z"),
                    build(1, "release_1.0", "2024-01-01T00:00:00Z"),
                ],
            )
            .with_builds(13, vec![build(10, "nightly_9", "2024-01-05T00:00:00Z")])
            .with_outcomes(1, 7, 3, 10)
            .with_outcomes(2, 1, 1, 4)
            .with_outcomes(3, 9, 1, 10)
            .with_outcomes(10, 0, 2, 2)
    }

    fn provider_stub(provider: &AzureProvider<StubSource>) -> &StubSource {
        provider.source.inner()
    }

    #[tokio::test]
    async fn collects_records_for_every_pipeline_in_order() {
        let provider = provider(sample_stub());

        let report = provider.collect_report(None, None).await;

        assert_eq!(report.organization, "contoso");
        assert_eq!(report.project, "web");
        let names: Vec<_> = report.pipelines.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["CI", "Nightly"]);

        let ci = &report.pipelines[0];
        let builds: Vec<_> = ci.records.iter().map(|r| r.build.as_str()).collect();
        assert_eq!(builds, vec!["release_1.2", "nightly_1.1", "release_1.0"]);
        assert_eq!(ci.records[2].pass_rate, 70.0);
        assert_eq!(ci.link, "https://dev.azure.com/contoso/web/_build?definitionId=12");
        assert!(!ci.stale);
        assert!(ci.warnings.is_empty());
        assert_eq!(report.total_builds(), 4);
    }

    #[tokio::test]
    async fn filter_narrows_builds_before_aggregation() {
        let provider = provider(sample_stub());

        let report = provider.collect_report(None, Some("release")).await;

        let ci = &report.pipelines[0];
        assert_eq!(ci.records.len(), 2);
        assert!(report.pipelines[1].records.is_empty());
        assert_eq!(report.filter.as_deref(), Some("release"));
        assert_eq!(provider_stub(&provider).outcome_calls(), 2);
    }

    #[tokio::test]
    async fn repeated_cycles_are_served_from_cache() {
        let provider = provider(sample_stub());

        let first = provider.collect_report(Some(10), None).await;
        let second = provider.collect_report(Some(10), None).await;

        assert_eq!(first.pipelines[0].records, second.pipelines[0].records);
        assert_eq!(provider_stub(&provider).build_calls(), 2);
        assert_eq!(provider_stub(&provider).outcome_calls(), 4);
    }

    #[tokio::test]
    async fn clear_cache_refetches_on_next_cycle() {
        let provider = provider(sample_stub());

        provider.collect_report(None, None).await;
        provider.clear_cache();
        provider.collect_report(None, None).await;

        assert_eq!(provider_stub(&provider).build_calls(), 4);
        assert_eq!(provider_stub(&provider).outcome_calls(), 8);
    }

    #[tokio::test]
    async fn failing_pipeline_does_not_blank_the_others() {
        let provider = provider(sample_stub().with_failing_pipeline(12));

        let report = provider.collect_report(None, None).await;

        let ci = &report.pipelines[0];
        assert!(ci.records.is_empty());
        assert_eq!(ci.warnings.len(), 1);
        assert!(ci.warnings[0].contains("pipeline 12"));
        assert_eq!(report.pipelines[1].records.len(), 1);
    }

    #[tokio::test]
    async fn failing_build_is_fetched_once_across_cycles() {
        let provider = provider(sample_stub().with_failing_build(1));

        for _ in 0..5 {
            let report = provider.collect_report(None, None).await;
            let ci = &report.pipelines[0];
            assert_eq!(ci.records[2].total, 0);
            assert_eq!(ci.warnings.len(), 1);
            assert!(ci.warnings[0].contains("build 1"));
        }

        assert_eq!(provider_stub(&provider).outcome_calls(), 4);
    }

    #[tokio::test]
    async fn flags_stale_pipeline_after_new_run_is_probed() {
        let provider = provider(sample_stub());
        provider.collect_report(None, None).await;

        provider_stub(&provider).set_builds(
            12,
            vec![
                build(4, "release_1.3", "2024-01-04T00:00:00Z"),
                build(3, "release_1.2", "2024-01-03T00:00:00Z"),
            ],
        );
        provider.staleness_detector().probe_once().await;

        let report = provider.collect_report(None, None).await;

        assert!(report.pipelines[0].stale);
        assert!(!report.pipelines[1].stale);
        assert_eq!(report.pipelines[0].records[0].build, "release_1.2");
        assert_eq!(report.stale_pipelines().count(), 1);

        provider.clear_cache();
        let refreshed = provider.collect_report(None, None).await;
        assert!(!refreshed.pipelines[0].stale);
        assert_eq!(refreshed.pipelines[0].records[0].build, "release_1.3");
    }

    #[tokio::test]
    async fn staleness_uses_newest_build_before_filtering() {
        let provider = provider(sample_stub());
        provider.markers.record("CI", 3);

        let report = provider.collect_report(None, Some("nightly")).await;

        assert!(!report.pipelines[0].stale);
        assert_eq!(report.pipelines[0].records.len(), 1);
    }
}
