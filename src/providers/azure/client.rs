use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use url::Url;

use super::source::BuildSource;
use super::types::{BuildList, BuildSummary, TestOutcomeTally};
use crate::auth::{basic_auth_header, Token};
use crate::error::{Result, TestLensError};

const BUILDS_API_VERSION: &str = "7.1-preview.7";
const TEST_RESULTS_API_VERSION: &str = "7.1-preview.1";

/// Azure DevOps REST client for build listings and test results.
///
/// Every request carries the basic-auth header derived from the token and
/// is bounded by the configured timeout. No retries happen here.
pub struct AzureClient {
    client: Client,
    api_url: Url,
    test_results_url: Url,
}

impl AzureClient {
    /// Creates a client for the given API hosts.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Build API host (e.g., <https://dev.azure.com>), also used for web links
    /// * `test_results_base` - Test results API host (e.g., <https://vstmr.dev.azure.com>)
    /// * `token` - Personal access token
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either base URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(
        api_base: &str,
        test_results_base: &str,
        token: &Token,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("testlens/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(AUTHORIZATION, basic_auth_header(token));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TestLensError::Config(format!("Failed to create HTTP client: {e}")))?;

        let api_url = parse_base_url(api_base)?;
        let test_results_url = parse_base_url(test_results_base)?;

        Ok(Self {
            client,
            api_url,
            test_results_url,
        })
    }

    /// Base URL used for clickable links.
    pub fn web_base(&self) -> &str {
        self.api_url.as_str().trim_end_matches('/')
    }

    /// Construct the builds listing URL for one pipeline definition.
    pub fn builds_url(
        &self,
        organization: &str,
        project: &str,
        pipeline_id: u64,
        max_builds: Option<u32>,
    ) -> Result<Url> {
        let mut url = project_url(
            &self.api_url,
            organization,
            project,
            &["_apis", "build", "builds"],
        )?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("definitions", &pipeline_id.to_string());
            if let Some(max_builds) = max_builds {
                query.append_pair("maxBuildsPerDefinition", &max_builds.to_string());
            }
            query.append_pair("api-version", BUILDS_API_VERSION);
        }
        Ok(url)
    }

    /// Construct the test results URL for one build.
    pub fn test_results_url(&self, organization: &str, project: &str, build_id: u64) -> Result<Url> {
        let mut url = project_url(
            &self.test_results_url,
            organization,
            project,
            &["_apis", "testresults", "resultsbybuild"],
        )?;
        url.query_pairs_mut()
            .append_pair("buildId", &build_id.to_string())
            .append_pair("api-version", TEST_RESULTS_API_VERSION);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        debug!("GET {url}");

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(TestLensError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl BuildSource for AzureClient {
    async fn fetch_builds(
        &self,
        organization: &str,
        project: &str,
        pipeline_id: u64,
        max_builds: Option<u32>,
    ) -> Result<Vec<BuildSummary>> {
        let url = self.builds_url(organization, project, pipeline_id, max_builds)?;
        let list: BuildList = serde_json::from_value(self.get_json(url).await?)?;

        debug!(
            "Fetched {} builds for pipeline {pipeline_id}",
            list.value.len()
        );

        Ok(list
            .value
            .into_iter()
            .map(|raw| BuildSummary::from_raw(raw, self.web_base(), organization, project))
            .collect())
    }

    async fn fetch_test_outcomes(
        &self,
        organization: &str,
        project: &str,
        build_id: u64,
    ) -> Result<TestOutcomeTally> {
        let url = self.test_results_url(organization, project, build_id)?;
        let body = self.get_json(url).await?;
        TestOutcomeTally::from_response(&body)
    }
}

fn parse_base_url(base: &str) -> Result<Url> {
    let url = Url::parse(base).map_err(|e| TestLensError::Config(format!("Invalid base URL {base}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(TestLensError::Config(format!("Invalid base URL: {base}")));
    }
    Ok(url)
}

/// Appends `{organization}/{project}/{segments...}` to a base URL, percent-encoding each part.
fn project_url(base: &Url, organization: &str, project: &str, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| TestLensError::Config(format!("Invalid base URL: {base}")))?
        .pop_if_empty()
        .push(organization)
        .push(project)
        .extend(segments);
    Ok(url)
}
