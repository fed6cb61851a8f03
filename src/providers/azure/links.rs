/// Builds a clickable link to a build's results page.
///
/// # Arguments
///
/// * `web_base` - Azure DevOps web base URL (e.g., <https://dev.azure.com>)
/// * `organization` - Organization name (e.g., "contoso")
/// * `project` - Project name (e.g., "web")
/// * `build_id` - Numeric build ID
///
/// # Returns
///
/// URL to the build results (e.g., <https://dev.azure.com/contoso/web/_build/results?buildId=123>)
pub fn build_results_url(web_base: &str, organization: &str, project: &str, build_id: u64) -> String {
    let base = web_base.trim_end_matches('/');
    format!("{base}/{organization}/{project}/_build/results?buildId={build_id}")
}

/// Builds a link to a pipeline definition's run history.
pub fn pipeline_url(web_base: &str, organization: &str, project: &str, pipeline_id: u64) -> String {
    let base = web_base.trim_end_matches('/');
    format!("{base}/{organization}/{project}/_build?definitionId={pipeline_id}")
}
