use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one render cycle over every pipeline of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardReport {
    pub provider: String,
    pub organization: String,
    pub project: String,
    pub collected_at: DateTime<Utc>,
    pub max_builds: Option<u32>,
    pub filter: Option<String>,
    pub pipelines: Vec<PipelineReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub name: String,
    pub pipeline_id: u64,
    pub link: String,
    /// Cached builds are behind the newest build seen by the live probe.
    pub stale: bool,
    pub records: Vec<AggregatedRecord>,
    pub warnings: Vec<String>,
}

/// Test pass/fail metrics of a single build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub datetime: Option<DateTime<Utc>>,
    pub build: String,
    pub passed: u64,
    pub failed: u64,
    pub total: u64,
    pub pass_rate: f64,
    pub fail_rate: f64,
    pub link: String,
}

impl DashboardReport {
    pub fn stale_pipelines(&self) -> impl Iterator<Item = &PipelineReport> {
        self.pipelines.iter().filter(|pipeline| pipeline.stale)
    }

    pub fn total_builds(&self) -> usize {
        self.pipelines.iter().map(|pipeline| pipeline.records.len()).sum()
    }
}
