use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::source::BuildSource;
use super::types::{BuildSummary, TestOutcomeTally};
use crate::error::{Result, TestLensError};

/// In-memory `BuildSource` that counts every call it receives.
#[derive(Default)]
pub struct StubSource {
    builds: Mutex<HashMap<u64, Vec<BuildSummary>>>,
    outcomes: Mutex<HashMap<u64, TestOutcomeTally>>,
    failing_pipelines: Mutex<HashSet<u64>>,
    failing_builds: Mutex<HashSet<u64>>,
    build_calls: AtomicUsize,
    outcome_calls: AtomicUsize,
    latest_calls: AtomicUsize,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builds(self, pipeline_id: u64, builds: Vec<BuildSummary>) -> Self {
        self.set_builds(pipeline_id, builds);
        self
    }

    pub fn with_outcomes(self, build_id: u64, passed: u64, failed: u64, total: u64) -> Self {
        self.outcomes.lock().unwrap().insert(
            build_id,
            TestOutcomeTally {
                passed,
                failed,
                total,
            },
        );
        self
    }

    pub fn with_failing_pipeline(self, pipeline_id: u64) -> Self {
        self.failing_pipelines.lock().unwrap().insert(pipeline_id);
        self
    }

    pub fn with_failing_build(self, build_id: u64) -> Self {
        self.failing_builds.lock().unwrap().insert(build_id);
        self
    }

    pub fn set_builds(&self, pipeline_id: u64, builds: Vec<BuildSummary>) {
        self.builds.lock().unwrap().insert(pipeline_id, builds);
    }

    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }

    pub fn outcome_calls(&self) -> usize {
        self.outcome_calls.load(Ordering::SeqCst)
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    fn builds_for(&self, pipeline_id: u64, max_builds: Option<u32>) -> Result<Vec<BuildSummary>> {
        if self.failing_pipelines.lock().unwrap().contains(&pipeline_id) {
            return Err(TestLensError::Api {
                status: 500,
                message: format!("pipeline {pipeline_id} unavailable"),
            });
        }
        let mut builds = self
            .builds
            .lock()
            .unwrap()
            .get(&pipeline_id)
            .cloned()
            .unwrap_or_default();
        if let Some(max) = max_builds {
            builds.truncate(max as usize);
        }
        Ok(builds)
    }
}

#[async_trait]
impl BuildSource for StubSource {
    async fn fetch_builds(
        &self,
        _organization: &str,
        _project: &str,
        pipeline_id: u64,
        max_builds: Option<u32>,
    ) -> Result<Vec<BuildSummary>> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        self.builds_for(pipeline_id, max_builds)
    }

    async fn fetch_test_outcomes(
        &self,
        _organization: &str,
        _project: &str,
        build_id: u64,
    ) -> Result<TestOutcomeTally> {
        self.outcome_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_builds.lock().unwrap().contains(&build_id) {
            return Err(TestLensError::Api {
                status: 404,
                message: format!("no results for build {build_id}"),
            });
        }
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .get(&build_id)
            .copied()
            .unwrap_or_default())
    }

    async fn fetch_latest_build_ids(
        &self,
        _organization: &str,
        _project: &str,
        pipeline_id: u64,
        max_builds: Option<u32>,
    ) -> Result<Vec<u64>> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .builds_for(pipeline_id, max_builds)?
            .into_iter()
            .map(|build| build.id)
            .collect())
    }
}

pub fn build(id: u64, build_number: &str, start_time: &str) -> BuildSummary {
    BuildSummary {
        id,
        build_number: build_number.to_string(),
        start_time: DateTime::parse_from_rfc3339(start_time)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        reason: "Manual".to_string(),
        source_branch: "refs/heads/main".to_string(),
        description: format!("#{build_number} • Manual (refs/heads/main)"),
        link: format!("https://dev.azure.com/contoso/web/_build/results?buildId={id}"),
    }
}
