use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::source::BuildSource;

/// Newest build id per pipeline name, as seen by the uncached probe.
///
/// Cheap to clone; all clones share the same map. Entries are overwritten in
/// place and never expire.
#[derive(Debug, Clone, Default)]
pub struct StalenessMarkers {
    latest: Arc<RwLock<HashMap<String, u64>>>,
}

impl StalenessMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, pipeline: &str, build_id: u64) {
        self.latest
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pipeline.to_string(), build_id);
    }

    pub fn latest(&self, pipeline: &str) -> Option<u64> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pipeline)
            .copied()
    }

    /// Whether the cached newest build lags behind the probed one.
    ///
    /// False when nothing has been probed yet for this pipeline or when the
    /// cached list is empty.
    pub fn is_stale(&self, pipeline: &str, cached_latest: Option<u64>) -> bool {
        match (self.latest(pipeline), cached_latest) {
            (Some(live), Some(cached)) => live != cached,
            _ => false,
        }
    }
}

/// Periodically probes the newest build of every pipeline, bypassing the cache.
pub struct StalenessDetector<S> {
    source: Arc<S>,
    organization: String,
    project: String,
    pipelines: IndexMap<String, u64>,
    markers: StalenessMarkers,
}

impl<S> StalenessDetector<S>
where
    S: BuildSource + 'static,
{
    /// # Arguments
    ///
    /// * `source` - Uncached source to probe
    /// * `organization` - Azure DevOps organization
    /// * `project` - Azure DevOps project
    /// * `pipelines` - Pipeline name to definition id
    /// * `markers` - Store updated by every probe
    pub fn new(
        source: Arc<S>,
        organization: String,
        project: String,
        pipelines: IndexMap<String, u64>,
        markers: StalenessMarkers,
    ) -> Self {
        Self {
            source,
            organization,
            project,
            pipelines,
            markers,
        }
    }

    /// Probes every pipeline once and records the newest build ids.
    ///
    /// A pipeline with no builds, or whose probe fails, keeps its previous marker.
    pub async fn probe_once(&self) {
        let probes = self.pipelines.iter().map(|(name, &pipeline_id)| async move {
            let result = self
                .source
                .fetch_latest_build_ids(&self.organization, &self.project, pipeline_id, Some(1))
                .await;
            (name, result)
        });

        for (name, result) in futures::future::join_all(probes).await {
            match result {
                Ok(ids) => {
                    if let Some(&latest) = ids.first() {
                        debug!("Latest build for pipeline {name}: {latest}");
                        self.markers.record(name, latest);
                    }
                }
                Err(e) => warn!("Failed to probe latest build for pipeline {name}: {e}"),
            }
        }
    }

    /// Starts probing on a timer, with the first probe right away.
    ///
    /// Returns `None` without spawning anything when `interval` is absent or zero.
    pub fn spawn(self, interval: Option<Duration>) -> Option<JoinHandle<()>> {
        let interval = match interval {
            Some(interval) if !interval.is_zero() => interval,
            _ => {
                info!("Staleness detection disabled (no refresh interval)");
                return None;
            }
        };

        info!(
            "Checking {} pipelines for new runs every {}s",
            self.pipelines.len(),
            interval.as_secs_f64()
        );

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.probe_once().await;
            }
        }))
    }
}
