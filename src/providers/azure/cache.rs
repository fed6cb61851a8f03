use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::time::Instant;

use super::source::BuildSource;
use super::types::{BuildSummary, TestOutcomeTally};
use crate::error::{Result, TestLensError};

/// Default time-to-live of cached API responses (one hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// In-memory map whose entries expire a fixed time after insertion.
///
/// Expiry is lazy: an entry is only dropped when it is looked up after its
/// TTL has elapsed. Lookup and eviction happen under the same lock, so a
/// reader never observes a half-expired entry.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + std::fmt::Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value for `key` if it is younger than the TTL.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!("Cache entry expired for {key:?}");
            entries.remove(key);
        }
        None
    }

    /// Stores `value` under `key`, restarting its TTL.
    pub fn insert(&self, key: K, value: V) {
        self.entries().insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn entry_count(&self) -> usize {
        self.entries().len()
    }
}

/// Outcome of a fetch as stored in the cache: the value, or the error message.
pub type Fetched<T> = std::result::Result<T, String>;

impl<K, T> TtlCache<K, Fetched<T>>
where
    K: Eq + Hash + std::fmt::Debug,
    T: Clone,
{
    /// Returns the cached outcome or runs `fetch` and caches whatever it returns.
    ///
    /// A failure is stored like a success and replayed as
    /// [`TestLensError::CachedFailure`] until it expires or the cache is
    /// cleared, so a failing request costs one call per TTL. Concurrent
    /// misses for the same key are not coalesced; each one runs `fetch`.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(outcome) = self.get(&key) {
            debug!("Cache hit for {key:?}");
            return outcome.map_err(TestLensError::CachedFailure);
        }

        debug!("Cache miss for {key:?}");
        match fetch().await {
            Ok(value) => {
                self.insert(key, Ok(value.clone()));
                Ok(value)
            }
            Err(e) => {
                self.insert(key, Err(e.to_string()));
                Err(e)
            }
        }
    }
}

/// Cache key of a build listing: the full argument tuple of the call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildsKey {
    pub organization: String,
    pub project: String,
    pub pipeline_id: u64,
    pub max_builds: Option<u32>,
}

/// Cache key of a test outcome tally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutcomesKey {
    pub organization: String,
    pub project: String,
    pub build_id: u64,
}

/// Memoizing wrapper around a `BuildSource`.
///
/// Build listings and test outcome tallies are cached separately, both with
/// the same TTL, and [`CachedSource::clear`] empties both at once. Failed
/// fetches are cached too. The latest-build-ids probe always goes straight
/// to the wrapped source.
pub struct CachedSource<S> {
    inner: Arc<S>,
    builds: TtlCache<BuildsKey, Fetched<Vec<BuildSummary>>>,
    outcomes: TtlCache<OutcomesKey, Fetched<TestOutcomeTally>>,
}

impl<S: BuildSource> CachedSource<S> {
    pub fn new(inner: Arc<S>, ttl: Duration) -> Self {
        Self {
            inner,
            builds: TtlCache::new(ttl),
            outcomes: TtlCache::new(ttl),
        }
    }

    /// The uncached source behind this cache.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Empties both caches; the next access for any key fetches again.
    pub fn clear(&self) {
        let builds = self.builds.entry_count();
        let outcomes = self.outcomes.entry_count();
        self.builds.clear();
        self.outcomes.clear();
        info!("Cache cleared ({builds} build listings, {outcomes} test result tallies)");
    }
}

#[async_trait]
impl<S: BuildSource> BuildSource for CachedSource<S> {
    async fn fetch_builds(
        &self,
        organization: &str,
        project: &str,
        pipeline_id: u64,
        max_builds: Option<u32>,
    ) -> Result<Vec<BuildSummary>> {
        let key = BuildsKey {
            organization: organization.to_string(),
            project: project.to_string(),
            pipeline_id,
            max_builds,
        };
        self.builds
            .get_or_fetch(key, || {
                self.inner
                    .fetch_builds(organization, project, pipeline_id, max_builds)
            })
            .await
    }

    async fn fetch_test_outcomes(
        &self,
        organization: &str,
        project: &str,
        build_id: u64,
    ) -> Result<TestOutcomeTally> {
        let key = OutcomesKey {
            organization: organization.to_string(),
            project: project.to_string(),
            build_id,
        };
        self.outcomes
            .get_or_fetch(key, || {
                self.inner.fetch_test_outcomes(organization, project, build_id)
            })
            .await
    }

    async fn fetch_latest_build_ids(
        &self,
        organization: &str,
        project: &str,
        pipeline_id: u64,
        max_builds: Option<u32>,
    ) -> Result<Vec<u64>> {
        self.inner
            .fetch_latest_build_ids(organization, project, pipeline_id, max_builds)
            .await
    }
}
