//! Single-slot refresh cache for the station feed
//!
//! Holds the last transformed FeatureCollection and the time the last fetch was
//! started. The timestamp is advanced when a fetch is *started*, not when it
//! finishes, so a burst of stale requests triggers exactly one upstream call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use geojson::FeatureCollection;
use tracing::{debug, warn};

use crate::data::FeedSource;
use crate::refresh::{RefreshConfig, RefreshTask};

/// Cached value plus the time the last fetch was started
#[derive(Debug, Default)]
struct CacheEntry {
    /// Epoch millis at which the last refresh cycle was started, `None` before the first
    last_fetch_time_millis: Option<i64>,
    /// Last successfully transformed feed, `None` until the first fetch completes
    value: Option<Arc<FeatureCollection>>,
}

/// Read-only copy of the cache state
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    /// Epoch millis at which the last refresh cycle was started, 0 if none has
    pub last_fetch_time_millis: i64,
    /// Last successfully transformed feed
    pub value: Option<Arc<FeatureCollection>>,
}

/// What a request should be answered with
pub enum Outcome {
    /// Cache was fresh; answer immediately with this value
    Cached(Option<Arc<FeatureCollection>>),
    /// Cache was stale; a refresh was started and the request should await it
    Refreshing(RefreshTask),
}

/// Time-bounded cache guarding the upstream feed
///
/// The staleness check and the timestamp update happen under one lock, which is
/// never held across an await. Requests arriving while a refresh is in flight
/// see a fresh cache and are served the previous value.
pub struct RefreshCache {
    /// Upstream the refresh cycle fetches from
    source: Arc<dyn FeedSource>,
    /// Staleness window
    refetch_interval_millis: i64,
    /// Shared with in-flight refresh cycles so they can store their result
    entry: Arc<Mutex<CacheEntry>>,
}

impl RefreshCache {
    /// Creates an empty cache: no value, no fetch started yet
    pub fn new(source: Arc<dyn FeedSource>, config: RefreshConfig) -> Self {
        Self {
            source,
            refetch_interval_millis: config.refetch_interval_millis(),
            entry: Arc::new(Mutex::new(CacheEntry::default())),
        }
    }

    /// The staleness window in milliseconds
    pub fn refetch_interval_millis(&self) -> i64 {
        self.refetch_interval_millis
    }

    /// Copies out the current timestamp and value
    pub fn snapshot(&self) -> CacheSnapshot {
        let entry = lock(&self.entry);
        CacheSnapshot {
            last_fetch_time_millis: entry.last_fetch_time_millis.unwrap_or(0),
            value: entry.value.clone(),
        }
    }

    /// Decides how to answer a request arriving at `now_millis`
    ///
    /// The cache is stale when no fetch has ever been started, or when
    /// `now_millis` is strictly past `last_fetch_time_millis + refetch_interval`.
    /// A stale cache is stamped with `now_millis` before the fetch starts.
    ///
    /// If the refresh fails, the stamp is put back to its previous value so the
    /// next request can retry, unless another refresh has stamped it since.
    pub fn handle_request(&self, now_millis: i64) -> Outcome {
        let mut entry = lock(&self.entry);

        if let Some(last_fetch_time_millis) = entry.last_fetch_time_millis {
            let fresh_until = last_fetch_time_millis.saturating_add(self.refetch_interval_millis);
            if now_millis <= fresh_until {
                debug!(now_millis, fresh_until, "serving cached station feed");
                return Outcome::Cached(entry.value.clone());
            }
        }

        let previous_fetch_time_millis = entry.last_fetch_time_millis;
        entry.last_fetch_time_millis = Some(now_millis);
        drop(entry);

        debug!(now_millis, ?previous_fetch_time_millis, "station feed is stale, refreshing");

        let state = Arc::clone(&self.entry);
        let task = RefreshTask::spawn(self.source.fetch(), move |result| {
            let mut entry = lock(&state);
            match result {
                Ok(collection) => entry.value = Some(Arc::clone(collection)),
                Err(_) if entry.last_fetch_time_millis == Some(now_millis) => {
                    warn!(
                        restored_millis = ?previous_fetch_time_millis,
                        "rolling back fetch time after failed refresh"
                    );
                    entry.last_fetch_time_millis = previous_fetch_time_millis;
                }
                Err(_) => {}
            }
        });

        Outcome::Refreshing(task)
    }
}

fn lock(entry: &Mutex<CacheEntry>) -> MutexGuard<'_, CacheEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}
