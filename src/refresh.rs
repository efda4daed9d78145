//! Background feed refresh
//!
//! A refresh cycle fetches the feed, lets the cache store the outcome, and hands
//! that same outcome to whoever awaits it. The cycle is spawned onto the tokio
//! runtime, so it runs to completion even if the request that started it goes away.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use geojson::FeatureCollection;
use tracing::{info, warn};

use crate::data::FeedError;

/// Outcome of one refresh cycle, cheap to clone to every waiter
pub type RefreshResult = Result<Arc<FeatureCollection>, Arc<FeedError>>;

/// Configuration for the refresh policy
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// How long a fetched collection is served before the next request refetches
    pub refetch_interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refetch_interval: Duration::from_secs(30),
        }
    }
}

impl RefreshConfig {
    /// Refetch interval in whole milliseconds, saturating at `i64::MAX`
    pub fn refetch_interval_millis(&self) -> i64 {
        i64::try_from(self.refetch_interval.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Handle to an in-flight refresh cycle
#[derive(Clone)]
pub struct RefreshTask {
    cycle: Shared<BoxFuture<'static, RefreshResult>>,
}

impl RefreshTask {
    /// Spawns a refresh cycle
    ///
    /// # Arguments
    /// * `fetch` - Future producing the transformed feed
    /// * `on_complete` - Called once with the outcome, before any waiter sees it
    pub fn spawn<F>(
        fetch: BoxFuture<'static, Result<FeatureCollection, FeedError>>,
        on_complete: F,
    ) -> Self
    where
        F: FnOnce(&RefreshResult) + Send + 'static,
    {
        let cycle = async move {
            let started = Instant::now();
            let result = fetch.await.map(Arc::new).map_err(Arc::new);

            match &result {
                Ok(collection) => info!(
                    features = collection.features.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "refreshed station feed"
                ),
                Err(err) => warn!(
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "station feed refresh failed"
                ),
            }

            on_complete(&result);
            result
        }
        .boxed()
        .shared();

        tokio::spawn(cycle.clone());

        Self { cycle }
    }

    /// Waits for the cycle to finish
    pub async fn wait(self) -> RefreshResult {
        self.cycle.await
    }
}
