//! Command-line interface parsing for the bikeshare relay
//!
//! Every flag can also be set through a `RELAY_*` environment variable, so the
//! relay can be configured entirely from its deployment environment.

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::data::DEFAULT_FEED_URL;
use crate::refresh::RefreshConfig;

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A refetch interval of zero would refetch on every request
    #[error("Invalid refetch interval: must be at least 1 second")]
    ZeroRefetchInterval,

    /// A zero timeout would fail every upstream request
    #[error("Invalid upstream timeout: must be at least 1 second")]
    ZeroUpstreamTimeout,

    /// The HTTP server needs at least one worker
    #[error("Invalid worker count: must be at least 1")]
    ZeroWorkers,
}

/// Bikeshare relay - serve a station feed as cached GeoJSON
#[derive(Parser, Debug)]
#[command(name = "bikeshare-relay")]
#[command(about = "Serve a bikeshare station feed as cached GeoJSON")]
#[command(version)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "RELAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Upstream station feed URL
    #[arg(long, env = "RELAY_FEED_URL", default_value = DEFAULT_FEED_URL)]
    pub feed_url: String,

    /// Seconds a fetched feed is served before the next request refetches it
    #[arg(long, env = "RELAY_REFETCH_INTERVAL_SECS", default_value_t = 30)]
    pub refetch_interval_secs: u64,

    /// Seconds to wait for the upstream feed before answering 504
    #[arg(long, env = "RELAY_UPSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    pub upstream_timeout_secs: u64,

    /// Number of HTTP worker threads (defaults to one per CPU)
    #[arg(long, env = "RELAY_WORKERS")]
    pub workers: Option<usize>,
}

/// Configuration derived from CLI arguments for server startup
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to listen on
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Upstream station feed URL
    pub feed_url: String,
    /// Cache refresh policy
    pub refresh: RefreshConfig,
    /// Upper bound on one upstream fetch
    pub upstream_timeout: Duration,
    /// HTTP worker count, `None` for the server default
    pub workers: Option<usize>,
}

impl RelayConfig {
    /// Creates a RelayConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(RelayConfig)` with validated settings
    /// * `Err(ConfigError)` if a duration or the worker count is zero
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        if cli.refetch_interval_secs == 0 {
            return Err(ConfigError::ZeroRefetchInterval);
        }
        if cli.upstream_timeout_secs == 0 {
            return Err(ConfigError::ZeroUpstreamTimeout);
        }
        if cli.workers == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }

        Ok(RelayConfig {
            host: cli.host.clone(),
            port: cli.port,
            feed_url: cli.feed_url.clone(),
            refresh: RefreshConfig {
                refetch_interval: Duration::from_secs(cli.refetch_interval_secs),
            },
            upstream_timeout: Duration::from_secs(cli.upstream_timeout_secs),
            workers: cli.workers,
        })
    }
}
