//! Bikeshare Relay - serve a bikeshare station feed as cached GeoJSON
//!
//! An HTTP server that fetches the upstream station feed at most once per
//! refetch interval, converts it to a GeoJSON FeatureCollection and serves it
//! with permissive CORS headers.

use std::io;
use std::process;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bikeshare_relay::cache::RefreshCache;
use bikeshare_relay::cli::{Cli, RelayConfig};
use bikeshare_relay::data::FeedClient;
use bikeshare_relay::server;

/// Installs the log subscriber, honouring `RUST_LOG` and defaulting to `info`
fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let config = match RelayConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(2);
        }
    };

    setup_tracing();

    let client = Arc::new(
        FeedClient::new(config.feed_url.clone(), config.upstream_timeout).map_err(io::Error::other)?,
    );

    info!(
        host = %config.host,
        port = config.port,
        feed_url = client.feed_url(),
        refetch_interval_ms = config.refresh.refetch_interval_millis(),
        "starting bikeshare relay"
    );

    let cache = web::Data::new(RefreshCache::new(client, config.refresh.clone()));

    let mut builder = HttpServer::new(move || {
        App::new()
            .app_data(cache.clone())
            .default_service(web::to(server::relay))
    });
    if let Some(workers) = config.workers {
        builder = builder.workers(workers);
    }

    builder.bind((config.host.as_str(), config.port))?.run().await
}
