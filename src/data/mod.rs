//! Core data models for the bikeshare relay
//!
//! The upstream feed is kept as loosely typed JSON: stations are passed through
//! to GeoJSON untouched, so only the coordinate fields are ever inspected.

pub mod feed;

pub use feed::{transform_feed, FeedClient, FeedError, FeedSource, DEFAULT_FEED_URL};

/// One upstream station, exactly as the feed reported it
pub type StationRecord = geojson::JsonObject;
