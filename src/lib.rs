//! Bikeshare Relay Library
//!
//! This module exposes the feed client, the refresh cache and the HTTP handler
//! for use by the binary and in integration tests.

pub mod cache;
pub mod cli;
pub mod data;
pub mod refresh;
pub mod server;
