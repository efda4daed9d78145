//! Cache module for the transformed station feed
//!
//! This module provides a single-slot, in-memory cache keyed only by elapsed
//! time. A request past the staleness window starts a refresh; requests inside
//! the window are answered from memory, even while a refresh is in flight.

mod controller;

pub use controller::{CacheSnapshot, Outcome, RefreshCache};
