//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting and invalidating the per-layer
//! spatial caches and their SQLite store.

pub mod clear;
pub mod invalidate;
pub mod stats;

pub use clear::{CacheClearOutput, CacheClearParams, clear_impl};
pub use invalidate::{CacheInvalidateOutput, CacheInvalidateParams, invalidate_impl};
pub use stats::{CacheStatsOutput, stats_impl};
