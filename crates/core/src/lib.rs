//! Core types and shared functionality for hazardmap.
//!
//! This crate provides:
//! - Geohash codec and coordinate types
//! - Spatial cache with SQLite persistence
//! - Request sequencing and tiered fallback resolution
//! - Zoom-aware clustering
//! - The map session tying these together
//! - Unified error types and configuration

pub mod cache;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod resolve;
pub mod sequencer;

pub use cache::{CacheMetadata, CacheStore, CellInfo, SpatialCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cluster::{Cluster, ClusterConfig, ClusterableFeature, FeatureSource, SpatialClusterer};
pub use config::{AppConfig, ConfigError};
pub use engine::{CommitOutcome, CommittedView, MapSession};
pub use error::Error;
pub use geo::{BoundingBox, GeoPoint};
pub use resolve::{DataEnvelope, DataMode, FallbackOrchestrator, HazardQuery, Provenance, Tier, TierPlan};
pub use sequencer::{RequestSequencer, RequestToken};
