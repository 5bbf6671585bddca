//! Tier implementations for hazardmap.
//!
//! This crate provides the hazard payload types and the concrete tiers the
//! core orchestrator consults: an HTTP remote tier, a local burnt-area bundle
//! tier, and deterministic demo data.

pub mod bundle;
pub mod hazards;
pub mod http;
pub mod synthetic;

pub use bundle::{BundleTierClient, BurntAreaBundle};
pub use hazards::{BurntArea, BurntAreaSet, Hotspot, HotspotSet};
pub use http::{ClientError, HttpTierClient, HttpTierConfig};
pub use synthetic::DemoHotspots;
