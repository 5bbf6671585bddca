//! Tiered data resolution.
//!
//! A query walks a prioritized list of tiers (remote primary, remote
//! secondary, spatial cache, synthetic fallback) and stops at the first
//! success. Tier failures never escape; only exhaustion of the whole chain
//! produces an `Offline` envelope.

pub mod orchestrator;
pub mod remote;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::geo::BoundingBox;

pub use orchestrator::FallbackOrchestrator;
pub use remote::{QueryFilters, RemoteDataClient, RemoteError, SyntheticSource};

/// Where a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    Cached,
    Synthetic,
    Offline,
}

/// One data source in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    PrimaryRemote,
    SecondaryRemote,
    SpatialCache,
    SyntheticFallback,
}

impl Tier {
    pub const DEFAULT_ORDER: [Tier; 4] =
        [Tier::PrimaryRemote, Tier::SecondaryRemote, Tier::SpatialCache, Tier::SyntheticFallback];

    pub fn is_remote(&self) -> bool {
        matches!(self, Tier::PrimaryRemote | Tier::SecondaryRemote)
    }

    /// Provenance a success from this tier carries.
    pub fn provenance(&self) -> Provenance {
        match self {
            Tier::PrimaryRemote | Tier::SecondaryRemote => Provenance::Live,
            Tier::SpatialCache => Provenance::Cached,
            Tier::SyntheticFallback => Provenance::Synthetic,
        }
    }
}

/// Data availability policy.
///
/// One value instead of separate "offline" and "demo" switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    /// Configured order; synthetic data allowed as a last resort.
    #[default]
    Live,
    /// Synthetic tier removed; exhaustion yields `Offline`.
    StrictLive,
    /// Synthetic data only.
    Demo,
}

impl DataMode {
    /// The tier order this mode permits, derived from the configured order.
    pub fn tier_order(&self, configured: &[Tier]) -> Vec<Tier> {
        match self {
            DataMode::Live => configured.to_vec(),
            DataMode::StrictLive => configured.iter().copied().filter(|t| *t != Tier::SyntheticFallback).collect(),
            DataMode::Demo => vec![Tier::SyntheticFallback],
        }
    }
}

impl fmt::Display for DataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataMode::Live => "live",
            DataMode::StrictLive => "strict_live",
            DataMode::Demo => "demo",
        };
        f.write_str(s)
    }
}

impl FromStr for DataMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(DataMode::Live),
            "strict_live" => Ok(DataMode::StrictLive),
            "demo" => Ok(DataMode::Demo),
            other => Err(Error::InvalidInput(format!("unknown data mode: {other}"))),
        }
    }
}

/// Per-tier time budgets for remote tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTimeouts {
    /// Light point payloads (default 8s).
    pub primary: Duration,
    /// Heavier polygon payloads (default 15s).
    pub secondary: Duration,
}

impl Default for TierTimeouts {
    fn default() -> Self {
        Self { primary: Duration::from_secs(8), secondary: Duration::from_secs(15) }
    }
}

impl TierTimeouts {
    pub fn for_tier(&self, tier: Tier) -> Option<Duration> {
        match tier {
            Tier::PrimaryRemote => Some(self.primary),
            Tier::SecondaryRemote => Some(self.secondary),
            Tier::SpatialCache | Tier::SyntheticFallback => None,
        }
    }
}

/// Tier order plus timeouts for one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPlan {
    pub order: Vec<Tier>,
    pub timeouts: TierTimeouts,
}

impl Default for TierPlan {
    fn default() -> Self {
        Self { order: Tier::DEFAULT_ORDER.to_vec(), timeouts: TierTimeouts::default() }
    }
}

impl TierPlan {
    /// Restrict this plan to what `mode` permits.
    pub fn for_mode(&self, mode: DataMode) -> Self {
        Self { order: mode.tier_order(&self.order), timeouts: self.timeouts }
    }
}

/// A data request for one viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardQuery {
    pub query_class: String,
    pub bounds: BoundingBox,
    #[serde(default)]
    pub filters: QueryFilters,
}

impl HazardQuery {
    pub fn new(query_class: impl Into<String>, bounds: BoundingBox) -> Self {
        Self { query_class: query_class.into(), bounds, filters: QueryFilters::new() }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one tier attempt, as reported in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Error(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: Tier,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

/// Expired cache data offered after every tier failed. Always stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleSnapshot<T> {
    pub payload: T,
    pub observed_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

/// The result of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    /// `None` only when `provenance` is `Offline`.
    pub payload: Option<T>,
    pub provenance: Provenance,
    pub observed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_good: Option<StaleSnapshot<T>>,
    #[serde(default)]
    pub attempts: Vec<TierAttempt>,
}

impl<T> DataEnvelope<T> {
    /// Every configured tier failed.
    pub fn is_exhausted(&self) -> bool {
        self.provenance == Provenance::Offline
    }

    /// The tier that produced the payload, if any.
    pub fn resolved_tier(&self) -> Option<Tier> {
        self.attempts.iter().find(|a| a.outcome == AttemptOutcome::Success).map(|a| a.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_live_drops_synthetic() {
        let order = DataMode::StrictLive.tier_order(&Tier::DEFAULT_ORDER);
        assert_eq!(order, vec![Tier::PrimaryRemote, Tier::SecondaryRemote, Tier::SpatialCache]);
    }

    #[test]
    fn test_live_keeps_configured_order() {
        let custom = [Tier::SpatialCache, Tier::PrimaryRemote];
        assert_eq!(DataMode::Live.tier_order(&custom), custom.to_vec());
    }

    #[test]
    fn test_demo_is_synthetic_only() {
        assert_eq!(DataMode::Demo.tier_order(&Tier::DEFAULT_ORDER), vec![Tier::SyntheticFallback]);
    }

    #[test]
    fn test_data_mode_parse_and_display() {
        for mode in [DataMode::Live, DataMode::StrictLive, DataMode::Demo] {
            assert_eq!(mode.to_string().parse::<DataMode>().unwrap(), mode);
        }
        assert!("offline".parse::<DataMode>().is_err());
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = TierTimeouts::default();
        assert_eq!(timeouts.for_tier(Tier::PrimaryRemote), Some(Duration::from_secs(8)));
        assert_eq!(timeouts.for_tier(Tier::SecondaryRemote), Some(Duration::from_secs(15)));
        assert_eq!(timeouts.for_tier(Tier::SpatialCache), None);
    }

    #[test]
    fn test_attempt_outcome_serialization() {
        let json = serde_json::to_string(&AttemptOutcome::Error("503".into())).unwrap();
        assert_eq!(json, r#"{"kind":"error","reason":"503"}"#);
        let json = serde_json::to_string(&AttemptOutcome::Timeout).unwrap();
        assert_eq!(json, r#"{"kind":"timeout"}"#);
    }
}
