//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (HAZARDMAP_*)
//! 2. TOML config file (if HAZARDMAP_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::cache::spatial::MAX_TTL_SECS;
use crate::cluster::ClusterConfig;
use crate::resolve::{DataMode, TierPlan, TierTimeouts};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (HAZARDMAP_*)
/// 2. TOML config file (if HAZARDMAP_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Endpoint of the primary (light, point payload) remote tier.
    ///
    /// Set via HAZARDMAP_PRIMARY_URL. The tier is skipped when unset.
    #[serde(default)]
    pub primary_url: Option<String>,

    /// Endpoint of the secondary remote tier.
    ///
    /// Set via HAZARDMAP_SECONDARY_URL.
    #[serde(default)]
    pub secondary_url: Option<String>,

    /// Local burnt-area bundle backing the burnt-area layer.
    ///
    /// Set via HAZARDMAP_BUNDLE_PATH. The layer has no data tier when unset.
    #[serde(default)]
    pub bundle_path: Option<PathBuf>,

    /// Path to the SQLite cache database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_primary_timeout_ms")]
    pub primary_timeout_ms: u64,

    #[serde(default = "default_secondary_timeout_ms")]
    pub secondary_timeout_ms: u64,

    /// Minimum spacing between calls to one remote endpoint.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Geohash length of cache keys.
    #[serde(default = "default_cache_precision")]
    pub cache_precision: usize,

    /// Entry lifetime, at most 30 days.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Data policy at startup: `live`, `strict_live` or `demo`.
    #[serde(default)]
    pub mode: DataMode,

    #[serde(default = "default_cluster_radius_px")]
    pub cluster_radius_px: f64,

    #[serde(default = "default_max_cluster_zoom")]
    pub max_cluster_zoom: f64,

    #[serde(default = "default_zoom_hysteresis")]
    pub zoom_hysteresis: f64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./hazardmap-cache.sqlite")
}

fn default_user_agent() -> String {
    "hazardmap/0.1".into()
}

fn default_primary_timeout_ms() -> u64 {
    8_000
}

fn default_secondary_timeout_ms() -> u64 {
    15_000
}

fn default_min_request_interval_ms() -> u64 {
    1_000
}

fn default_cache_max_entries() -> usize {
    crate::cache::spatial::DEFAULT_MAX_ENTRIES
}

fn default_cache_precision() -> usize {
    crate::cache::spatial::DEFAULT_PRECISION
}

fn default_cache_ttl_secs() -> u64 {
    crate::cache::spatial::DEFAULT_TTL_SECS as u64
}

fn default_cluster_radius_px() -> f64 {
    crate::cluster::DEFAULT_RADIUS_PX
}

fn default_max_cluster_zoom() -> f64 {
    crate::cluster::DEFAULT_MAX_CLUSTER_ZOOM
}

fn default_zoom_hysteresis() -> f64 {
    crate::cluster::DEFAULT_HYSTERESIS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            primary_url: None,
            secondary_url: None,
            bundle_path: None,
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            primary_timeout_ms: default_primary_timeout_ms(),
            secondary_timeout_ms: default_secondary_timeout_ms(),
            min_request_interval_ms: default_min_request_interval_ms(),
            cache_max_entries: default_cache_max_entries(),
            cache_precision: default_cache_precision(),
            cache_ttl_secs: default_cache_ttl_secs(),
            mode: DataMode::default(),
            cluster_radius_px: default_cluster_radius_px(),
            max_cluster_zoom: default_max_cluster_zoom(),
            zoom_hysteresis: default_zoom_hysteresis(),
        }
    }
}

impl AppConfig {
    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }

    pub fn secondary_timeout(&self) -> Duration {
        Duration::from_millis(self.secondary_timeout_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// Cache settings. The TTL is clamped to [`MAX_TTL_SECS`]; `validate`
    /// rejects anything longer.
    pub fn cache_config(&self) -> CacheConfig {
        let ttl_secs = i64::try_from(self.cache_ttl_secs).unwrap_or(MAX_TTL_SECS).min(MAX_TTL_SECS);
        CacheConfig {
            precision: self.cache_precision,
            max_entries: self.cache_max_entries,
            ttl: chrono::Duration::seconds(ttl_secs),
        }
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            radius_px: self.cluster_radius_px,
            max_cluster_zoom: self.max_cluster_zoom,
            hysteresis: self.zoom_hysteresis,
            ..Default::default()
        }
    }

    /// Default tier order with the configured timeouts.
    pub fn tier_plan(&self) -> TierPlan {
        TierPlan {
            timeouts: TierTimeouts { primary: self.primary_timeout(), secondary: self.secondary_timeout() },
            ..Default::default()
        }
    }

    /// Tier plan for polygon layers: every remote tier gets the heavier
    /// secondary budget.
    pub fn polygon_tier_plan(&self) -> TierPlan {
        TierPlan {
            timeouts: TierTimeouts { primary: self.secondary_timeout(), secondary: self.secondary_timeout() },
            ..Default::default()
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `HAZARDMAP_`
    /// 2. TOML file from `HAZARDMAP_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("HAZARDMAP_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("HAZARDMAP_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
