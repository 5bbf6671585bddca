//! Shared server state: one map session per hazard layer.

use std::sync::Arc;

use anyhow::{Context, Result};
use hazardmap_client::{BundleTierClient, BurntAreaSet, DemoHotspots, HotspotSet, HttpTierClient, HttpTierConfig};
use hazardmap_core::{AppConfig, CacheStore, Clock, FallbackOrchestrator, MapSession, SpatialCache, SpatialClusterer};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A hazard layer. Doubles as the query class and the store namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HazardLayer {
    /// Active fire detections.
    Hotspots,
    /// Mapped burnt-area polygons.
    BurntAreas,
}

impl HazardLayer {
    pub const ALL: [HazardLayer; 2] = [HazardLayer::Hotspots, HazardLayer::BurntAreas];

    pub fn as_str(&self) -> &'static str {
        match self {
            HazardLayer::Hotspots => "hotspots",
            HazardLayer::BurntAreas => "burnt_areas",
        }
    }

    /// `Some(layer)` selects one layer, `None` selects all of them.
    pub fn selection(layer: Option<HazardLayer>) -> Vec<HazardLayer> {
        layer.map_or_else(|| Self::ALL.to_vec(), |l| vec![l])
    }
}

impl std::fmt::Display for HazardLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct HazardState {
    pub hotspots: MapSession<HotspotSet>,
    pub burnt_areas: MapSession<BurntAreaSet>,
}

impl HazardState {
    /// Wire both layers from configuration.
    ///
    /// Hotspots use the configured HTTP tiers with demo data as the synthetic
    /// fallback; burnt areas are served from the local bundle under the
    /// polygon timeout budget. Each layer gets its own namespace in `store`.
    pub fn from_config(config: &AppConfig, store: Option<CacheStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let clusterer = SpatialClusterer::new(config.cluster_config());

        let hotspot_cache = SpatialCache::new(config.cache_config(), Arc::clone(&clock))?;
        let mut hotspots = FallbackOrchestrator::new(Arc::new(hotspot_cache), Arc::clone(&clock))
            .with_synthetic(Arc::new(DemoHotspots::new(Arc::clone(&clock))));
        if let Some(url) = &config.primary_url {
            hotspots = hotspots.with_primary(Arc::new(http_tier(config, "primary", url)?));
        }
        if let Some(url) = &config.secondary_url {
            hotspots = hotspots.with_secondary(Arc::new(http_tier(config, "secondary", url)?));
        }

        let burnt_cache = SpatialCache::new(config.cache_config(), Arc::clone(&clock))?;
        let mut burnt_areas = FallbackOrchestrator::new(Arc::new(burnt_cache), Arc::clone(&clock));
        if let Some(path) = &config.bundle_path {
            burnt_areas = burnt_areas.with_primary(Arc::new(BundleTierClient::new(path)));
        }

        if let Some(store) = &store {
            hotspots = hotspots.with_store(store.namespaced(HazardLayer::Hotspots.as_str()));
            burnt_areas = burnt_areas.with_store(store.namespaced(HazardLayer::BurntAreas.as_str()));
        }

        Ok(Self {
            hotspots: MapSession::new(hotspots, clusterer, config.tier_plan(), config.mode),
            burnt_areas: MapSession::new(burnt_areas, clusterer, config.polygon_tier_plan(), config.mode),
        })
    }

    /// Flush both in-memory caches to the store.
    pub async fn persist(&self) {
        if let Err(e) = self.hotspots.persist().await {
            tracing::warn!(layer = %HazardLayer::Hotspots, error = %e, "cache persist failed");
        }
        if let Err(e) = self.burnt_areas.persist().await {
            tracing::warn!(layer = %HazardLayer::BurntAreas, error = %e, "cache persist failed");
        }
    }

    /// Restore both persisted caches. Failures are logged; the layer starts cold.
    pub async fn warm_start(&self) {
        if let Err(e) = self.hotspots.warm_start().await {
            tracing::warn!(layer = %HazardLayer::Hotspots, error = %e, "cache warm start failed");
        }
        if let Err(e) = self.burnt_areas.warm_start().await {
            tracing::warn!(layer = %HazardLayer::BurntAreas, error = %e, "cache warm start failed");
        }
    }
}

fn http_tier(config: &AppConfig, name: &str, url: &str) -> Result<HttpTierClient<HotspotSet>> {
    let tier = HttpTierConfig::new(name, url)
        .with_user_agent(&config.user_agent)
        .with_min_request_interval(config.min_request_interval());
    HttpTierClient::new(tier).with_context(|| format!("failed to build {name} tier for {url}"))
}
