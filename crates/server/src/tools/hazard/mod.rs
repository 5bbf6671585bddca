//! Hazard layer tools: refresh, rezoom and view.
//!
//! Every tool reports committed views as [`LayerView`]s: the envelope's
//! provenance and tier report plus the clusters for the committed zoom. Raw
//! payloads are only included on request.

pub mod refresh;
pub mod rezoom;
pub mod view;

pub use refresh::{HazardRefreshOutput, HazardRefreshParams, refresh_impl};
pub use rezoom::{HazardRezoomOutput, HazardRezoomParams, rezoom_impl};
pub use view::{HazardViewOutput, HazardViewParams, view_impl};

use chrono::{DateTime, Utc};
use hazardmap_core::cluster::MAX_ZOOM;
use hazardmap_core::resolve::TierAttempt;
use hazardmap_core::{Cluster, CommittedView, DataMode, Error, Provenance, Tier};
use serde::Serialize;
use serde_json::Value;

use crate::state::{HazardLayer, HazardState};

/// Expired data shown after every tier failed.
#[derive(Debug, Clone, Serialize)]
pub struct StaleSummary {
    pub observed_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// A committed view as reported to clients.
#[derive(Debug, Clone, Serialize)]
pub struct LayerView {
    pub layer: HazardLayer,
    pub sequence: u64,
    pub mode: DataMode,
    pub zoom: Option<f64>,
    pub provenance: Provenance,
    pub observed_at: DateTime<Utc>,
    pub resolved_tier: Option<Tier>,
    pub attempts: Vec<TierAttempt>,
    pub feature_count: usize,
    pub clusters: Vec<Cluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_good: Option<StaleSummary>,
}

fn to_json<P: Serialize>(payload: &P) -> Result<Value, Error> {
    serde_json::to_value(payload).map_err(|e| Error::Serialization(e.to_string()))
}

impl LayerView {
    pub fn new<T: Serialize>(
        layer: HazardLayer, view: &CommittedView<T>, include_payload: bool,
    ) -> Result<Self, Error> {
        let envelope = &view.envelope;
        let payload = match (&envelope.payload, include_payload) {
            (Some(p), true) => Some(to_json(p)?),
            _ => None,
        };
        let last_known_good = match &envelope.last_known_good {
            Some(stale) => Some(StaleSummary {
                observed_at: stale.observed_at,
                expired_at: stale.expired_at,
                payload: if include_payload { Some(to_json(&stale.payload)?) } else { None },
            }),
            None => None,
        };

        Ok(Self {
            layer,
            sequence: view.token.sequence,
            mode: view.mode,
            zoom: view.zoom(),
            provenance: envelope.provenance,
            observed_at: envelope.observed_at,
            resolved_tier: envelope.resolved_tier(),
            attempts: envelope.attempts.clone(),
            feature_count: view.features().len(),
            clusters: view.clusters().to_vec(),
            payload,
            last_known_good,
        })
    }
}

/// The committed view of `layer`, if it has one.
pub fn committed_view(state: &HazardState, layer: HazardLayer, include_payload: bool) -> Result<Option<LayerView>, Error> {
    match layer {
        HazardLayer::Hotspots => state
            .hotspots
            .view(layer.as_str())
            .map(|v| LayerView::new(layer, &*v, include_payload))
            .transpose(),
        HazardLayer::BurntAreas => state
            .burnt_areas
            .view(layer.as_str())
            .map(|v| LayerView::new(layer, &*v, include_payload))
            .transpose(),
    }
}

pub(crate) fn check_zoom(zoom: f64) -> Result<f64, Error> {
    if !(0.0..=MAX_ZOOM).contains(&zoom) {
        return Err(Error::InvalidInput(format!("zoom must be between 0 and {MAX_ZOOM}, got {zoom}")));
    }
    Ok(zoom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_zoom() {
        assert_eq!(check_zoom(0.0).unwrap(), 0.0);
        assert_eq!(check_zoom(22.0).unwrap(), 22.0);
        assert!(check_zoom(-1.0).is_err());
        assert!(check_zoom(22.5).is_err());
        assert!(matches!(check_zoom(f64::NAN), Err(Error::InvalidInput(_))));
    }
}
