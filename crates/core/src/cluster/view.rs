use super::{Cluster, ClusterableFeature, SpatialClusterer};

/// Clusters for the current feature set, recomputed only when the zoom moves
/// strictly past the hysteresis threshold.
#[derive(Debug, Clone, Default)]
pub struct ClusterView {
    zoom: Option<f64>,
    clusters: Vec<Cluster>,
}

impl ClusterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zoom the current clusters were computed at.
    pub fn zoom(&self) -> Option<f64> {
        self.zoom
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Whether moving to `zoom` warrants a recompute.
    ///
    /// A step of exactly the hysteresis stays inside the band. Crossing the
    /// declustering cutoff always recomputes, however small the step.
    pub fn needs_recompute(&self, clusterer: &SpatialClusterer, zoom: f64) -> bool {
        let Some(current) = self.zoom else {
            return true;
        };
        let cutoff = clusterer.config().max_cluster_zoom;
        (zoom - current).abs() > clusterer.config().hysteresis || ((current >= cutoff) != (zoom >= cutoff))
    }

    /// Recompute if needed. Returns whether the clusters changed.
    pub fn rezoom(&mut self, clusterer: &SpatialClusterer, features: &[ClusterableFeature], zoom: f64) -> bool {
        if !self.needs_recompute(clusterer, zoom) {
            return false;
        }
        self.recompute(clusterer, features, zoom);
        true
    }

    /// Unconditional recompute, for a new feature set.
    pub fn recompute(&mut self, clusterer: &SpatialClusterer, features: &[ClusterableFeature], zoom: f64) {
        self.clusters = clusterer.cluster(features, zoom);
        self.zoom = Some(zoom);
    }

    pub fn reset(&mut self) {
        self.zoom = None;
        self.clusters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterConfig;
    use crate::cluster::tests::grid_features;

    #[test]
    fn test_first_rezoom_always_computes() {
        let clusterer = SpatialClusterer::default();
        let mut view = ClusterView::new();
        assert!(view.rezoom(&clusterer, &grid_features(), 5.0));
        assert_eq!(view.zoom(), Some(5.0));
        assert!(!view.clusters().is_empty());
    }

    #[test]
    fn test_small_zoom_jitter_is_ignored() {
        let clusterer = SpatialClusterer::default();
        let features = grid_features();
        let mut view = ClusterView::new();
        view.rezoom(&clusterer, &features, 5.0);

        assert!(!view.rezoom(&clusterer, &features, 5.3));
        assert!(!view.rezoom(&clusterer, &features, 4.6));
        assert_eq!(view.zoom(), Some(5.0));

        assert!(view.rezoom(&clusterer, &features, 5.6));
        assert_eq!(view.zoom(), Some(5.6));
    }

    #[test]
    fn test_step_of_exactly_hysteresis_is_inside_band() {
        let clusterer = SpatialClusterer::default();
        let features = grid_features();
        let mut view = ClusterView::new();
        view.rezoom(&clusterer, &features, 5.0);

        assert!(!view.rezoom(&clusterer, &features, 5.5));
        assert!(!view.rezoom(&clusterer, &features, 4.5));
        assert_eq!(view.zoom(), Some(5.0));
        assert!(view.rezoom(&clusterer, &features, 4.25));
    }

    #[test]
    fn test_zero_hysteresis_recomputes_on_any_change() {
        let clusterer = SpatialClusterer::new(ClusterConfig { hysteresis: 0.0, ..Default::default() });
        let features = grid_features();
        let mut view = ClusterView::new();
        view.rezoom(&clusterer, &features, 5.0);

        assert!(!view.rezoom(&clusterer, &features, 5.0));
        assert!(view.rezoom(&clusterer, &features, 5.01));
    }

    #[test]
    fn test_crossing_cutoff_recomputes() {
        let clusterer = SpatialClusterer::default();
        let features = grid_features();
        let mut view = ClusterView::new();
        view.rezoom(&clusterer, &features, 13.8);

        assert!(view.rezoom(&clusterer, &features, 14.0));
        assert_eq!(view.clusters().len(), features.len());
    }

    #[test]
    fn test_reset() {
        let clusterer = SpatialClusterer::default();
        let mut view = ClusterView::new();
        view.recompute(&clusterer, &grid_features(), 5.0);
        view.reset();
        assert!(view.zoom().is_none());
        assert!(view.clusters().is_empty());
    }
}
