//! Session state for one map.
//!
//! [`MapSession`] is the single writer of the committed view. Every refresh
//! takes a fresh [`RequestToken`], resolves through the orchestrator, clusters
//! the result, and publishes it on a `watch` channel only if the token is
//! still current at commit time. Commits and mode switches serialize on one
//! lock, so a result resolved under the old mode can never land after the
//! switch has cleared the view.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::Error;
use crate::cache::{CacheMetadata, RestoreStats};
use crate::cluster::{Cluster, ClusterView, ClusterableFeature, FeatureSource, SpatialClusterer};
use crate::geo::geohash;
use crate::resolve::{DataEnvelope, DataMode, FallbackOrchestrator, HazardQuery, TierPlan};
use crate::sequencer::{RequestSequencer, RequestToken};

/// A result that won its commit.
#[derive(Debug, Clone)]
pub struct CommittedView<T> {
    pub token: RequestToken,
    pub query: HazardQuery,
    pub mode: DataMode,
    pub envelope: DataEnvelope<T>,
    features: Vec<ClusterableFeature>,
    clusters: ClusterView,
}

impl<T> CommittedView<T> {
    pub fn clusters(&self) -> &[Cluster] {
        self.clusters.clusters()
    }

    pub fn zoom(&self) -> Option<f64> {
        self.clusters.zoom()
    }

    pub fn features(&self) -> &[ClusterableFeature] {
        &self.features
    }
}

/// Committed views by query class.
pub type SessionState<T> = BTreeMap<String, Arc<CommittedView<T>>>;

/// What happened to a refresh.
#[derive(Debug, Clone)]
pub enum CommitOutcome<T> {
    Committed(Arc<CommittedView<T>>),
    /// A newer token was issued while this one was in flight; its result was dropped.
    Superseded { token: RequestToken, current: Option<u64> },
}

impl<T> CommitOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }
}

/// Counts from [`MapSession::clear_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearStats {
    pub memory_entries: usize,
    pub stored_entries: u64,
}

pub struct MapSession<T> {
    orchestrator: FallbackOrchestrator<T>,
    sequencer: RequestSequencer,
    clusterer: SpatialClusterer,
    plan: TierPlan,
    mode: Mutex<DataMode>,
    commit_lock: Mutex<()>,
    state: watch::Sender<SessionState<T>>,
}

impl<T> MapSession<T>
where
    T: FeatureSource + Clone + Serialize + Send + Sync + 'static,
{
    pub fn new(orchestrator: FallbackOrchestrator<T>, clusterer: SpatialClusterer, plan: TierPlan, mode: DataMode) -> Self {
        let (state, _) = watch::channel(SessionState::new());
        Self {
            orchestrator,
            sequencer: RequestSequencer::new(),
            clusterer,
            plan,
            mode: Mutex::new(mode),
            commit_lock: Mutex::new(()),
            state,
        }
    }

    fn commit_guard(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mode(&self) -> DataMode {
        *self.mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sequencer(&self) -> &RequestSequencer {
        &self.sequencer
    }

    pub fn clusterer(&self) -> &SpatialClusterer {
        &self.clusterer
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator<T> {
        &self.orchestrator
    }

    /// Tier plan before the mode restriction is applied.
    pub fn plan(&self) -> &TierPlan {
        &self.plan
    }

    /// Watch committed views.
    pub fn subscribe(&self) -> watch::Receiver<SessionState<T>> {
        self.state.subscribe()
    }

    /// The committed view for a query class, if any.
    pub fn view(&self, query_class: &str) -> Option<Arc<CommittedView<T>>> {
        self.state.borrow().get(query_class).cloned()
    }

    /// Resolve `query`, cluster it at `zoom`, and commit unless superseded.
    pub async fn refresh(&self, query: HazardQuery, zoom: f64) -> CommitOutcome<T> {
        let (token, mode) = {
            let _guard = self.commit_guard();
            (self.sequencer.issue(&query.query_class), self.mode())
        };
        tracing::debug!(query_class = %token.query_class, sequence = token.sequence, %mode, "refresh started");

        let plan = self.plan.for_mode(mode);
        let envelope = self.orchestrator.fetch(&query, &plan).await;

        let features = envelope.payload.as_ref().map(FeatureSource::features).unwrap_or_default();
        let mut clusters = ClusterView::new();
        clusters.recompute(&self.clusterer, &features, zoom);

        let _guard = self.commit_guard();
        if !self.sequencer.is_current(&token) {
            let current = self.sequencer.current(&token.query_class);
            tracing::debug!(
                query_class = %token.query_class,
                sequence = token.sequence,
                current,
                "dropping superseded result"
            );
            return CommitOutcome::Superseded { token, current };
        }

        let view = Arc::new(CommittedView { token, query, mode, envelope, features, clusters });
        self.state.send_modify(|state| {
            state.insert(view.token.query_class.clone(), Arc::clone(&view));
        });
        tracing::debug!(
            query_class = %view.token.query_class,
            sequence = view.token.sequence,
            provenance = ?view.envelope.provenance,
            clusters = view.clusters().len(),
            "committed view"
        );
        CommitOutcome::Committed(view)
    }

    /// Switch the data policy.
    ///
    /// Supersedes every in-flight request and clears the committed views, so
    /// results from different modes never share a view.
    pub fn set_mode(&self, mode: DataMode) -> DataMode {
        let _guard = self.commit_guard();
        let previous = {
            let mut current = self.mode.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *current, mode)
        };
        let superseded = self.sequencer.supersede_all();
        self.state.send_replace(SessionState::new());
        tracing::info!(%previous, %mode, superseded = superseded.len(), "data mode changed");
        previous
    }

    /// Re-cluster committed views for `zoom`, honoring hysteresis.
    ///
    /// Returns the query classes whose clusters changed.
    pub fn rezoom(&self, zoom: f64) -> Vec<String> {
        let mut changed = Vec::new();
        self.state.send_if_modified(|state| {
            for (class, view) in state.iter_mut() {
                if !view.clusters.needs_recompute(&self.clusterer, zoom) {
                    continue;
                }
                let view = Arc::make_mut(view);
                view.clusters.recompute(&self.clusterer, &view.features, zoom);
                changed.push(class.clone());
            }
            !changed.is_empty()
        });
        changed
    }

    /// Drop one cache cell from memory and the store.
    ///
    /// Refreshes already in flight still commit their views but no longer
    /// write their results back into the cache. Returns whether anything was
    /// removed.
    pub async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        if !geohash::is_valid(key) {
            return Err(Error::InvalidGeohash(key.to_string()));
        }
        let removed = self.orchestrator.invalidate(key).await?;
        tracing::info!(geohash = %key, removed, "cache cell invalidated");
        Ok(removed)
    }

    /// Wipe the cache (memory and store) and every committed view.
    ///
    /// In-flight refreshes are superseded and their results are neither
    /// committed nor cached.
    pub async fn clear_all(&self) -> Result<ClearStats, Error> {
        {
            let _guard = self.commit_guard();
            self.sequencer.supersede_all();
            self.state.send_replace(SessionState::new());
        }

        let (memory_entries, stored_entries) = self.orchestrator.clear().await?;

        tracing::info!(memory_entries, stored_entries, "cache cleared");
        Ok(ClearStats { memory_entries, stored_entries })
    }

    pub fn cache_metadata(&self) -> CacheMetadata {
        self.orchestrator.cache().metadata()
    }

    /// Write the whole in-memory cache to the store, replacing its contents.
    ///
    /// Returns the number of entries written; zero without a store.
    pub async fn persist(&self) -> Result<usize, Error> {
        let Some(store) = self.orchestrator.store() else {
            return Ok(0);
        };
        let doc = self.orchestrator.cache().snapshot()?;
        store.save(&doc).await?;
        tracing::debug!(namespace = %store.namespace(), entries = doc.entry_count, "cache persisted");
        Ok(doc.entry_count)
    }
}

impl<T> MapSession<T>
where
    T: FeatureSource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Load the persisted cache into memory. A no-op without a store.
    ///
    /// Rows already expired are purged from the store first.
    pub async fn warm_start(&self) -> Result<RestoreStats, Error> {
        let Some(store) = self.orchestrator.store() else {
            return Ok(RestoreStats::default());
        };
        let purged = store.purge_expired(self.orchestrator.clock().now().timestamp_millis()).await?;
        if purged > 0 {
            tracing::debug!(namespace = %store.namespace(), purged, "purged expired cache rows");
        }
        let doc = store.load().await?;
        let stats = self.orchestrator.cache().restore(&doc);
        tracing::info!(restored = stats.restored, expired = stats.expired, discarded = stats.discarded, "cache warm start");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheStore, SpatialCache};
    use crate::clock::{Clock, ManualClock};
    use crate::geo::GeoPoint;
    use crate::resolve::orchestrator::tests::{CountingSynthetic, Script, ScriptedClient, london_query, payload};
    use crate::resolve::{Provenance, RemoteError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    impl FeatureSource for Vec<String> {
        fn features(&self) -> Vec<ClusterableFeature> {
            self.iter()
                .enumerate()
                .map(|(i, id)| ClusterableFeature {
                    id: id.clone(),
                    location: GeoPoint::new(40.0, 10.0 + i as f64 * 0.01).unwrap(),
                    weight: 1.0,
                    timestamp: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
                })
                .collect()
        }
    }

    fn cache() -> Arc<SpatialCache<Vec<String>>> {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_origin());
        Arc::new(SpatialCache::new(CacheConfig::default(), clock).unwrap())
    }

    fn session(orchestrator: FallbackOrchestrator<Vec<String>>, mode: DataMode) -> Arc<MapSession<Vec<String>>> {
        Arc::new(MapSession::new(orchestrator, SpatialClusterer::default(), TierPlan::default(), mode))
    }

    fn orchestrator(cache: Arc<SpatialCache<Vec<String>>>) -> FallbackOrchestrator<Vec<String>> {
        FallbackOrchestrator::new(cache, Arc::new(ManualClock::at_origin()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_commits_and_publishes() {
        let primary = ScriptedClient::new(vec![Script::Ok(payload("a"))]);
        let session = session(orchestrator(cache()).with_primary(primary), DataMode::Live);
        let mut rx = session.subscribe();

        let outcome = session.refresh(london_query(), 5.0).await;
        assert!(outcome.is_committed());

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update();
        let view = state.get("hotspots").unwrap();
        assert_eq!(view.envelope.payload, Some(payload("a")));
        assert_eq!(view.token.sequence, 1);
        assert_eq!(view.clusters().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_result_is_discarded() {
        let primary = ScriptedClient::new(vec![
            Script::Ok(payload("t1")),
            Script::Ok(payload("t2")),
            Script::Stall(Duration::from_secs(5), payload("slow")),
            Script::Ok(payload("fast")),
        ]);
        let session = session(orchestrator(cache()).with_primary(primary), DataMode::Live);

        session.refresh(london_query(), 5.0).await;
        session.refresh(london_query(), 5.0).await;

        let slow = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.refresh(london_query(), 5.0).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(session.sequencer().current("hotspots"), Some(3));

        let fast = session.refresh(london_query(), 5.0).await;
        let CommitOutcome::Committed(view) = fast else {
            panic!("token 4 should commit");
        };
        assert_eq!(view.token.sequence, 4);

        match slow.await.unwrap() {
            CommitOutcome::Superseded { token, current } => {
                assert_eq!(token.sequence, 3);
                assert_eq!(current, Some(4));
            }
            CommitOutcome::Committed(_) => panic!("token 3 must not commit"),
        }

        let committed = session.view("hotspots").unwrap();
        assert_eq!(committed.token.sequence, 4);
        assert_eq!(committed.envelope.payload, Some(payload("fast")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_mode_clears_view_and_supersedes_in_flight() {
        let primary = ScriptedClient::new(vec![
            Script::Ok(payload("live")),
            Script::Stall(Duration::from_secs(2), payload("late live")),
        ]);
        let synthetic = Arc::new(CountingSynthetic { calls: AtomicUsize::new(0) });
        let session = session(
            orchestrator(cache()).with_primary(primary).with_synthetic(synthetic.clone()),
            DataMode::Live,
        );

        session.refresh(london_query(), 5.0).await;
        assert!(session.view("hotspots").is_some());

        let in_flight = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.refresh(london_query(), 5.0).await })
        };
        tokio::task::yield_now().await;

        assert_eq!(session.set_mode(DataMode::Demo), DataMode::Live);
        assert!(session.view("hotspots").is_none());
        assert!(!in_flight.await.unwrap().is_committed());
        assert!(session.view("hotspots").is_none());

        let CommitOutcome::Committed(view) = session.refresh(london_query(), 5.0).await else {
            panic!("demo refresh should commit");
        };
        assert_eq!(view.envelope.provenance, Provenance::Synthetic);
        assert_eq!(view.mode, DataMode::Demo);
        assert_eq!(synthetic.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_commit_has_no_clusters() {
        let primary = ScriptedClient::new(vec![Script::Fail(RemoteError::Server { status: 502 })]);
        let session = session(orchestrator(cache()).with_primary(primary), DataMode::StrictLive);

        let CommitOutcome::Committed(view) = session.refresh(london_query(), 5.0).await else {
            panic!("offline results still commit");
        };
        assert_eq!(view.envelope.provenance, Provenance::Offline);
        assert!(view.clusters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rezoom_respects_hysteresis() {
        let primary = ScriptedClient::new(vec![Script::Ok(vec!["a".into(), "b".into(), "c".into()])]);
        let session = session(orchestrator(cache()).with_primary(primary), DataMode::Live);
        session.refresh(london_query(), 5.0).await;

        assert!(session.rezoom(5.2).is_empty());
        assert_eq!(session.view("hotspots").unwrap().zoom(), Some(5.0));

        assert_eq!(session.rezoom(16.0), vec!["hotspots".to_string()]);
        let view = session.view("hotspots").unwrap();
        assert_eq!(view.zoom(), Some(16.0));
        assert_eq!(view.clusters().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_and_clear_all() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let cache = cache();
        let primary = ScriptedClient::new(vec![Script::Ok(payload("a"))]);
        let session = session(orchestrator(Arc::clone(&cache)).with_primary(primary).with_store(store.clone()), DataMode::Live);

        session.refresh(london_query(), 5.0).await;
        let key = cache.keys().pop().unwrap();
        assert_eq!(session.cache_metadata().entry_count, 1);

        assert!(matches!(session.invalidate("not a hash!").await, Err(Error::InvalidGeohash(_))));
        assert!(session.invalidate(&key).await.unwrap());
        assert!(!session.invalidate(&key).await.unwrap());
        assert!(store.load().await.unwrap().entries.is_empty());

        session.refresh(london_query(), 5.0).await;
        let stats = session.clear_all().await.unwrap();
        assert_eq!(stats, ClearStats { memory_entries: 1, stored_entries: 1 });
        assert!(session.view("hotspots").is_none());
        assert_eq!(session.cache_metadata().entry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all_during_refresh_leaves_cache_empty() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let cache = cache();
        let primary = ScriptedClient::new(vec![Script::Stall(Duration::from_secs(2), payload("pre-clear"))]);
        let session = session(orchestrator(Arc::clone(&cache)).with_primary(primary).with_store(store.clone()), DataMode::Live);

        let in_flight = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.refresh(london_query(), 5.0).await })
        };
        tokio::task::yield_now().await;

        let stats = session.clear_all().await.unwrap();
        assert_eq!(stats, ClearStats::default());
        assert!(!in_flight.await.unwrap().is_committed());

        assert_eq!(cache.len(), 0);
        assert!(store.load().await.unwrap().entries.is_empty());
        assert!(session.view("hotspots").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_during_refresh_keeps_cell_out() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let cache = cache();
        let primary = ScriptedClient::new(vec![
            Script::Ok(payload("first")),
            Script::Stall(Duration::from_secs(2), payload("second")),
        ]);
        let session = session(orchestrator(Arc::clone(&cache)).with_primary(primary).with_store(store.clone()), DataMode::Live);
        session.refresh(london_query(), 5.0).await;
        let key = cache.keys().pop().unwrap();

        let in_flight = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.refresh(london_query(), 5.0).await })
        };
        tokio::task::yield_now().await;

        assert!(session.invalidate(&key).await.unwrap());
        assert!(in_flight.await.unwrap().is_committed());

        assert!(!cache.contains_key(&key));
        assert!(store.load().await.unwrap().entries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_start_restores_from_store() {
        let store = CacheStore::open_in_memory().await.unwrap();
        {
            let primary = ScriptedClient::new(vec![Script::Ok(payload("persisted"))]);
            let first = session(orchestrator(cache()).with_primary(primary).with_store(store.clone()), DataMode::Live);
            first.refresh(london_query(), 5.0).await;
        }

        let cache = cache();
        let second = session(orchestrator(Arc::clone(&cache)).with_store(store), DataMode::StrictLive);
        let stats = second.warm_start().await.unwrap();
        assert_eq!(stats.restored, 1);

        let CommitOutcome::Committed(view) = second.refresh(london_query(), 5.0).await else {
            panic!("cached refresh should commit");
        };
        assert_eq!(view.envelope.provenance, Provenance::Cached);
        assert_eq!(view.envelope.payload, Some(payload("persisted")));
    }

    #[tokio::test]
    async fn test_persist_replaces_store_contents() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let cache = cache();
        let session = session(orchestrator(Arc::clone(&cache)).with_store(store.clone()), DataMode::Live);

        cache.set(51.5074, -0.1278, payload("london")).unwrap();
        cache.set(57.64911, 10.40744, payload("skagen")).unwrap();
        assert_eq!(session.persist().await.unwrap(), 2);

        cache.remove("gcpvj");
        assert_eq!(session.persist().await.unwrap(), 1);

        let doc = store.load().await.unwrap();
        assert_eq!(doc.entries.keys().collect::<Vec<_>>(), vec!["u4pru"]);
    }

    #[tokio::test]
    async fn test_warm_start_purges_expired_rows() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::at_origin());
        let cache = Arc::new(SpatialCache::new(CacheConfig::default(), clock.clone() as Arc<dyn Clock>).unwrap());
        cache.set(51.5074, -0.1278, payload("old")).unwrap();
        let first = session(orchestrator(Arc::clone(&cache)).with_store(store.clone()), DataMode::Live);
        first.persist().await.unwrap();

        clock.advance(chrono::Duration::hours(7));
        let fresh = Arc::new(SpatialCache::new(CacheConfig::default(), clock.clone() as Arc<dyn Clock>).unwrap());
        let later = FallbackOrchestrator::new(fresh, clock.clone() as Arc<dyn Clock>).with_store(store.clone());
        let second = session(later, DataMode::Live);
        let stats = second.warm_start().await.unwrap();

        assert_eq!(stats.restored, 0);
        assert!(store.load().await.unwrap().entries.is_empty());
    }
}
