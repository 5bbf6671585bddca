//! Sequential tier fallback with per-tier timeouts.
//!
//! Tiers are tried one at a time, never raced, so metered remote APIs are not
//! billed twice and provenance is unambiguous. A remote attempt that outlives
//! its timeout is dropped; whatever it would have returned is never seen.
//!
//! Cache writes (write-through, invalidation, clearing) serialize on one
//! async lock. Invalidation and clearing bump a cache epoch; a fetch that
//! started under an older epoch does not write its result back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::remote::{RemoteDataClient, RemoteError, SyntheticSource};
use super::{AttemptOutcome, DataEnvelope, HazardQuery, Provenance, StaleSnapshot, Tier, TierAttempt, TierPlan};
use crate::Error;
use crate::cache::{CacheStore, PersistedEntry, SpatialCache};
use crate::clock::Clock;

/// Result of one tier attempt.
#[derive(Debug)]
pub enum TierOutcome<T> {
    Success { payload: T, observed_at: DateTime<Utc> },
    Timeout,
    Error(String),
    Skipped(String),
}

impl<T> TierOutcome<T> {
    fn report(&self) -> AttemptOutcome {
        match self {
            TierOutcome::Success { .. } => AttemptOutcome::Success,
            TierOutcome::Timeout => AttemptOutcome::Timeout,
            TierOutcome::Error(reason) => AttemptOutcome::Error(reason.clone()),
            TierOutcome::Skipped(reason) => AttemptOutcome::Skipped(reason.clone()),
        }
    }
}

/// Walks a [`TierPlan`] until a tier succeeds.
pub struct FallbackOrchestrator<T> {
    primary: Option<Arc<dyn RemoteDataClient<T>>>,
    secondary: Option<Arc<dyn RemoteDataClient<T>>>,
    synthetic: Option<Arc<dyn SyntheticSource<T>>>,
    cache: Arc<SpatialCache<T>>,
    store: Option<CacheStore>,
    clock: Arc<dyn Clock>,
    epoch: AtomicU64,
    write_lock: Mutex<()>,
}

impl<T> FallbackOrchestrator<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    pub fn new(cache: Arc<SpatialCache<T>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            primary: None,
            secondary: None,
            synthetic: None,
            cache,
            store: None,
            clock,
            epoch: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_primary(mut self, client: Arc<dyn RemoteDataClient<T>>) -> Self {
        self.primary = Some(client);
        self
    }

    pub fn with_secondary(mut self, client: Arc<dyn RemoteDataClient<T>>) -> Self {
        self.secondary = Some(client);
        self
    }

    pub fn with_synthetic(mut self, source: Arc<dyn SyntheticSource<T>>) -> Self {
        self.synthetic = Some(source);
        self
    }

    /// Mirror write-throughs into a persistent store.
    pub fn with_store(mut self, store: CacheStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(&self) -> &Arc<SpatialCache<T>> {
        &self.cache
    }

    pub fn store(&self) -> Option<&CacheStore> {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Bumped by every invalidation and clear.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Drop one cell from memory and the store. Returns whether anything was removed.
    pub async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        let _writer = self.write_lock.lock().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut removed = self.cache.remove(key);
        if let Some(store) = &self.store {
            removed |= store.remove_entry(key).await?;
        }
        Ok(removed)
    }

    /// Wipe memory and the store.
    ///
    /// Returns the number of in-memory entries and stored rows removed.
    pub async fn clear(&self) -> Result<(usize, u64), Error> {
        let _writer = self.write_lock.lock().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let memory_entries = self.cache.len();
        self.cache.clear();
        let stored_entries = match &self.store {
            Some(store) => store.clear().await?,
            None => 0,
        };
        Ok((memory_entries, stored_entries))
    }

    /// Resolve `query` through `plan`.
    ///
    /// Never fails: exhaustion is reported as an `Offline` envelope. When the
    /// plan includes the cache tier it carries the last known good entry, if
    /// one is still around.
    pub async fn fetch(&self, query: &HazardQuery, plan: &TierPlan) -> DataEnvelope<T> {
        let epoch = self.epoch();
        let center = query.bounds.center();
        let key = self.cache_key(query);

        let mut attempts = Vec::with_capacity(plan.order.len());

        for &tier in &plan.order {
            let started = Instant::now();
            let outcome = match tier {
                Tier::PrimaryRemote => {
                    self.attempt_remote(tier, self.primary.as_deref(), query, plan.timeouts.primary).await
                }
                Tier::SecondaryRemote => {
                    self.attempt_remote(tier, self.secondary.as_deref(), query, plan.timeouts.secondary).await
                }
                Tier::SpatialCache => self.attempt_cache(&key),
                Tier::SyntheticFallback => self.attempt_synthetic(query),
            };

            attempts.push(TierAttempt {
                tier,
                outcome: outcome.report(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            });

            if let TierOutcome::Success { payload, observed_at } = outcome {
                tracing::debug!(?tier, query_class = %query.query_class, "tier resolved query");
                if tier.is_remote() && key.is_ok() {
                    self.write_through(center.lat(), center.lon(), &payload, epoch).await;
                }
                return DataEnvelope {
                    payload: Some(payload),
                    provenance: tier.provenance(),
                    observed_at,
                    last_known_good: None,
                    attempts,
                };
            }
        }

        let last_known_good = key
            .as_deref()
            .ok()
            .filter(|_| plan.order.contains(&Tier::SpatialCache))
            .and_then(|k| self.cache.get_stale(k))
            .map(|entry| StaleSnapshot {
                payload: entry.value.clone(),
                observed_at: entry.inserted_at,
                expired_at: entry.expires_at,
            });

        tracing::warn!(
            query_class = %query.query_class,
            tiers = attempts.len(),
            stale_available = last_known_good.is_some(),
            "all tiers exhausted"
        );

        DataEnvelope {
            payload: None,
            provenance: Provenance::Offline,
            observed_at: self.clock.now(),
            last_known_good,
            attempts,
        }
    }

    async fn attempt_remote(
        &self, tier: Tier, client: Option<&dyn RemoteDataClient<T>>, query: &HazardQuery, timeout: Duration,
    ) -> TierOutcome<T> {
        let Some(client) = client else {
            return TierOutcome::Skipped("not configured".into());
        };

        let result = tokio::time::timeout(timeout, client.fetch(&query.bounds, &query.filters, timeout)).await;

        match result {
            Ok(Ok(payload)) => TierOutcome::Success { payload, observed_at: self.clock.now() },
            Ok(Err(RemoteError::Timeout)) | Err(_) => {
                tracing::debug!(?tier, client = client.name(), timeout_ms = timeout.as_millis() as u64, "tier timed out");
                TierOutcome::Timeout
            }
            Ok(Err(e)) if e.is_transient() => {
                tracing::debug!(?tier, client = client.name(), error = %e, "transient tier failure");
                TierOutcome::Error(e.to_string())
            }
            Ok(Err(e)) => {
                tracing::warn!(?tier, client = client.name(), error = %e, "tier failed");
                TierOutcome::Error(e.to_string())
            }
        }
    }

    /// Cache cell for `query`, or why it has none.
    ///
    /// Cells hold unfiltered results only, so a filtered query never reads or
    /// writes the cache.
    fn cache_key(&self, query: &HazardQuery) -> Result<String, String> {
        if !query.filters.is_empty() {
            return Err("filtered query".into());
        }
        let center = query.bounds.center();
        self.cache.key_for(center.lat(), center.lon()).map_err(|e| {
            tracing::warn!(error = %e, "query center has no cache key; cache tier disabled");
            e.to_string()
        })
    }

    fn attempt_cache(&self, key: &Result<String, String>) -> TierOutcome<T> {
        let key = match key {
            Ok(key) => key,
            Err(reason) => return TierOutcome::Skipped(reason.clone()),
        };
        match self.cache.get_entry(key) {
            Some(entry) => {
                tracing::debug!(geohash = %key, "cache hit");
                TierOutcome::Success { payload: entry.value.clone(), observed_at: entry.inserted_at }
            }
            None => TierOutcome::Skipped("cache miss".into()),
        }
    }

    fn attempt_synthetic(&self, query: &HazardQuery) -> TierOutcome<T> {
        let Some(source) = self.synthetic.as_ref() else {
            return TierOutcome::Skipped("not configured".into());
        };
        match source.generate(query) {
            Ok(payload) => TierOutcome::Success { payload, observed_at: self.clock.now() },
            Err(e) => {
                tracing::warn!(error = %e, "synthetic source failed");
                TierOutcome::Error(e.to_string())
            }
        }
    }

    /// Cache a remote result fetched under `epoch`.
    ///
    /// Skipped if the cache was invalidated or cleared since. Cells evicted
    /// from memory are deleted from the store in the same step. Persistence
    /// failures are logged, never fatal.
    async fn write_through(&self, lat: f64, lon: f64, payload: &T, epoch: u64) {
        let _writer = self.write_lock.lock().await;
        if self.epoch() != epoch {
            tracing::debug!(epoch, current = self.epoch(), "cache reset during fetch; result not cached");
            return;
        }

        let write = match self.cache.insert(lat, lon, payload.clone()) {
            Ok(write) => write,
            Err(e) => {
                tracing::warn!(error = %e, "write-through to spatial cache failed");
                return;
            }
        };

        let Some(store) = self.store.as_ref() else {
            return;
        };
        let key = &write.entry.key;
        let persisted = match PersistedEntry::from_entry(&write.entry) {
            Ok(persisted) => persisted,
            Err(e) => {
                tracing::warn!(geohash = %key, error = %e, "payload not persistable");
                return;
            }
        };
        if let Err(e) = store.upsert_evicting(key, &persisted, &write.evicted).await {
            tracing::warn!(geohash = %key, error = %e, retryable = e.is_retryable(), "cache persistence failed");
        }
    }
}
