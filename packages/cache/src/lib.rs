#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Time-bounded memoization of incident queries.
//!
//! Entries are keyed by the rounded query box plus the sorted filter set
//! and expire lazily: a stale entry is only replaced by the next
//! successful fetch for its key, never swept. Each key has its own async
//! lock held across the fetch, so concurrent callers for the same key wait
//! for the first caller's result instead of issuing a second upstream
//! request. Failed fetches never touch the cache.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use traffic_map_geography_models::BoundingBox;
use traffic_map_incident_models::Incident;

/// Decimal places kept when rounding box edges into a key (~110 m).
const KEY_DECIMALS: i32 = 3;

/// Identity of an incident query: rounded bounding box plus filter set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a key from a query box and filters.
    ///
    /// Box edges are rounded so floating-point jitter from map panning
    /// does not miss the cache. Filters are sorted and de-duplicated so
    /// their order does not matter.
    #[must_use]
    pub fn new(bbox: BoundingBox, filters: &[String]) -> Self {
        let mut filters: Vec<&str> = filters.iter().map(|f| f.trim()).collect();
        filters.retain(|f| !f.is_empty());
        filters.sort_unstable();
        filters.dedup();

        Self(format!(
            "{:.3},{:.3},{:.3},{:.3}|{}",
            round_edge(bbox.south),
            round_edge(bbox.west),
            round_edge(bbox.north),
            round_edge(bbox.east),
            filters.join(","),
        ))
    }

    /// The key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rounds to [`KEY_DECIMALS`] places, folding `-0.0` into `0.0`.
fn round_edge(value: f64) -> f64 {
    let scale = 10_f64.powi(KEY_DECIMALS);
    (value * scale).round() / scale + 0.0
}

/// One memoized query result.
#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: Instant,
    incidents: Vec<Incident>,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<CacheEntry>>>;

/// In-memory incident cache shared by reference between refreshes.
#[derive(Debug, Default)]
pub struct IncidentCache {
    slots: Mutex<BTreeMap<CacheKey, Slot>>,
}

impl IncidentCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached incidents for `key` if they are younger than
    /// `ttl`, otherwise calls `fetch` and stores its result.
    ///
    /// Concurrent calls for the same key are serialized: the first runs
    /// `fetch`, the rest wait and are then served from the entry it
    /// stored. Calls for different keys never block each other.
    ///
    /// # Errors
    ///
    /// Returns whatever `fetch` returns. The cache is left exactly as it
    /// was; a stale entry is not served as a fallback.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        fetch: F,
    ) -> Result<Vec<Incident>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Incident>, E>>,
    {
        let slot = self.slot(key);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref().filter(|e| e.is_fresh(ttl)) {
            log::debug!("incident cache hit for {key}");
            return Ok(cached.incidents.clone());
        }

        log::debug!(
            "incident cache {} for {key}",
            if entry.is_some() { "stale" } else { "miss" }
        );

        let incidents = fetch().await?;
        *entry = Some(CacheEntry {
            fetched_at: Instant::now(),
            incidents: incidents.clone(),
        });

        Ok(incidents)
    }

    /// Number of keys holding a stored result, fresh or stale.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.lock_slots().values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Whether no key holds a stored result.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Forgets the entry for `key`. A fetch already in flight for it
    /// completes normally but its result is not kept.
    pub fn invalidate(&self, key: &CacheKey) {
        self.lock_slots().remove(key);
    }

    /// Forgets every entry.
    pub fn clear(&self) {
        self.lock_slots().clear();
    }

    fn slot(&self, key: &CacheKey) -> Slot {
        self.lock_slots().entry(key.clone()).or_default().clone()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, BTreeMap<CacheKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
