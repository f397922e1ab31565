//! Search and track cache with TTL, size accounting and quota-driven eviction.
//!
//! Two maps are kept in memory: search key → candidate list, and track id →
//! track. Both are mirrored to a [`KeyValueStorage`] as JSON objects. Writes
//! schedule a debounced flush; a burst of `put` calls inside the quiet window
//! produces a single persist.
//!
//! # Quota handling
//!
//! Before every persist the serialised size of both maps is checked. At or
//! above `cleanup_threshold_bytes` the oldest entries are pruned on an
//! escalating schedule (30%, 50%, 70%, 90% of each map) until the size is at
//! most `max_size_bytes - min_remaining_bytes`; if that is not enough the maps
//! are emptied. If the storage backend still reports `QuotaExceeded`, the same
//! schedule is applied between write attempts, and as a last resort the cache
//! is cleared and written once more. Persistence failures are logged, never
//! returned: the cache is best-effort.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::clock::{Clock, SystemClock};
use super::storage::KeyValueStorage;
use crate::telemetry;
use crate::types::RemoteTrack;
use crate::{Result, TrackcheckError};

/// Fractions of each map removed, oldest first, on successive pruning passes.
const PRUNE_RATIOS: [f64; 4] = [0.3, 0.5, 0.7, 0.9];

/// Cache configuration.
///
/// ```rust
/// # use trackcheck::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_age(Duration::from_secs(30 * 24 * 3600))
///     .max_size_bytes(2 * 1024 * 1024)
///     .cleanup_threshold_bytes(1024 * 1024 + 512 * 1024)
///     .min_remaining_bytes(256 * 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether cached entries are served and new ones stored. Default: true.
    pub enabled: bool,
    /// Entry lifetime. `None` means entries never expire (the default).
    pub max_age: Option<Duration>,
    /// Hard ceiling on the serialised size of both maps. Default: 5 MiB.
    pub max_size_bytes: usize,
    /// Size at which pruning starts. Default: 4.5 MiB.
    pub cleanup_threshold_bytes: usize,
    /// Space kept free below the ceiling after pruning. Default: 500 KiB.
    pub min_remaining_bytes: usize,
    /// Quiet window before a debounced flush. Default: 500 ms.
    pub flush_delay: Duration,
    /// Storage key for the search map.
    pub search_storage_key: String,
    /// Storage key for the track map.
    pub track_storage_key: String,
    /// Storage key for the persisted enabled toggle.
    pub enabled_storage_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age: None,
            max_size_bytes: 5 * 1024 * 1024,
            cleanup_threshold_bytes: 4 * 1024 * 1024 + 512 * 1024,
            min_remaining_bytes: 500 * 1024,
            flush_delay: Duration::from_millis(500),
            search_storage_key: "catalog_search_cache".into(),
            track_storage_key: "catalog_track_cache".into(),
            enabled_storage_key: "catalog_cache_enabled".into(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the entry lifetime.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Entries never expire.
    pub fn no_expiry(mut self) -> Self {
        self.max_age = None;
        self
    }

    pub fn max_size_bytes(mut self, bytes: usize) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    pub fn cleanup_threshold_bytes(mut self, bytes: usize) -> Self {
        self.cleanup_threshold_bytes = bytes;
        self
    }

    pub fn min_remaining_bytes(mut self, bytes: usize) -> Self {
        self.min_remaining_bytes = bytes;
        self
    }

    pub fn flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Check the size limits are consistent.
    pub fn validate(&self) -> Result<()> {
        if self.max_size_bytes == 0 {
            return Err(TrackcheckError::Configuration(
                "cache max_size_bytes must be greater than zero".into(),
            ));
        }
        if self.cleanup_threshold_bytes > self.max_size_bytes {
            return Err(TrackcheckError::Configuration(format!(
                "cache cleanup_threshold_bytes ({}) exceeds max_size_bytes ({})",
                self.cleanup_threshold_bytes, self.max_size_bytes
            )));
        }
        if self.min_remaining_bytes >= self.max_size_bytes {
            return Err(TrackcheckError::Configuration(format!(
                "cache min_remaining_bytes ({}) must be below max_size_bytes ({})",
                self.min_remaining_bytes, self.max_size_bytes
            )));
        }
        Ok(())
    }

    /// Size pruning aims for.
    fn target_bytes(&self) -> usize {
        self.max_size_bytes.saturating_sub(self.min_remaining_bytes)
    }
}

/// A cached value with its insertion time (epoch ms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: u64,
}

/// Entries removed by [`CacheStore::cleanup_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiredCounts {
    pub searches_removed: usize,
    pub tracks_removed: usize,
}

/// Snapshot of cache contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub search_count: usize,
    pub track_count: usize,
    pub approx_size_bytes: usize,
    pub enabled: bool,
}

/// Cache key for a search: lowercase title, artist and album joined by `|`.
pub fn search_key(title: &str, artist: &str, album: &str) -> String {
    format!(
        "{}|{}|{}",
        title.to_lowercase(),
        artist.to_lowercase(),
        album.to_lowercase()
    )
}

#[derive(Default)]
struct CacheState {
    searches: BTreeMap<String, CacheEntry<Vec<RemoteTrack>>>,
    tracks: BTreeMap<String, CacheEntry<RemoteTrack>>,
}

impl CacheState {
    fn serialized(&self) -> Result<(String, String)> {
        Ok((
            serde_json::to_string(&self.searches)?,
            serde_json::to_string(&self.tracks)?,
        ))
    }

    fn size_bytes(&self) -> usize {
        self.serialized()
            .map(|(searches, tracks)| searches.len() + tracks.len())
            .unwrap_or(0)
    }

    fn len(&self) -> usize {
        self.searches.len() + self.tracks.len()
    }

    fn clear(&mut self) {
        self.searches.clear();
        self.tracks.clear();
    }

    fn prune(&mut self, ratio: f64) -> usize {
        let removed = prune_oldest(&mut self.searches, ratio) + prune_oldest(&mut self.tracks, ratio);
        if removed > 0 {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(removed as u64);
        }
        removed
    }

    /// Prune until under the target size; empty the maps if pruning is not
    /// enough. Returns the number of entries removed.
    fn enforce_quota(&mut self, config: &CacheConfig) -> usize {
        let size = self.size_bytes();
        if size < config.cleanup_threshold_bytes {
            return 0;
        }
        let target = config.target_bytes();
        info!(
            size_bytes = size,
            threshold_bytes = config.cleanup_threshold_bytes,
            target_bytes = target,
            "cache over cleanup threshold, pruning"
        );

        let mut removed = 0;
        for ratio in PRUNE_RATIOS {
            removed += self.prune(ratio);
            if self.size_bytes() <= target {
                debug!(removed, size_bytes = self.size_bytes(), "cache pruned");
                return removed;
            }
        }

        warn!(
            size_bytes = self.size_bytes(),
            target_bytes = target,
            "cache still too large after pruning, clearing"
        );
        let remaining = self.len();
        metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(remaining as u64);
        self.clear();
        removed + remaining
    }
}

/// Remove `floor(len * ratio)` entries, oldest timestamp first (ties by key).
fn prune_oldest<T>(map: &mut BTreeMap<String, CacheEntry<T>>, ratio: f64) -> usize {
    let to_remove = (map.len() as f64 * ratio).floor() as usize;
    if to_remove == 0 {
        return 0;
    }
    let mut by_age: Vec<(u64, String)> = map
        .iter()
        .map(|(key, entry)| (entry.timestamp, key.clone()))
        .collect();
    by_age.sort();
    for (_, key) in by_age.into_iter().take(to_remove) {
        map.remove(&key);
    }
    to_remove
}

fn load_map<T: DeserializeOwned>(
    storage: &dyn KeyValueStorage,
    key: &str,
) -> Result<BTreeMap<String, CacheEntry<T>>> {
    match storage.read_string(key)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(BTreeMap::new()),
    }
}

struct Inner {
    config: CacheConfig,
    enabled: AtomicBool,
    state: Mutex<CacheState>,
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    pending_flush: Mutex<Option<JoinHandle<()>>>,
    // Held from snapshot to write so persists land in order.
    persist_lock: Mutex<()>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending_flush.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persisting(&self) -> MutexGuard<'_, ()> {
        self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Search/track cache backed by durable key-value storage.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

impl CacheStore {
    /// Create a store and load any persisted entries from `storage`.
    pub fn new(config: CacheConfig, storage: Arc<dyn KeyValueStorage>) -> Result<Self> {
        Self::with_clock(config, storage, Arc::new(SystemClock))
    }

    /// Create a store with an explicit clock.
    ///
    /// Fails with `Configuration` if `config` does not validate.
    pub fn with_clock(
        config: CacheConfig,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let enabled = match storage.read_string(&config.enabled_storage_key) {
            Ok(Some(saved)) => saved.trim() == "true",
            Ok(None) => config.enabled,
            Err(e) => {
                warn!(error = %e, "failed to read cache enabled flag");
                config.enabled
            }
        };

        let mut state = CacheState::default();
        let loaded = load_map::<Vec<RemoteTrack>>(storage.as_ref(), &config.search_storage_key)
            .and_then(|searches| {
                let tracks = load_map::<RemoteTrack>(storage.as_ref(), &config.track_storage_key)?;
                Ok((searches, tracks))
            });
        match loaded {
            Ok((searches, tracks)) => {
                state.searches = searches;
                state.tracks = tracks;
                info!(
                    searches = state.searches.len(),
                    tracks = state.tracks.len(),
                    "cache loaded"
                );
            }
            Err(e) => warn!(error = %e, "corrupt or unreadable cache, starting empty"),
        }
        state.enforce_quota(&config);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                enabled: AtomicBool::new(enabled),
                state: Mutex::new(state),
                storage,
                clock,
                pending_flush: Mutex::new(None),
                persist_lock: Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Turn caching on or off. The choice is persisted and restored at load.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
        let key = &self.inner.config.enabled_storage_key;
        if let Err(e) = self.inner.storage.write_string(key, if enabled { "true" } else { "false" }) {
            warn!(error = %e, "failed to persist cache enabled flag");
        }
        info!(enabled, "cache toggled");
    }

    /// Whether an entry written at `timestamp` is still served.
    pub fn is_valid(&self, timestamp: u64) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match self.inner.config.max_age {
            Some(max_age) => {
                let age = self.inner.clock.now_ms().saturating_sub(timestamp);
                u128::from(age) < max_age.as_millis()
            }
            None => true,
        }
    }

    /// Raw search entry, regardless of validity.
    pub fn search_entry(&self, key: &str) -> Option<CacheEntry<Vec<RemoteTrack>>> {
        self.inner.state().searches.get(key).cloned()
    }

    /// Raw track entry, regardless of validity.
    pub fn track_entry(&self, id: &str) -> Option<CacheEntry<RemoteTrack>> {
        self.inner.state().tracks.get(id).cloned()
    }

    /// Cached search results, if present and valid.
    pub fn cached_search(&self, key: &str) -> Option<Vec<RemoteTrack>> {
        let hit = self
            .search_entry(key)
            .filter(|entry| self.is_valid(entry.timestamp))
            .map(|entry| entry.data);
        record_lookup("search", hit.is_some());
        hit
    }

    /// Cached track, if present and valid.
    pub fn cached_track(&self, id: &str) -> Option<RemoteTrack> {
        let hit = self
            .track_entry(id)
            .filter(|entry| self.is_valid(entry.timestamp))
            .map(|entry| entry.data);
        record_lookup("track", hit.is_some());
        hit
    }

    /// Store search results under `key`. No-op while caching is disabled.
    pub fn put_search(&self, key: impl Into<String>, results: Vec<RemoteTrack>) {
        if !self.is_enabled() {
            return;
        }
        let entry = CacheEntry {
            data: results,
            timestamp: self.inner.clock.now_ms(),
        };
        self.inner.state().searches.insert(key.into(), entry);
        self.schedule_flush();
    }

    /// Store a track under its id. No-op while caching is disabled.
    pub fn put_track(&self, track: RemoteTrack) {
        if !self.is_enabled() {
            return;
        }
        let entry = CacheEntry {
            timestamp: self.inner.clock.now_ms(),
            data: track,
        };
        self.inner.state().tracks.insert(entry.data.id.clone(), entry);
        self.schedule_flush();
    }

    /// Prune the in-memory maps if they are over the cleanup threshold.
    ///
    /// Returns the number of entries removed.
    pub fn enforce_quota(&self) -> usize {
        self.inner.state().enforce_quota(&self.inner.config)
    }

    /// Remove entries older than `max_age`. No-op while caching is disabled
    /// or when entries never expire.
    pub fn cleanup_expired(&self) -> ExpiredCounts {
        let Some(max_age) = self.inner.config.max_age else {
            return ExpiredCounts::default();
        };
        if !self.is_enabled() {
            return ExpiredCounts::default();
        }

        let now = self.inner.clock.now_ms();
        let fresh = |timestamp: u64| u128::from(now.saturating_sub(timestamp)) < max_age.as_millis();

        let counts = {
            let mut state = self.inner.state();
            let searches_before = state.searches.len();
            let tracks_before = state.tracks.len();
            state.searches.retain(|_, entry| fresh(entry.timestamp));
            state.tracks.retain(|_, entry| fresh(entry.timestamp));
            ExpiredCounts {
                searches_removed: searches_before - state.searches.len(),
                tracks_removed: tracks_before - state.tracks.len(),
            }
        };

        if counts.searches_removed > 0 || counts.tracks_removed > 0 {
            info!(
                searches_removed = counts.searches_removed,
                tracks_removed = counts.tracks_removed,
                "removed expired cache entries"
            );
            self.schedule_flush();
        }
        counts
    }

    /// Empty both maps and remove persisted state.
    pub fn clear(&self) {
        self.cancel_pending_flush();
        self.clear_entries();
        info!("cache cleared");
    }

    pub fn has_cached_data(&self) -> bool {
        self.inner.state().len() > 0
    }

    /// Serialised size of both maps in bytes.
    pub fn approx_size_bytes(&self) -> usize {
        self.inner.state().size_bytes()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state();
        CacheStats {
            search_count: state.searches.len(),
            track_count: state.tracks.len(),
            approx_size_bytes: state.size_bytes(),
            enabled: self.is_enabled(),
        }
    }

    /// Persist now, cancelling any pending debounced flush.
    pub fn flush(&self) {
        self.cancel_pending_flush();
        self.persist();
    }

    /// Restart the debounce timer. Without a tokio runtime the flush runs
    /// immediately.
    fn schedule_flush(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.persist();
            return;
        };
        let store = self.clone();
        let delay = self.inner.config.flush_delay;
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            store.persist();
        });
        if let Some(previous) = self.inner.pending().replace(task) {
            previous.abort();
        }
    }

    fn cancel_pending_flush(&self) {
        if let Some(pending) = self.inner.pending().take() {
            pending.abort();
        }
    }

    fn clear_entries(&self) {
        let _persisting = self.inner.persisting();
        self.drop_entries();
    }

    /// Caller holds the persist lock.
    fn drop_entries(&self) {
        self.inner.state().clear();
        let config = &self.inner.config;
        for key in [&config.search_storage_key, &config.track_storage_key] {
            if let Err(e) = self.inner.storage.remove(key) {
                warn!(key = %key, error = %e, "failed to remove persisted cache");
            }
        }
    }

    fn write_snapshot(&self, searches: &str, tracks: &str) -> Result<()> {
        let config = &self.inner.config;
        self.inner.storage.write_string(&config.search_storage_key, searches)?;
        self.inner.storage.write_string(&config.track_storage_key, tracks)
    }

    /// Enforce the quota, then write both maps; on `QuotaExceeded`, prune
    /// progressively, then clear and retry once. Failures are logged.
    fn persist(&self) {
        let _persisting = self.inner.persisting();
        let snapshot = {
            let mut state = self.inner.state();
            state.enforce_quota(&self.inner.config);
            state.serialized()
        };
        let (searches, tracks) = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "failed to serialise cache");
                return;
            }
        };

        match self.write_snapshot(&searches, &tracks) {
            Ok(()) => {
                debug!(size_bytes = searches.len() + tracks.len(), "cache persisted");
                return;
            }
            Err(e) if e.is_quota_exceeded() => {
                warn!(error = %e, "storage quota exceeded, pruning cache");
            }
            Err(e) => {
                error!(error = %e, "failed to persist cache");
                return;
            }
        }

        for ratio in PRUNE_RATIOS {
            let snapshot = {
                let mut state = self.inner.state();
                state.prune(ratio);
                state.serialized()
            };
            let Ok((searches, tracks)) = snapshot else {
                continue;
            };
            match self.write_snapshot(&searches, &tracks) {
                Ok(()) => {
                    info!(ratio, size_bytes = searches.len() + tracks.len(), "cache persisted after pruning");
                    return;
                }
                Err(e) if e.is_quota_exceeded() => {
                    warn!(ratio, "still over storage quota after pruning");
                }
                Err(e) => {
                    error!(error = %e, "failed to persist cache");
                    return;
                }
            }
        }

        error!("could not persist cache even after pruning, clearing");
        self.drop_entries();
        if let Err(e) = self.write_snapshot("{}", "{}") {
            error!(error = %e, "still cannot persist cache after clearing");
        }
    }
}

fn record_lookup(kind: &'static str, hit: bool) {
    if hit {
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "kind" => kind).increment(1);
    } else {
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "kind" => kind).increment(1);
    }
}
